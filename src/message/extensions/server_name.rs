//! ServerName extension (RFC 6066 Section 3)

use nom::number::complete::be_u8;
use nom::IResult;

use super::{decode_payload, Extensions};
use crate::codec::{parse_list16, parse_opaque16, verify_failure, with_length, write_opaque};
use crate::types::ExtensionType;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameType {
    HostName,
    Unknown(u8),
}

impl NameType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => NameType::HostName,
            _ => NameType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            NameType::HostName => 0,
            NameType::Unknown(value) => *value,
        }
    }
}

/// One entry of a `server_name` list. Names are never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerName {
    pub name_type: NameType,
    pub name: Vec<u8>,
}

impl ServerName {
    pub fn host_name(name: &str) -> Self {
        ServerName {
            name_type: NameType::HostName,
            name: name.as_bytes().to_vec(),
        }
    }

    /// The host name, if this is a well formed `host_name` entry.
    pub fn as_host_name(&self) -> Option<&str> {
        if self.name_type != NameType::HostName {
            return None;
        }
        std::str::from_utf8(&self.name).ok()
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ServerName> {
        let (rest, name_type) = be_u8(input)?;
        let (rest, name) = parse_opaque16(rest)?;
        if name.is_empty() {
            return Err(verify_failure(input));
        }
        Ok((
            rest,
            ServerName {
                name_type: NameType::from_u8(name_type),
                name: name.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        output.push(self.name_type.as_u8());
        write_opaque(output, 2, &self.name, 1, 0xFFFF, "server name")
    }
}

fn parse_server_name_list(input: &[u8]) -> IResult<&[u8], Vec<ServerName>> {
    let (rest, names) = parse_list16(input, ServerName::parse)?;
    if names.is_empty() {
        return Err(verify_failure(input));
    }
    Ok((rest, names))
}

impl Extensions {
    pub fn add_server_name(&mut self, names: &[ServerName]) -> Result<(), Error> {
        let mut data = Vec::new();
        with_length(&mut data, 2, 1, 0xFFFF, "server name list", |out| {
            for name in names {
                name.serialize(out)?;
            }
            Ok(())
        })?;
        self.insert(ExtensionType::ServerName, data);
        Ok(())
    }

    /// The client's `server_name` list. At most one entry per name type.
    pub fn server_names(&self) -> Result<Option<Vec<ServerName>>, Error> {
        let Some(data) = self.get(ExtensionType::ServerName) else {
            return Ok(None);
        };
        let names = decode_payload(data, parse_server_name_list, ExtensionType::ServerName)?;
        for (i, name) in names.iter().enumerate() {
            if names[..i].iter().any(|n| n.name_type == name.name_type) {
                return Err(Error::IllegalParameter(
                    "server_name repeats a name type".into(),
                ));
            }
        }
        Ok(Some(names))
    }

    /// The first `host_name` the client asked for.
    pub fn server_host_name(&self) -> Result<Option<String>, Error> {
        let names = self.server_names()?.unwrap_or_default();
        Ok(names
            .iter()
            .find_map(|n| n.as_host_name())
            .map(str::to_string))
    }
}
