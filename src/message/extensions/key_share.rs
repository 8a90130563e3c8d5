//! KeyShare extension (RFC 8446 Section 4.2.8)

use std::collections::HashSet;

use nom::IResult;

use super::{decode_payload, Extensions};
use crate::codec::{parse_list16, parse_opaque16, verify_failure, with_length, write_opaque};
use crate::types::{ExtensionType, NamedGroup};
use crate::Error;

/// A group and the public value offered or selected for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyShareEntry {
    pub group: NamedGroup,
    pub key_exchange: Vec<u8>,
}

impl KeyShareEntry {
    pub fn new(group: NamedGroup, key_exchange: Vec<u8>) -> Self {
        KeyShareEntry {
            group,
            key_exchange,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], KeyShareEntry> {
        let (rest, group) = NamedGroup::parse(input)?;
        let (rest, key_exchange) = parse_opaque16(rest)?;
        if key_exchange.is_empty() {
            return Err(verify_failure(input));
        }
        Ok((
            rest,
            KeyShareEntry {
                group,
                key_exchange: key_exchange.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        self.group.serialize(output);
        write_opaque(output, 2, &self.key_exchange, 1, 0xFFFF, "key share")
    }
}

fn parse_client_shares(input: &[u8]) -> IResult<&[u8], Vec<KeyShareEntry>> {
    parse_list16(input, KeyShareEntry::parse)
}

impl Extensions {
    /// Client key shares, one per group. The list may be empty when the
    /// client waits for a HelloRetryRequest.
    pub fn add_key_share_client(&mut self, entries: &[KeyShareEntry]) -> Result<(), Error> {
        let mut data = Vec::new();
        with_length(&mut data, 2, 0, 0xFFFF, "client shares", |out| {
            for entry in entries {
                entry.serialize(out)?;
            }
            Ok(())
        })?;
        self.insert(ExtensionType::KeyShare, data);
        Ok(())
    }

    /// Client key shares. A group offered twice is `illegal_parameter`.
    pub fn key_share_client(&self) -> Result<Option<Vec<KeyShareEntry>>, Error> {
        let Some(data) = self.get(ExtensionType::KeyShare) else {
            return Ok(None);
        };
        let entries = decode_payload(data, parse_client_shares, ExtensionType::KeyShare)?;
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.group.as_u16()) {
                return Err(Error::IllegalParameter(format!(
                    "duplicate key share for {:?}",
                    entry.group
                )));
            }
        }
        Ok(Some(entries))
    }

    pub fn add_key_share_server(&mut self, entry: &KeyShareEntry) -> Result<(), Error> {
        let mut data = Vec::new();
        entry.serialize(&mut data)?;
        self.insert(ExtensionType::KeyShare, data);
        Ok(())
    }

    pub fn key_share_server(&self) -> Result<Option<KeyShareEntry>, Error> {
        self.get(ExtensionType::KeyShare)
            .map(|data| decode_payload(data, KeyShareEntry::parse, ExtensionType::KeyShare))
            .transpose()
    }

    /// HelloRetryRequest form: the selected group only.
    pub fn add_key_share_hello_retry(&mut self, group: NamedGroup) {
        let mut data = Vec::new();
        group.serialize(&mut data);
        self.insert(ExtensionType::KeyShare, data);
    }

    pub fn key_share_hello_retry(&self) -> Result<Option<NamedGroup>, Error> {
        self.get(ExtensionType::KeyShare)
            .map(|data| decode_payload(data, NamedGroup::parse, ExtensionType::KeyShare))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_SHARES: &[u8] = &[
        0x00, 0x0C, // Client shares length
        0x00, 0x1D, // X25519
        0x00, 0x02, 0xAA, 0xBB, // Key
        0x00, 0x17, // secp256r1
        0x00, 0x02, 0xCC, 0xDD, // Key
    ];

    #[test]
    fn client_shares() {
        let mut ext = Extensions::new();
        ext.insert(ExtensionType::KeyShare, CLIENT_SHARES.to_vec());
        let entries = ext.key_share_client().unwrap().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].group, NamedGroup::X25519);
        assert_eq!(entries[1].key_exchange, vec![0xCC, 0xDD]);

        let mut again = Extensions::new();
        again.add_key_share_client(&entries).unwrap();
        assert_eq!(again.get(ExtensionType::KeyShare), Some(CLIENT_SHARES));
    }

    #[test]
    fn duplicate_group_is_illegal() {
        let mut ext = Extensions::new();
        let entry = KeyShareEntry::new(NamedGroup::X25519, vec![1]);
        ext.add_key_share_client(&[entry.clone(), entry]).unwrap();
        assert!(matches!(
            ext.key_share_client(),
            Err(Error::IllegalParameter(_))
        ));
    }

    #[test]
    fn empty_key_exchange_is_rejected() {
        let entry = KeyShareEntry::new(NamedGroup::X25519, vec![]);
        assert!(entry.serialize(&mut Vec::new()).is_err());
        assert!(KeyShareEntry::parse(&[0x00, 0x1D, 0x00, 0x00]).is_err());
    }

    #[test]
    fn hello_retry_form() {
        let mut ext = Extensions::new();
        ext.add_key_share_hello_retry(NamedGroup::Secp384r1);
        assert_eq!(ext.get(ExtensionType::KeyShare), Some(&[0x00, 0x18][..]));
        assert_eq!(
            ext.key_share_hello_retry().unwrap(),
            Some(NamedGroup::Secp384r1)
        );
    }
}
