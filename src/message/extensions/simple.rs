//! Single value extensions: max_fragment_length, heartbeat,
//! renegotiation_info, srp and extended_master_secret.

use nom::number::complete::be_u8;
use nom::IResult;

use super::{decode_payload, Extensions};
use crate::codec::{parse_opaque8, verify_failure, write_opaque};
use crate::types::ExtensionType;
use crate::Error;

/// Negotiated plaintext limit (RFC 6066 Section 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaxFragmentLength {
    Bytes512,
    Bytes1024,
    Bytes2048,
    Bytes4096,
}

impl MaxFragmentLength {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MaxFragmentLength::Bytes512),
            2 => Some(MaxFragmentLength::Bytes1024),
            3 => Some(MaxFragmentLength::Bytes2048),
            4 => Some(MaxFragmentLength::Bytes4096),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            MaxFragmentLength::Bytes512 => 1,
            MaxFragmentLength::Bytes1024 => 2,
            MaxFragmentLength::Bytes2048 => 3,
            MaxFragmentLength::Bytes4096 => 4,
        }
    }

    /// Plaintext limit in bytes: `2^(8 + code)`.
    pub fn plaintext_limit(&self) -> usize {
        1 << (8 + self.as_u8() as usize)
    }
}

/// Heartbeat mode (RFC 6520). Only negotiated, never exercised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeartbeatMode {
    PeerAllowedToSend,
    PeerNotAllowedToSend,
}

impl HeartbeatMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(HeartbeatMode::PeerAllowedToSend),
            2 => Some(HeartbeatMode::PeerNotAllowedToSend),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            HeartbeatMode::PeerAllowedToSend => 1,
            HeartbeatMode::PeerNotAllowedToSend => 2,
        }
    }
}

fn parse_single_byte(input: &[u8]) -> IResult<&[u8], u8> {
    be_u8(input)
}

fn parse_srp_identity(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let (rest, identity) = parse_opaque8(input)?;
    if identity.is_empty() {
        return Err(verify_failure(input));
    }
    Ok((rest, identity.to_vec()))
}

impl Extensions {
    pub fn add_max_fragment_length(&mut self, value: MaxFragmentLength) {
        self.insert(ExtensionType::MaxFragmentLength, vec![value.as_u8()]);
    }

    /// An unknown code is `illegal_parameter`.
    pub fn max_fragment_length(&self) -> Result<Option<MaxFragmentLength>, Error> {
        let Some(data) = self.get(ExtensionType::MaxFragmentLength) else {
            return Ok(None);
        };
        let code = decode_payload(data, parse_single_byte, ExtensionType::MaxFragmentLength)?;
        MaxFragmentLength::from_u8(code)
            .map(Some)
            .ok_or_else(|| Error::IllegalParameter(format!("max_fragment_length code {}", code)))
    }

    pub fn add_heartbeat(&mut self, mode: HeartbeatMode) {
        self.insert(ExtensionType::Heartbeat, vec![mode.as_u8()]);
    }

    /// An unknown mode is `illegal_parameter`.
    pub fn heartbeat(&self) -> Result<Option<HeartbeatMode>, Error> {
        let Some(data) = self.get(ExtensionType::Heartbeat) else {
            return Ok(None);
        };
        let mode = decode_payload(data, parse_single_byte, ExtensionType::Heartbeat)?;
        HeartbeatMode::from_u8(mode)
            .map(Some)
            .ok_or_else(|| Error::IllegalParameter(format!("heartbeat mode {}", mode)))
    }

    /// `renegotiation_info` with an empty `renegotiated_connection`, the
    /// only form an initial handshake carries.
    pub fn add_renegotiation_info(&mut self) {
        self.insert(ExtensionType::RenegotiationInfo, vec![0x00]);
    }

    /// Raw `renegotiation_info` payload.
    pub fn renegotiation_info(&self) -> Option<&[u8]> {
        self.get(ExtensionType::RenegotiationInfo)
    }

    pub fn add_extended_master_secret(&mut self) {
        self.add_empty(ExtensionType::ExtendedMasterSecret);
    }

    pub fn extended_master_secret(&self) -> Result<bool, Error> {
        self.has_empty(ExtensionType::ExtendedMasterSecret)
    }

    /// SRP user name (RFC 5054 Section 2.8.1).
    pub fn add_srp_identity(&mut self, identity: &[u8]) -> Result<(), Error> {
        let mut data = Vec::new();
        write_opaque(&mut data, 1, identity, 1, 0xFF, "srp identity")?;
        self.insert(ExtensionType::Srp, data);
        Ok(())
    }

    pub fn srp_identity(&self) -> Result<Option<Vec<u8>>, Error> {
        self.get(ExtensionType::Srp)
            .map(|data| decode_payload(data, parse_srp_identity, ExtensionType::Srp))
            .transpose()
    }
}
