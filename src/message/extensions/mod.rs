//! Hello extensions.
//!
//! [`Extensions`] is an ordered map from extension type to raw payload,
//! iterated in wire order. The submodules add typed accessors for the
//! extensions the engines negotiate.

mod key_share;
mod server_name;
pub(crate) mod signature_algorithms;
mod simple;
mod status_request;
mod supported_groups;
mod supported_versions;
mod trusted_ca_keys;

pub use key_share::KeyShareEntry;
pub use server_name::{NameType, ServerName};
pub use simple::{HeartbeatMode, MaxFragmentLength};
pub use trusted_ca_keys::TrustedAuthority;

use std::collections::HashSet;

use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::IResult;

use crate::codec::with_length;
use crate::types::ExtensionType;
use crate::Error;

/// Ordered extension map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions(Vec<(ExtensionType, Vec<u8>)>);

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, extension_type: ExtensionType) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|(t, _)| *t == extension_type)
            .map(|(_, data)| data.as_slice())
    }

    pub fn contains(&self, extension_type: ExtensionType) -> bool {
        self.get(extension_type).is_some()
    }

    /// Set an extension. An existing entry keeps its position.
    pub fn insert(&mut self, extension_type: ExtensionType, data: Vec<u8>) {
        match self.0.iter_mut().find(|(t, _)| *t == extension_type) {
            Some(entry) => entry.1 = data,
            None => self.0.push((extension_type, data)),
        }
    }

    pub fn remove(&mut self, extension_type: ExtensionType) -> Option<Vec<u8>> {
        let index = self.0.iter().position(|(t, _)| *t == extension_type)?;
        Some(self.0.remove(index).1)
    }

    /// Entries in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (ExtensionType, &[u8])> {
        self.0.iter().map(|(t, data)| (*t, data.as_slice()))
    }

    /// Parse a length prefixed extension block. Duplicates are kept; see
    /// [`check_duplicates`](Self::check_duplicates).
    pub fn parse(input: &[u8]) -> IResult<&[u8], Extensions> {
        let (input, len) = be_u16(input)?;
        let (input, mut block) = take(len)(input)?;
        let mut entries = Vec::new();
        while !block.is_empty() {
            let (rest, extension_type) = be_u16(block)?;
            let (rest, data_len) = be_u16(rest)?;
            let (rest, data) = take(data_len)(rest)?;
            entries.push((ExtensionType::from_u16(extension_type), data.to_vec()));
            block = rest;
        }
        Ok((input, Extensions(entries)))
    }

    /// Parse an optional trailing extension block, as in the hello
    /// messages where it may be absent altogether.
    pub fn parse_optional(input: &[u8]) -> IResult<&[u8], Extensions> {
        if input.is_empty() {
            return Ok((input, Extensions::new()));
        }
        Self::parse(input)
    }

    /// Every extension type may appear once.
    pub fn check_duplicates(&self) -> Result<(), Error> {
        let mut seen = HashSet::new();
        for (t, _) in &self.0 {
            if !seen.insert(t.as_u16()) {
                return Err(Error::IllegalParameter(format!(
                    "duplicate extension {:?}",
                    t
                )));
            }
        }
        Ok(())
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        with_length(output, 2, 0, 0xFFFF, "extensions", |out| {
            for (t, data) in &self.0 {
                out.extend_from_slice(&t.as_u16().to_be_bytes());
                crate::codec::write_opaque16(out, data, "extension data")?;
            }
            Ok(())
        })
    }

    /// Whether the empty marker extension `extension_type` is present.
    /// A non-empty payload is a `decode_error`.
    pub fn has_empty(&self, extension_type: ExtensionType) -> Result<bool, Error> {
        match self.get(extension_type) {
            None => Ok(false),
            Some([]) => Ok(true),
            Some(_) => Err(Error::DecodeError(format!(
                "{:?} extension must be empty",
                extension_type
            ))),
        }
    }

    pub fn add_empty(&mut self, extension_type: ExtensionType) {
        self.insert(extension_type, Vec::new());
    }
}

/// Decode the payload of `extension_type` with `parser`, requiring the
/// parser to consume it entirely.
pub(crate) fn decode_payload<'a, T, F>(
    data: &'a [u8],
    parser: F,
    extension_type: ExtensionType,
) -> Result<T, Error>
where
    F: FnMut(&'a [u8]) -> IResult<&'a [u8], T>,
{
    crate::codec::decode_all(data, parser, &format!("{:?} extension", extension_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &[u8] = &[
        0x00, 0x09, // Total length
        0x00, 0x17, 0x00, 0x00, // extended_master_secret
        0xFF, 0x01, 0x00, 0x01, 0x00, // renegotiation_info
    ];

    #[test]
    fn wire_order_is_kept() {
        let (rest, ext) = Extensions::parse(BLOCK).unwrap();
        assert!(rest.is_empty());
        let types: Vec<_> = ext.iter().map(|(t, _)| t).collect();
        assert_eq!(
            types,
            vec![ExtensionType::ExtendedMasterSecret, ExtensionType::RenegotiationInfo]
        );

        let mut out = Vec::new();
        ext.serialize(&mut out).unwrap();
        assert_eq!(out, BLOCK);
    }

    #[test]
    fn duplicates_are_illegal() {
        let block = [0x00, 0x08, 0x00, 0x17, 0x00, 0x00, 0x00, 0x17, 0x00, 0x00];
        let (_, ext) = Extensions::parse(&block).unwrap();
        assert!(matches!(
            ext.check_duplicates(),
            Err(Error::IllegalParameter(_))
        ));
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut ext = Extensions::new();
        ext.insert(ExtensionType::ServerName, vec![1]);
        ext.add_empty(ExtensionType::ExtendedMasterSecret);
        ext.insert(ExtensionType::ServerName, vec![2]);
        assert_eq!(ext.len(), 2);
        assert_eq!(ext.iter().next(), Some((ExtensionType::ServerName, &[2][..])));
        assert_eq!(ext.remove(ExtensionType::ServerName), Some(vec![2]));
        assert!(ext.has_empty(ExtensionType::ExtendedMasterSecret).unwrap());
    }

    #[test]
    fn empty_marker_with_payload_is_rejected() {
        let mut ext = Extensions::new();
        ext.insert(ExtensionType::ExtendedMasterSecret, vec![0]);
        assert!(ext.has_empty(ExtensionType::ExtendedMasterSecret).is_err());
    }

    #[test]
    fn truncated_block_fails() {
        assert!(Extensions::parse(&[0x00, 0x05, 0x00, 0x17, 0x00]).is_err());
    }
}
