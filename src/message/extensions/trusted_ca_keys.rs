//! TrustedCaKeys extension (RFC 6066 Section 6)

use nom::bytes::complete::take;
use nom::number::complete::be_u8;
use nom::IResult;

use super::{decode_payload, Extensions};
use crate::codec::{parse_list16, parse_opaque16, verify_failure, with_length, write_opaque};
use crate::types::ExtensionType;
use crate::Error;

/// A CA the client holds keys for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustedAuthority {
    PreAgreed,
    KeySha1Hash([u8; 20]),
    /// DER encoded distinguished name.
    X509Name(Vec<u8>),
    CertSha1Hash([u8; 20]),
}

impl TrustedAuthority {
    fn identifier_type(&self) -> u8 {
        match self {
            TrustedAuthority::PreAgreed => 0,
            TrustedAuthority::KeySha1Hash(_) => 1,
            TrustedAuthority::X509Name(_) => 2,
            TrustedAuthority::CertSha1Hash(_) => 3,
        }
    }

    /// An unknown identifier type cannot be skipped and fails the parse.
    pub fn parse(input: &[u8]) -> IResult<&[u8], TrustedAuthority> {
        let (rest, identifier_type) = be_u8(input)?;
        match identifier_type {
            0 => Ok((rest, TrustedAuthority::PreAgreed)),
            1 | 3 => {
                let (rest, hash) = take(20_usize)(rest)?;
                let mut bytes = [0; 20];
                bytes.copy_from_slice(hash);
                let authority = if identifier_type == 1 {
                    TrustedAuthority::KeySha1Hash(bytes)
                } else {
                    TrustedAuthority::CertSha1Hash(bytes)
                };
                Ok((rest, authority))
            }
            2 => {
                let (rest, name) = parse_opaque16(rest)?;
                if name.is_empty() {
                    return Err(verify_failure(input));
                }
                Ok((rest, TrustedAuthority::X509Name(name.to_vec())))
            }
            _ => Err(verify_failure(input)),
        }
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        output.push(self.identifier_type());
        match self {
            TrustedAuthority::PreAgreed => {}
            TrustedAuthority::KeySha1Hash(hash) | TrustedAuthority::CertSha1Hash(hash) => {
                output.extend_from_slice(hash);
            }
            TrustedAuthority::X509Name(name) => {
                write_opaque(output, 2, name, 1, 0xFFFF, "distinguished name")?;
            }
        }
        Ok(())
    }
}

fn parse_authorities(input: &[u8]) -> IResult<&[u8], Vec<TrustedAuthority>> {
    parse_list16(input, TrustedAuthority::parse)
}

impl Extensions {
    pub fn add_trusted_ca_keys(&mut self, authorities: &[TrustedAuthority]) -> Result<(), Error> {
        let mut data = Vec::new();
        with_length(&mut data, 2, 0, 0xFFFF, "trusted authorities", |out| {
            for authority in authorities {
                authority.serialize(out)?;
            }
            Ok(())
        })?;
        self.insert(ExtensionType::TrustedCaKeys, data);
        Ok(())
    }

    /// Client list of trusted authorities. The server acknowledges with an
    /// empty payload, see [`has_empty`](Extensions::has_empty).
    pub fn trusted_ca_keys(&self) -> Result<Option<Vec<TrustedAuthority>>, Error> {
        self.get(ExtensionType::TrustedCaKeys)
            .map(|data| decode_payload(data, parse_authorities, ExtensionType::TrustedCaKeys))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorities() {
        let list = vec![
            TrustedAuthority::PreAgreed,
            TrustedAuthority::CertSha1Hash([7; 20]),
            TrustedAuthority::X509Name(vec![0x30, 0x00]),
        ];
        let mut ext = Extensions::new();
        ext.add_trusted_ca_keys(&list).unwrap();
        let data = ext.get(ExtensionType::TrustedCaKeys).unwrap();
        assert_eq!(&data[..3], &[0x00, 0x1B, 0x00]);
        assert_eq!(data.len(), 2 + 1 + 21 + 5);
        assert_eq!(ext.trusted_ca_keys().unwrap().unwrap(), list);
    }

    #[test]
    fn unknown_identifier_type_fails() {
        assert!(TrustedAuthority::parse(&[0x09]).is_err());
        let mut ext = Extensions::new();
        ext.insert(ExtensionType::TrustedCaKeys, vec![0x00, 0x01, 0x09]);
        assert!(matches!(
            ext.trusted_ca_keys(),
            Err(Error::DecodeError(_))
        ));
    }

    #[test]
    fn empty_name_is_rejected() {
        let empty = TrustedAuthority::X509Name(Vec::new());
        assert!(empty.serialize(&mut Vec::new()).is_err());
    }
}
