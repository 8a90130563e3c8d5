use nom::number::complete::be_u8;
use nom::IResult;

use super::extensions::signature_algorithms::{parse_scheme_list, write_scheme_list};
use super::Extensions;
use crate::codec::{
    decode_all, parse_list16, parse_list8, parse_opaque16, parse_opaque8, verify_failure,
    with_length, write_opaque,
};
use crate::types::{KeyKind, SignatureScheme};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientCertificateType {
    RsaSign,
    EcdsaSign,
    Unknown(u8),
}

impl ClientCertificateType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ClientCertificateType::RsaSign,
            64 => ClientCertificateType::EcdsaSign,
            _ => ClientCertificateType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ClientCertificateType::RsaSign => 1,
            ClientCertificateType::EcdsaSign => 64,
            ClientCertificateType::Unknown(value) => *value,
        }
    }

    pub fn key_kind(&self) -> Option<KeyKind> {
        match self {
            ClientCertificateType::RsaSign => Some(KeyKind::Rsa),
            ClientCertificateType::EcdsaSign => Some(KeyKind::Ecdsa),
            ClientCertificateType::Unknown(_) => None,
        }
    }
}

/// CertificateRequest up to TLS 1.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    pub certificate_types: Vec<ClientCertificateType>,
    /// Present from TLS 1.2 on.
    pub signature_schemes: Option<Vec<SignatureScheme>>,
    /// DER distinguished names of acceptable CAs.
    pub certificate_authorities: Vec<Vec<u8>>,
}

impl CertificateRequest {
    pub fn parse(input: &[u8], with_schemes: bool) -> IResult<&[u8], CertificateRequest> {
        let (input, types) = parse_list8(input, be_u8)?;
        if types.is_empty() {
            return Err(verify_failure(input));
        }
        let (input, signature_schemes) = if with_schemes {
            let (input, schemes) = parse_scheme_list(input)?;
            (input, Some(schemes))
        } else {
            (input, None)
        };
        let (input, certificate_authorities) = parse_list16(input, |i| {
            let (rest, name) = parse_opaque16(i)?;
            if name.is_empty() {
                return Err(verify_failure(i));
            }
            Ok((rest, name.to_vec()))
        })?;
        Ok((
            input,
            CertificateRequest {
                certificate_types: types.into_iter().map(ClientCertificateType::from_u8).collect(),
                signature_schemes,
                certificate_authorities,
            },
        ))
    }

    pub fn decode(body: &[u8], with_schemes: bool) -> Result<CertificateRequest, Error> {
        decode_all(
            body,
            |i| CertificateRequest::parse(i, with_schemes),
            "CertificateRequest",
        )
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        let types: Vec<u8> = self.certificate_types.iter().map(|t| t.as_u8()).collect();
        write_opaque(output, 1, &types, 1, 0xFF, "certificate types")?;
        if let Some(schemes) = &self.signature_schemes {
            write_scheme_list(output, schemes)?;
        }
        with_length(output, 2, 0, 0xFFFF, "certificate authorities", |out| {
            for name in &self.certificate_authorities {
                write_opaque(out, 2, name, 1, 0xFFFF, "distinguished name")?;
            }
            Ok(())
        })
    }
}

/// TLS 1.3 CertificateRequest. The extensions carry at least
/// `signature_algorithms`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequestTls13 {
    pub request_context: Vec<u8>,
    pub extensions: Extensions,
}

impl CertificateRequestTls13 {
    pub fn parse(input: &[u8]) -> IResult<&[u8], CertificateRequestTls13> {
        let (input, context) = parse_opaque8(input)?;
        let (input, extensions) = Extensions::parse(input)?;
        Ok((
            input,
            CertificateRequestTls13 {
                request_context: context.to_vec(),
                extensions,
            },
        ))
    }

    pub fn decode(body: &[u8]) -> Result<CertificateRequestTls13, Error> {
        let request = decode_all(body, CertificateRequestTls13::parse, "CertificateRequest")?;
        request.extensions.check_duplicates()?;
        if request.extensions.signature_algorithms()?.is_none() {
            return Err(Error::Fatal(
                crate::alert::AlertDescription::MissingExtension,
                "CertificateRequest without signature_algorithms".into(),
            ));
        }
        Ok(request)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        write_opaque(output, 1, &self.request_context, 0, 0xFF, "request context")?;
        self.extensions.serialize(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExtensionType;

    const MESSAGE: &[u8] = &[
        0x02, 0x01, 0x40, // Certificate types
        0x00, 0x02, 0x04, 0x03, // Signature schemes
        0x00, 0x04, 0x00, 0x02, 0x30, 0x00, // Certificate authorities
    ];

    #[test]
    fn roundtrip() {
        let request = CertificateRequest {
            certificate_types: vec![
                ClientCertificateType::RsaSign,
                ClientCertificateType::EcdsaSign,
            ],
            signature_schemes: Some(vec![SignatureScheme::ECDSA_SECP256R1_SHA256]),
            certificate_authorities: vec![vec![0x30, 0x00]],
        };
        let mut serialized = Vec::new();
        request.serialize(&mut serialized).unwrap();
        assert_eq!(serialized, MESSAGE);
        assert_eq!(CertificateRequest::decode(MESSAGE, true).unwrap(), request);
    }

    #[test]
    fn legacy_form_has_no_schemes() {
        let body = [0x01, 0x01, 0x00, 0x00];
        let request = CertificateRequest::decode(&body, false).unwrap();
        assert!(request.signature_schemes.is_none());
        assert!(CertificateRequest::decode(&body, true).is_err());
    }

    #[test]
    fn tls13_needs_signature_algorithms() {
        let mut extensions = Extensions::new();
        extensions
            .add_signature_algorithms(&[SignatureScheme::ED25519])
            .unwrap();
        let request = CertificateRequestTls13 {
            request_context: Vec::new(),
            extensions,
        };
        let mut serialized = Vec::new();
        request.serialize(&mut serialized).unwrap();
        assert_eq!(CertificateRequestTls13::decode(&serialized).unwrap(), request);

        let mut other = Extensions::new();
        other.add_empty(ExtensionType::PostHandshakeAuth);
        let mut serialized = vec![0x00];
        other.serialize(&mut serialized).unwrap();
        let r = CertificateRequestTls13::decode(&serialized);
        assert!(matches!(
            r,
            Err(Error::Fatal(crate::alert::AlertDescription::MissingExtension, _))
        ));
    }
}
