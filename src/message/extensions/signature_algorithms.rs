//! SignatureAlgorithms extension (RFC 5246 Section 7.4.1.4.1, RFC 8446 Section 4.2.3)

use nom::IResult;

use super::{decode_payload, Extensions};
use crate::codec::{parse_list16, verify_failure, with_length};
use crate::types::{ExtensionType, SignatureScheme};
use crate::Error;

/// A non-empty list of signature schemes, as used by the extension and by
/// the TLS 1.2 CertificateRequest.
pub(crate) fn parse_scheme_list(input: &[u8]) -> IResult<&[u8], Vec<SignatureScheme>> {
    let (rest, schemes) = parse_list16(input, SignatureScheme::parse)?;
    if schemes.is_empty() {
        return Err(verify_failure(input));
    }
    Ok((rest, schemes))
}

pub(crate) fn write_scheme_list(
    output: &mut Vec<u8>,
    schemes: &[SignatureScheme],
) -> Result<(), Error> {
    with_length(output, 2, 2, 0xFFFE, "signature schemes", |out| {
        for scheme in schemes {
            scheme.serialize(out);
        }
        Ok(())
    })
}

impl Extensions {
    pub fn add_signature_algorithms(&mut self, schemes: &[SignatureScheme]) -> Result<(), Error> {
        let mut data = Vec::new();
        write_scheme_list(&mut data, schemes)?;
        self.insert(ExtensionType::SignatureAlgorithms, data);
        Ok(())
    }

    pub fn signature_algorithms(&self) -> Result<Option<Vec<SignatureScheme>>, Error> {
        self.get(ExtensionType::SignatureAlgorithms)
            .map(|data| {
                decode_payload(data, parse_scheme_list, ExtensionType::SignatureAlgorithms)
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMES: &[u8] = &[
        0x00, 0x04, // Length
        0x04, 0x03, // ecdsa_secp256r1_sha256
        0x08, 0x04, // rsa_pss_rsae_sha256
    ];

    #[test]
    fn schemes() {
        let mut ext = Extensions::new();
        ext.add_signature_algorithms(&[
            SignatureScheme::ECDSA_SECP256R1_SHA256,
            SignatureScheme::RSA_PSS_RSAE_SHA256,
        ])
        .unwrap();
        assert_eq!(ext.get(ExtensionType::SignatureAlgorithms), Some(SCHEMES));
        let schemes = ext.signature_algorithms().unwrap().unwrap();
        assert_eq!(schemes[1], SignatureScheme::RSA_PSS_RSAE_SHA256);
    }

    #[test]
    fn odd_length_is_decode_error() {
        let mut ext = Extensions::new();
        ext.insert(ExtensionType::SignatureAlgorithms, vec![0x00, 0x03, 0x04, 0x03, 0x08]);
        assert!(matches!(
            ext.signature_algorithms(),
            Err(Error::DecodeError(_))
        ));
        assert!(ext.add_signature_algorithms(&[]).is_err());
    }
}
