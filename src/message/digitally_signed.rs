use nom::IResult;

use crate::codec::{decode_all, parse_opaque16, verify_failure, write_opaque};
use crate::types::SignatureScheme;
use crate::Error;

/// A signature with its scheme. TLS 1.0 and 1.1 carry no scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitallySigned {
    pub scheme: Option<SignatureScheme>,
    pub signature: Vec<u8>,
}

impl DigitallySigned {
    pub fn new(scheme: Option<SignatureScheme>, signature: Vec<u8>) -> Self {
        DigitallySigned { scheme, signature }
    }

    pub fn parse(input: &[u8], with_scheme: bool) -> IResult<&[u8], DigitallySigned> {
        let (rest, scheme) = if with_scheme {
            let (rest, scheme) = SignatureScheme::parse(input)?;
            (rest, Some(scheme))
        } else {
            (input, None)
        };
        let (rest, signature) = parse_opaque16(rest)?;
        if signature.is_empty() {
            return Err(verify_failure(input));
        }
        Ok((
            rest,
            DigitallySigned {
                scheme,
                signature: signature.to_vec(),
            },
        ))
    }

    /// Decode a CertificateVerify body.
    pub fn decode(body: &[u8], with_scheme: bool) -> Result<DigitallySigned, Error> {
        decode_all(body, |i| DigitallySigned::parse(i, with_scheme), "DigitallySigned")
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        if let Some(scheme) = self.scheme {
            scheme.serialize(output);
        }
        write_opaque(output, 2, &self.signature, 1, 0xFFFF, "signature")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &[u8] = &[
        0x04, 0x03, // ecdsa_secp256r1_sha256
        0x00, 0x03, 0x01, 0x02, 0x03, // Signature
    ];

    #[test]
    fn roundtrip() {
        let signed = DigitallySigned::new(
            Some(SignatureScheme::ECDSA_SECP256R1_SHA256),
            vec![1, 2, 3],
        );
        let mut serialized = Vec::new();
        signed.serialize(&mut serialized).unwrap();
        assert_eq!(serialized, MESSAGE);
        assert_eq!(DigitallySigned::decode(MESSAGE, true).unwrap(), signed);
    }

    #[test]
    fn legacy_form() {
        let signed = DigitallySigned::decode(&MESSAGE[2..], false).unwrap();
        assert_eq!(signed.scheme, None);
        assert!(DigitallySigned::new(None, Vec::new())
            .serialize(&mut Vec::new())
            .is_err());
    }
}
