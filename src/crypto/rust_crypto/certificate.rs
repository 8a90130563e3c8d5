//! X.509 end-entity certificate decoding using RustCrypto.

use std::sync::Arc;

use der::Decode;
use p256::ecdsa::{Signature as P256Signature, VerifyingKey as P256VerifyingKey};
use p384::ecdsa::{Signature as P384Signature, VerifyingKey as P384VerifyingKey};
use rand_core::OsRng;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use signature::hazmat::PrehashVerifier;
use spki::ObjectIdentifier;
use x509_cert::Certificate as X509Certificate;

use super::sign::{digest, ecdsa_hash, rsa_padding, RsaPadding};
use crate::crypto::provider::{CertificateParser, TlsCertificate};
use crate::types::{KeyKind, SignatureScheme};

const OID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const OID_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const OID_P256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const OID_P384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

enum PublicKey {
    P256(P256VerifyingKey),
    P384(P384VerifyingKey),
    Rsa(RsaPublicKey),
}

struct ParsedCertificate {
    der: Vec<u8>,
    key: PublicKey,
}

impl std::fmt::Debug for ParsedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedCertificate")
            .field("der_len", &self.der.len())
            .field("key_kind", &self.key_kind())
            .finish()
    }
}

impl TlsCertificate for ParsedCertificate {
    fn der(&self) -> &[u8] {
        &self.der
    }

    fn key_kind(&self) -> KeyKind {
        match self.key {
            PublicKey::P256(_) | PublicKey::P384(_) => KeyKind::Ecdsa,
            PublicKey::Rsa(_) => KeyKind::Rsa,
        }
    }

    fn verify_signature(
        &self,
        scheme: Option<SignatureScheme>,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), String> {
        match &self.key {
            PublicKey::P256(key) => {
                let hash = digest(Some(ecdsa_hash(scheme)?), data)?;
                let sig = P256Signature::from_der(signature)
                    .map_err(|_| "Invalid signature format".to_string())?;
                key.verify_prehash(&hash, &sig)
                    .map_err(|_| "ECDSA signature verification failed".to_string())
            }
            PublicKey::P384(key) => {
                let hash = digest(Some(ecdsa_hash(scheme)?), data)?;
                let sig = P384Signature::from_der(signature)
                    .map_err(|_| "Invalid signature format".to_string())?;
                key.verify_prehash(&hash, &sig)
                    .map_err(|_| "ECDSA signature verification failed".to_string())
            }
            PublicKey::Rsa(key) => {
                let (padding, hash) = rsa_padding(scheme)?;
                let hashed = digest(hash, data)?;
                let result = match padding {
                    RsaPadding::Pkcs1(p) => key.verify(p, &hashed, signature),
                    RsaPadding::Pss(p) => key.verify(p, &hashed, signature),
                };
                result.map_err(|_| "RSA signature verification failed".to_string())
            }
        }
    }

    fn encrypt_pre_master_secret(&self, pre_master_secret: &[u8]) -> Result<Vec<u8>, String> {
        match &self.key {
            PublicKey::Rsa(key) => key
                .encrypt(&mut OsRng, Pkcs1v15Encrypt, pre_master_secret)
                .map_err(|e| format!("RSA encryption failed: {}", e)),
            _ => Err("certificate key does not support encryption".to_string()),
        }
    }
}

/// Certificate parser implementation.
#[derive(Debug)]
pub(super) struct RustCryptoCertificateParser;

impl CertificateParser for RustCryptoCertificateParser {
    fn parse(&self, der: &[u8]) -> Result<Arc<dyn TlsCertificate>, String> {
        let cert = X509Certificate::from_der(der)
            .map_err(|e| format!("Failed to parse certificate: {e}"))?;
        let spki = &cert.tbs_certificate.subject_public_key_info;

        let pubkey_bytes = spki
            .subject_public_key
            .as_bytes()
            .ok_or_else(|| "Invalid subject_public_key bitstring".to_string())?;

        let key = match spki.algorithm.oid {
            OID_EC_PUBLIC_KEY => {
                let curve_oid: ObjectIdentifier = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .ok_or("Missing EC curve parameter in certificate")?
                    .decode_as()
                    .map_err(|_| "Invalid EC curve parameter in certificate".to_string())?;
                match curve_oid {
                    OID_P256 => PublicKey::P256(
                        P256VerifyingKey::from_sec1_bytes(pubkey_bytes)
                            .map_err(|_| "Invalid P-256 public key".to_string())?,
                    ),
                    OID_P384 => PublicKey::P384(
                        P384VerifyingKey::from_sec1_bytes(pubkey_bytes)
                            .map_err(|_| "Invalid P-384 public key".to_string())?,
                    ),
                    _ => return Err(format!("Unsupported EC curve: {}", curve_oid)),
                }
            }
            OID_RSA_ENCRYPTION => PublicKey::Rsa(
                RsaPublicKey::from_pkcs1_der(pubkey_bytes)
                    .map_err(|e| format!("Invalid RSA public key: {}", e))?,
            ),
            oid => return Err(format!("Unsupported public key algorithm: {}", oid)),
        };

        Ok(Arc::new(ParsedCertificate {
            der: der.to_vec(),
            key,
        }))
    }
}

pub(super) static CERTIFICATE_PARSER: RustCryptoCertificateParser = RustCryptoCertificateParser;
