//! Signing and key loading implementations using RustCrypto.

use std::str;
use std::sync::Arc;

use p256::ecdsa::{Signature as P256Signature, SigningKey as P256SigningKey};
use p384::ecdsa::{Signature as P384Signature, SigningKey as P384SigningKey};
use pkcs8::DecodePrivateKey;
use rand_core::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::{Pkcs1v15Encrypt, Pkcs1v15Sign, Pss, RsaPrivateKey};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use signature::hazmat::PrehashSigner;

use super::hash::HASH_PROVIDER;
use crate::crypto::provider::{HashProvider, KeyProvider, Secret, Signer};
use crate::types::{HashAlgorithm, KeyKind, SignatureScheme};

/// Digest `data` with `hash`, or with MD5 || SHA-1 for `None`.
pub(super) fn digest(hash: Option<HashAlgorithm>, data: &[u8]) -> Result<Vec<u8>, String> {
    match hash {
        Some(h) => HASH_PROVIDER.hash(h, data),
        None => {
            let mut out = HASH_PROVIDER.hash(HashAlgorithm::MD5, data)?;
            out.extend_from_slice(&HASH_PROVIDER.hash(HashAlgorithm::SHA1, data)?);
            Ok(out)
        }
    }
}

/// The ECDSA digest for `scheme`. The pre TLS 1.2 form uses SHA-1.
pub(super) fn ecdsa_hash(scheme: Option<SignatureScheme>) -> Result<HashAlgorithm, String> {
    let Some(scheme) = scheme else {
        return Ok(HashAlgorithm::SHA1);
    };
    match (scheme.key_kind(), scheme.hash()) {
        (Some(KeyKind::Ecdsa), Some(hash)) => Ok(hash),
        _ => Err(format!("{:?} is not an ECDSA scheme", scheme)),
    }
}

/// RSA padding for `scheme`. Returns the padding and the digest it signs.
pub(super) enum RsaPadding {
    Pkcs1(Pkcs1v15Sign),
    Pss(Pss),
}

pub(super) fn rsa_padding(
    scheme: Option<SignatureScheme>,
) -> Result<(RsaPadding, Option<HashAlgorithm>), String> {
    use SignatureScheme as S;
    let Some(scheme) = scheme else {
        return Ok((RsaPadding::Pkcs1(Pkcs1v15Sign::new_unprefixed()), None));
    };
    let padding = match scheme {
        S::RSA_PKCS1_SHA1 => RsaPadding::Pkcs1(Pkcs1v15Sign::new::<Sha1>()),
        S::RSA_PKCS1_SHA256 => RsaPadding::Pkcs1(Pkcs1v15Sign::new::<Sha256>()),
        S::RSA_PKCS1_SHA384 => RsaPadding::Pkcs1(Pkcs1v15Sign::new::<Sha384>()),
        S::RSA_PKCS1_SHA512 => RsaPadding::Pkcs1(Pkcs1v15Sign::new::<Sha512>()),
        S::RSA_PSS_RSAE_SHA256 => RsaPadding::Pss(Pss::new::<Sha256>()),
        S::RSA_PSS_RSAE_SHA384 => RsaPadding::Pss(Pss::new::<Sha384>()),
        S::RSA_PSS_RSAE_SHA512 => RsaPadding::Pss(Pss::new::<Sha512>()),
        _ => return Err(format!("{:?} is not an RSA scheme", scheme)),
    };
    Ok((padding, scheme.hash()))
}

/// ECDSA signing key implementation.
enum EcdsaSigningKey {
    P256(P256SigningKey),
    P384(P384SigningKey),
}

impl std::fmt::Debug for EcdsaSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EcdsaSigningKey::P256(_) => f.debug_tuple("EcdsaSigningKey::P256").finish(),
            EcdsaSigningKey::P384(_) => f.debug_tuple("EcdsaSigningKey::P384").finish(),
        }
    }
}

// SHA-1 is shorter than half the P-384 order, so legacy signing is P-256 only.
static P256_SCHEMES: &[SignatureScheme] = &[
    SignatureScheme::ECDSA_SECP256R1_SHA256,
    SignatureScheme::ECDSA_SHA1,
];
static P384_SCHEMES: &[SignatureScheme] = &[SignatureScheme::ECDSA_SECP384R1_SHA384];

impl Signer for EcdsaSigningKey {
    fn key_kind(&self) -> KeyKind {
        KeyKind::Ecdsa
    }

    fn schemes(&self) -> &[SignatureScheme] {
        match self {
            EcdsaSigningKey::P256(_) => P256_SCHEMES,
            EcdsaSigningKey::P384(_) => P384_SCHEMES,
        }
    }

    fn sign(&self, scheme: Option<SignatureScheme>, data: &[u8]) -> Result<Vec<u8>, String> {
        let hash = digest(Some(ecdsa_hash(scheme)?), data)?;
        match self {
            EcdsaSigningKey::P256(key) => {
                let signature: P256Signature = key
                    .sign_prehash(&hash)
                    .map_err(|_| "Signing failed".to_string())?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            EcdsaSigningKey::P384(key) => {
                let signature: P384Signature = key
                    .sign_prehash(&hash)
                    .map_err(|_| "Signing failed".to_string())?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
        }
    }
}

/// RSA private key.
struct RsaSigningKey(RsaPrivateKey);

impl std::fmt::Debug for RsaSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RsaSigningKey").finish()
    }
}

static RSA_SCHEMES: &[SignatureScheme] = &[
    SignatureScheme::RSA_PSS_RSAE_SHA256,
    SignatureScheme::RSA_PSS_RSAE_SHA384,
    SignatureScheme::RSA_PSS_RSAE_SHA512,
    SignatureScheme::RSA_PKCS1_SHA256,
    SignatureScheme::RSA_PKCS1_SHA384,
    SignatureScheme::RSA_PKCS1_SHA512,
    SignatureScheme::RSA_PKCS1_SHA1,
];

impl Signer for RsaSigningKey {
    fn key_kind(&self) -> KeyKind {
        KeyKind::Rsa
    }

    fn schemes(&self) -> &[SignatureScheme] {
        RSA_SCHEMES
    }

    fn sign(&self, scheme: Option<SignatureScheme>, data: &[u8]) -> Result<Vec<u8>, String> {
        let (padding, hash) = rsa_padding(scheme)?;
        let hashed = digest(hash, data)?;
        let result = match padding {
            RsaPadding::Pkcs1(p) => self.0.sign(p, &hashed),
            RsaPadding::Pss(p) => self.0.sign_with_rng(&mut OsRng, p, &hashed),
        };
        result.map_err(|e| format!("RSA signing failed: {}", e))
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Secret, String> {
        self.0
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map(Secret::new)
            .map_err(|e| format!("RSA decryption failed: {}", e))
    }
}

/// Key provider implementation.
#[derive(Debug)]
pub(super) struct RustCryptoKeyProvider;

impl KeyProvider for RustCryptoKeyProvider {
    fn load_private_key(&self, key_der: &[u8]) -> Result<Arc<dyn Signer>, String> {
        // PKCS#8 DER (most common)
        if let Ok(key) = P256SigningKey::from_pkcs8_der(key_der) {
            return Ok(Arc::new(EcdsaSigningKey::P256(key)));
        }
        if let Ok(key) = P384SigningKey::from_pkcs8_der(key_der) {
            return Ok(Arc::new(EcdsaSigningKey::P384(key)));
        }
        if let Ok(key) = RsaPrivateKey::from_pkcs8_der(key_der) {
            return Ok(Arc::new(RsaSigningKey(key)));
        }

        // SEC1 DER (OpenSSL EC private key format)
        if let Ok(secret) = p256::SecretKey::from_sec1_der(key_der) {
            return Ok(Arc::new(EcdsaSigningKey::P256(P256SigningKey::from(&secret))));
        }
        if let Ok(secret) = p384::SecretKey::from_sec1_der(key_der) {
            return Ok(Arc::new(EcdsaSigningKey::P384(P384SigningKey::from(&secret))));
        }

        // PKCS#1 DER (OpenSSL RSA private key format)
        if let Ok(key) = RsaPrivateKey::from_pkcs1_der(key_der) {
            return Ok(Arc::new(RsaSigningKey(key)));
        }

        // PEM of any of the above
        if let Ok(pem_str) = str::from_utf8(key_der) {
            if pem_str.contains("-----BEGIN") {
                if let Ok((_label, doc)) = pkcs8::Document::from_pem(pem_str) {
                    return self.load_private_key(doc.as_bytes());
                }
            }
        }

        Err("Failed to parse private key in any supported format".to_string())
    }
}

/// Static instance of the key provider.
pub(super) static KEY_PROVIDER: RustCryptoKeyProvider = RustCryptoKeyProvider;
