//! HMAC and the TLS PRFs using RustCrypto.

use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

use crate::crypto::provider::{HmacProvider, PrfProvider, Secret};
use crate::types::HashAlgorithm;

fn hmac_with<M: Mac + hmac::digest::KeyInit>(
    key: &[u8],
    parts: &[&[u8]],
) -> Result<Vec<u8>, String> {
    let mut mac = <M as Mac>::new_from_slice(key).map_err(|_| "Invalid HMAC key".to_string())?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

/// HMAC over the concatenation of `parts`.
fn hmac_parts(hash: HashAlgorithm, key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, String> {
    match hash {
        HashAlgorithm::MD5 => hmac_with::<Hmac<Md5>>(key, parts),
        HashAlgorithm::SHA1 => hmac_with::<Hmac<Sha1>>(key, parts),
        HashAlgorithm::SHA256 => hmac_with::<Hmac<Sha256>>(key, parts),
        HashAlgorithm::SHA384 => hmac_with::<Hmac<Sha384>>(key, parts),
        HashAlgorithm::SHA512 => hmac_with::<Hmac<Sha512>>(key, parts),
        _ => Err(format!("Unsupported HMAC hash algorithm: {:?}", hash)),
    }
}

/// P_hash (RFC 5246 5) appending `output_len` bytes to `out`.
fn p_hash(
    hash: HashAlgorithm,
    secret: &[u8],
    full_seed: &[u8],
    out: &mut Vec<u8>,
    output_len: usize,
) -> Result<(), String> {
    // A(1) = HMAC_hash(secret, A(0)) where A(0) = seed
    let mut a = hmac_parts(hash, secret, &[full_seed])?;

    while out.len() < output_len {
        // HMAC_hash(secret, A(i) + seed)
        let output = hmac_parts(hash, secret, &[&a, full_seed])?;
        let to_copy = (output_len - out.len()).min(output.len());
        out.extend_from_slice(&output[..to_copy]);

        if out.len() < output_len {
            a = hmac_parts(hash, secret, &[&a])?;
        }
    }
    Ok(())
}

fn full_seed(label: &str, seed: &[u8]) -> Vec<u8> {
    let mut full = Vec::with_capacity(label.len() + seed.len());
    full.extend_from_slice(label.as_bytes());
    full.extend_from_slice(seed);
    full
}

/// HMAC provider implementation.
#[derive(Debug)]
pub(super) struct RustCryptoHmacProvider;

impl HmacProvider for RustCryptoHmacProvider {
    fn hmac(&self, hash: HashAlgorithm, key: &[u8], data: &[u8]) -> Result<Vec<u8>, String> {
        hmac_parts(hash, key, &[data])
    }
}

/// PRF provider implementation.
#[derive(Debug)]
pub(super) struct RustCryptoPrfProvider;

impl PrfProvider for RustCryptoPrfProvider {
    fn prf_legacy(
        &self,
        secret: &[u8],
        label: &str,
        seed: &[u8],
        output_len: usize,
    ) -> Result<Secret, String> {
        let full_seed = full_seed(label, seed);

        // The halves overlap by one byte when the secret length is odd.
        let half = secret.len().div_ceil(2);
        let s1 = &secret[..half];
        let s2 = &secret[secret.len() - half..];

        let mut md5 = Secret::new(Vec::with_capacity(output_len));
        p_hash(HashAlgorithm::MD5, s1, &full_seed, &mut md5, output_len)?;
        let mut sha1 = Secret::new(Vec::with_capacity(output_len));
        p_hash(HashAlgorithm::SHA1, s2, &full_seed, &mut sha1, output_len)?;

        for (a, b) in md5.iter_mut().zip(sha1.iter()) {
            *a ^= b;
        }
        Ok(md5)
    }

    fn prf_tls12(
        &self,
        secret: &[u8],
        label: &str,
        seed: &[u8],
        output_len: usize,
        hash: HashAlgorithm,
    ) -> Result<Secret, String> {
        if !matches!(hash, HashAlgorithm::SHA256 | HashAlgorithm::SHA384) {
            return Err(format!("Unsupported PRF hash for TLS1.2: {:?}", hash));
        }
        let mut out = Secret::new(Vec::with_capacity(output_len));
        p_hash(hash, secret, &full_seed(label, seed), &mut out, output_len)?;
        Ok(out)
    }
}

/// Static instance of the HMAC provider.
pub(super) static HMAC_PROVIDER: RustCryptoHmacProvider = RustCryptoHmacProvider;

/// Static instance of the PRF provider.
pub(super) static PRF_PROVIDER: RustCryptoPrfProvider = RustCryptoPrfProvider;
