//! RustCrypto cryptographic provider implementation for tlscore.
//!
//! This module provides a pure Rust cryptographic backend using crates
//! from the [RustCrypto](https://github.com/RustCrypto) organization.
//!
//! # Feature Flag
//!
//! This module is only available when the `rust-crypto` feature is enabled.
//! It is part of the default features. To use tlscore without it, disable
//! default features and supply your own [`CryptoProvider`]:
//!
//! ```toml
//! tlscore = { version = "...", default-features = false }
//! ```
//!
//! # Usage
//!
//! ```
//! # #[cfg(feature = "rcgen")]
//! # fn main() {
//! use std::sync::Arc;
//! use tlscore::{certificate, Config, Credentials, TlsServerProtocol};
//! use tlscore::crypto::rust_crypto;
//!
//! let cert = certificate::generate_self_signed_certificate().unwrap();
//! let provider = rust_crypto::default_provider();
//! let credentials = Credentials::from_der(&provider, vec![cert.certificate], &cert.private_key)
//!     .unwrap();
//! let config = Arc::new(
//!     Config::builder()
//!         .with_crypto_provider(provider)
//!         .with_credentials(credentials)
//!         .build()
//!         .unwrap(),
//! );
//! let server = TlsServerProtocol::new(config);
//! # let _ = server;
//! # }
//! # #[cfg(not(feature = "rcgen"))]
//! # fn main() {}
//! ```

mod certificate;
mod cipher_suite;
mod dh;
mod hash;
mod hkdf;
mod hmac;
mod kx_group;
mod random;
mod sign;
mod srp;

use crate::crypto::provider::CryptoProvider;

/// Get the default RustCrypto-based crypto provider.
///
/// # Supported Cipher Suites
///
/// - TLS 1.3: `TLS_AES_128_GCM_SHA256`, `TLS_AES_256_GCM_SHA384`
/// - ECDHE with ECDSA or RSA authentication, AES-GCM
/// - RSA key transport with AES-GCM and AES-CBC/HMAC-SHA1
/// - PSK with AES-GCM
/// - SRP-SHA with AES-CBC/HMAC-SHA1
/// - Anonymous DH with AES-GCM
///
/// # Supported Key Exchange Groups
///
/// - `x25519`
/// - `secp256r1` (P-256) and `secp384r1` (P-384)
/// - `ffdhe2048` (RFC 7919)
///
/// # Keys and Certificates
///
/// ECDSA (P-256, P-384) and RSA (PKCS#1 v1.5, PSS) keys in PKCS#8, SEC1 or
/// PKCS#1 DER, or PEM encoded. Peer certificates are decoded with
/// `x509-cert`.
///
/// # Random Number Generation
///
/// Uses `OsRng` from `rand_core`.
pub fn default_provider() -> CryptoProvider {
    CryptoProvider {
        cipher_suites: cipher_suite::ALL_CIPHER_SUITES,
        kx_groups: kx_group::ALL_KX_GROUPS,
        dh_provider: &dh::DH_PROVIDER,
        certificate_parser: &certificate::CERTIFICATE_PARSER,
        key_provider: &sign::KEY_PROVIDER,
        secure_random: &random::SECURE_RANDOM,
        hash_provider: &hash::HASH_PROVIDER,
        prf_provider: &hmac::PRF_PROVIDER,
        hkdf_provider: &hkdf::HKDF_PROVIDER,
        hmac_provider: &hmac::HMAC_PROVIDER,
        srp_provider: &srp::SRP_PROVIDER,
    }
}
