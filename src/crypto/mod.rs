//! Cryptography seam of the protocol engines.
//!
//! Primitives come from a [`CryptoProvider`]. This module also holds the
//! protocol level derivations built on top of it: the TLS 1.0 to 1.2 PRF
//! usage, the TLS 1.3 key schedule and record protection.

mod groups;
pub(crate) mod key_schedule;
pub(crate) mod prf;
pub mod provider;
pub(crate) mod record_cipher;

#[cfg(feature = "rust-crypto")]
pub mod rust_crypto;

pub use groups::{DhGroup, SrpGroup};
pub(crate) use groups::strip_leading_zeros;

pub use provider::{ActiveKeyExchange, BlockCipher, Cipher, CryptoProvider, CryptoSafe};
pub use provider::{CertificateParser, DhProvider, KeyProvider, SecureRandom, Signer};
pub use provider::{HashContext, HashProvider, HkdfProvider, HmacProvider, PrfProvider};
pub use provider::{Secret, SrpProvider, SrpServerExchange, TlsCertificate};
pub use provider::{SupportedCipherSuite, SupportedKxGroup};

pub use crate::types::{CipherSuite, HashAlgorithm, KeyKind, NamedGroup, SignatureScheme};
