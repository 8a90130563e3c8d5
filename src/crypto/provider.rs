//! Cryptographic provider traits for pluggable crypto backends.
//!
//! The protocol engines never touch cipher, hash or big number math
//! directly. They go through a [`CryptoProvider`], a struct of static
//! references to trait objects, each covering one capability.
//!
//! # Components
//!
//! - **Cipher suites** ([`SupportedCipherSuite`]): factories for AEAD and
//!   CBC bulk ciphers
//! - **Key exchange groups** ([`SupportedKxGroup`]): ECDHE and FFDHE
//! - **Finite field DH** ([`DhProvider`]): DH over explicit parameters
//! - **Certificates** ([`CertificateParser`], [`TlsCertificate`]): public key
//!   operations on a peer's end-entity certificate
//! - **Keys** ([`KeyProvider`], [`Signer`]): private key operations
//! - **Secure random** ([`SecureRandom`])
//! - **Hashing** ([`HashProvider`], [`HmacProvider`])
//! - **Key derivation** ([`PrfProvider`] for TLS 1.0 to 1.2, [`HkdfProvider`]
//!   for TLS 1.3)
//! - **SRP** ([`SrpProvider`]): RFC 5054 client and server math
//!
//! # Implementing a custom provider
//!
//! Implement the traits for your backend, create static instances and
//! build a [`CryptoProvider`] from references to them. Components can be
//! mixed with the default backend:
//!
//! ```
//! # #[cfg(feature = "rust-crypto")]
//! # fn main() {
//! use tlscore::crypto::{rust_crypto, CryptoProvider, SecureRandom};
//!
//! #[derive(Debug)]
//! struct Zeroes;
//!
//! impl SecureRandom for Zeroes {
//!     fn fill(&self, buf: &mut [u8]) -> Result<(), String> {
//!         buf.fill(0);
//!         Ok(())
//!     }
//! }
//!
//! static ZEROES: Zeroes = Zeroes;
//!
//! let provider = CryptoProvider {
//!     secure_random: &ZEROES,
//!     ..rust_crypto::default_provider()
//! };
//! # let _ = provider;
//! # }
//! # #[cfg(not(feature = "rust-crypto"))]
//! # fn main() {}
//! ```
//!
//! # Thread safety
//!
//! All component traits require [`CryptoSafe`]: `Send + Sync + Debug`
//! and unwind safety.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};
use std::sync::{Arc, OnceLock};

use zeroize::Zeroizing;

use crate::crypto::groups::{DhGroup, SrpGroup};
use crate::types::{CipherSuite, HashAlgorithm, KeyKind, NamedGroup, SignatureScheme};

/// Secret bytes that are wiped when dropped.
pub type Secret = Zeroizing<Vec<u8>>;

// ============================================================================
// Marker Trait
// ============================================================================

/// Bounds shared by every provider component.
pub trait CryptoSafe: Send + Sync + Debug + UnwindSafe + RefUnwindSafe {}

impl<T: Send + Sync + Debug + UnwindSafe + RefUnwindSafe> CryptoSafe for T {}

// ============================================================================
// Instance Traits
// ============================================================================

/// Keyed AEAD instance.
pub trait Cipher: CryptoSafe {
    /// Encrypt in place, appending the tag.
    fn encrypt(&mut self, data: &mut Vec<u8>, aad: &[u8], nonce: &[u8]) -> Result<(), String>;

    /// Verify and decrypt in place, removing the tag.
    fn decrypt(&mut self, data: &mut Vec<u8>, aad: &[u8], nonce: &[u8]) -> Result<(), String>;

    /// Authentication tag length.
    fn tag_len(&self) -> usize {
        16
    }
}

/// Keyed block cipher used in CBC mode.
pub trait BlockCipher: CryptoSafe {
    fn block_size(&self) -> usize {
        16
    }

    /// CBC encrypt `data` (a multiple of the block size) in place.
    fn cbc_encrypt(&self, iv: &[u8], data: &mut [u8]) -> Result<(), String>;

    /// CBC decrypt `data` (a multiple of the block size) in place.
    fn cbc_decrypt(&self, iv: &[u8], data: &mut [u8]) -> Result<(), String>;
}

/// Incremental hash.
pub trait HashContext: CryptoSafe {
    fn update(&mut self, data: &[u8]);

    /// Digest of everything so far. The context keeps accepting updates.
    fn clone_and_finalize(&self) -> Vec<u8>;
}

/// Private key operations of a local credential.
pub trait Signer: CryptoSafe {
    fn key_kind(&self) -> KeyKind;

    /// Signature schemes this key can produce, most preferred first.
    fn schemes(&self) -> &[SignatureScheme];

    /// Sign `data`, hashing it as the scheme prescribes.
    ///
    /// `None` selects the pre TLS 1.2 form: an MD5 || SHA-1 digest with
    /// unprefixed PKCS#1 padding for RSA, SHA-1 for ECDSA.
    fn sign(&self, scheme: Option<SignatureScheme>, data: &[u8]) -> Result<Vec<u8>, String>;

    /// RSAES-PKCS1-v1_5 decryption, for the RSA key exchange.
    fn decrypt(&self, _ciphertext: &[u8]) -> Result<Secret, String> {
        Err("key does not support decryption".to_string())
    }
}

/// Public key operations on a peer's end-entity certificate.
pub trait TlsCertificate: CryptoSafe {
    /// DER encoding as received.
    fn der(&self) -> &[u8];

    fn key_kind(&self) -> KeyKind;

    /// Verify `signature` over `data`. `None` selects the pre TLS 1.2 form,
    /// see [`Signer::sign`].
    fn verify_signature(
        &self,
        scheme: Option<SignatureScheme>,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), String>;

    /// RSAES-PKCS1-v1_5 encryption of the premaster secret.
    fn encrypt_pre_master_secret(&self, _pre_master_secret: &[u8]) -> Result<Vec<u8>, String> {
        Err("certificate key does not support encryption".to_string())
    }
}

/// Ephemeral key pair for one handshake.
pub trait ActiveKeyExchange: CryptoSafe {
    /// Encoded public key to send to the peer.
    fn pub_key(&self) -> &[u8];

    /// Combine with the peer's public key.
    fn complete(self: Box<Self>, peer_pub: &[u8]) -> Result<Secret, String>;

    fn group(&self) -> NamedGroup;
}

/// Server side of an SRP exchange.
pub trait SrpServerExchange: CryptoSafe {
    /// Server public value `B`.
    fn public_b(&self) -> &[u8];

    /// Compute the premaster secret from the client public value `A`.
    fn complete(self: Box<Self>, client_a: &[u8]) -> Result<Secret, String>;
}

// ============================================================================
// Factory Traits
// ============================================================================

/// Cipher suite support (factory for bulk ciphers).
pub trait SupportedCipherSuite: CryptoSafe {
    fn suite(&self) -> CipherSuite;

    /// Key material lengths: (mac_key_len, enc_key_len, fixed_iv_len).
    ///
    /// For CBC suites the IV length only applies to TLS 1.0, where the IV
    /// comes from the key block.
    fn key_lengths(&self) -> (usize, usize, usize);

    /// AEAD instance for the given key.
    fn create_cipher(&self, key: &[u8]) -> Result<Box<dyn Cipher>, String>;

    /// Block cipher instance for CBC suites.
    fn create_block_cipher(&self, _key: &[u8]) -> Result<Box<dyn BlockCipher>, String> {
        Err(format!("{:?} is not a CBC suite", self.suite()))
    }
}

/// Key exchange group support (factory for [`ActiveKeyExchange`]).
pub trait SupportedKxGroup: CryptoSafe {
    fn name(&self) -> NamedGroup;

    fn start_exchange(&self) -> Result<Box<dyn ActiveKeyExchange>, String>;
}

/// Finite field Diffie-Hellman over explicit parameters.
pub trait DhProvider: CryptoSafe {
    /// Start an exchange. Public key and shared secret are left padded to
    /// the length of the prime.
    fn start_exchange(&self, group: &DhGroup) -> Result<Box<dyn ActiveKeyExchange>, String>;
}

/// Certificate decoding (factory for [`TlsCertificate`]).
pub trait CertificateParser: CryptoSafe {
    fn parse(&self, der: &[u8]) -> Result<Arc<dyn TlsCertificate>, String>;
}

/// Private key loading (factory for [`Signer`]).
pub trait KeyProvider: CryptoSafe {
    /// Load a private key from PKCS#8 DER, SEC1 DER, PKCS#1 DER or PEM.
    fn load_private_key(&self, key_der: &[u8]) -> Result<Arc<dyn Signer>, String>;
}

/// Cryptographically secure random numbers.
pub trait SecureRandom: CryptoSafe {
    fn fill(&self, buf: &mut [u8]) -> Result<(), String>;
}

/// Hash factory.
pub trait HashProvider: CryptoSafe {
    fn create_hash(&self, algorithm: HashAlgorithm) -> Result<Box<dyn HashContext>, String>;

    /// One-shot digest.
    fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>, String> {
        let mut ctx = self.create_hash(algorithm)?;
        ctx.update(data);
        Ok(ctx.clone_and_finalize())
    }
}

/// TLS PRFs for versions up to 1.2.
pub trait PrfProvider: CryptoSafe {
    /// TLS 1.0/1.1 PRF: P_MD5 over the first half of the secret xor
    /// P_SHA1 over the second half.
    fn prf_legacy(
        &self,
        secret: &[u8],
        label: &str,
        seed: &[u8],
        output_len: usize,
    ) -> Result<Secret, String>;

    /// TLS 1.2 PRF: P_hash(secret, label || seed).
    fn prf_tls12(
        &self,
        secret: &[u8],
        label: &str,
        seed: &[u8],
        output_len: usize,
        hash: HashAlgorithm,
    ) -> Result<Secret, String>;
}

/// HKDF (RFC 5869) for TLS 1.3.
pub trait HkdfProvider: CryptoSafe {
    fn hkdf_extract(&self, hash: HashAlgorithm, salt: &[u8], ikm: &[u8])
        -> Result<Secret, String>;

    fn hkdf_expand(
        &self,
        hash: HashAlgorithm,
        prk: &[u8],
        info: &[u8],
        output_len: usize,
    ) -> Result<Secret, String>;

    /// HKDF-Expand-Label (RFC 8446 7.1).
    fn hkdf_expand_label(
        &self,
        hash: HashAlgorithm,
        secret: &[u8],
        label: &[u8],
        context: &[u8],
        output_len: usize,
    ) -> Result<Secret, String> {
        let full_label_len = 6 + label.len();
        if full_label_len > 255 || context.len() > 255 || output_len > 0xFFFF {
            return Err("HKDF-Expand-Label parameters out of range".to_string());
        }
        let mut info = Vec::with_capacity(4 + full_label_len + context.len());
        info.extend_from_slice(&(output_len as u16).to_be_bytes());
        info.push(full_label_len as u8);
        info.extend_from_slice(b"tls13 ");
        info.extend_from_slice(label);
        info.push(context.len() as u8);
        info.extend_from_slice(context);
        self.hkdf_expand(hash, secret, &info, output_len)
    }
}

/// HMAC.
pub trait HmacProvider: CryptoSafe {
    fn hmac(&self, hash: HashAlgorithm, key: &[u8], data: &[u8]) -> Result<Vec<u8>, String>;

    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<[u8; 32], String> {
        let mac = self.hmac(HashAlgorithm::SHA256, key, data)?;
        mac.as_slice()
            .try_into()
            .map_err(|_| format!("HMAC-SHA256 returned {} bytes", mac.len()))
    }
}

/// SRP-6a math (RFC 5054).
pub trait SrpProvider: CryptoSafe {
    /// Client side: returns `(A, premaster secret)` for the server values.
    fn client_exchange(
        &self,
        group: &SrpGroup,
        salt: &[u8],
        identity: &[u8],
        password: &[u8],
        server_b: &[u8],
    ) -> Result<(Vec<u8>, Secret), String>;

    /// Server side: generate `B` for the stored verifier.
    fn server_start(
        &self,
        group: &SrpGroup,
        verifier: &[u8],
    ) -> Result<Box<dyn SrpServerExchange>, String>;

    /// Verifier `v = g^x mod N` for the password.
    fn create_verifier(
        &self,
        group: &SrpGroup,
        salt: &[u8],
        identity: &[u8],
        password: &[u8],
    ) -> Result<Vec<u8>, String>;
}

// ============================================================================
// Core Provider Struct
// ============================================================================

/// Cryptographic provider for the protocol engines.
///
/// Holds `&'static` references to every component, so cloning it is cheap.
/// [`Config`](crate::Config) keeps one; connections copy it.
#[derive(Debug, Clone)]
pub struct CryptoProvider {
    /// Cipher suites with a bulk cipher implementation, in preference order.
    pub cipher_suites: &'static [&'static dyn SupportedCipherSuite],

    /// Named groups for ECDHE and the TLS 1.3 key share.
    pub kx_groups: &'static [&'static dyn SupportedKxGroup],

    /// Diffie-Hellman over explicit parameters (DH_anon).
    pub dh_provider: &'static dyn DhProvider,

    /// Peer certificate decoding.
    pub certificate_parser: &'static dyn CertificateParser,

    /// Private key loading.
    pub key_provider: &'static dyn KeyProvider,

    pub secure_random: &'static dyn SecureRandom,

    pub hash_provider: &'static dyn HashProvider,

    /// PRF for TLS 1.0 to 1.2 key derivation.
    pub prf_provider: &'static dyn PrfProvider,

    /// HKDF for the TLS 1.3 key schedule.
    pub hkdf_provider: &'static dyn HkdfProvider,

    /// HMAC for CBC record MACs and DTLS cookies.
    pub hmac_provider: &'static dyn HmacProvider,

    pub srp_provider: &'static dyn SrpProvider,
}

static DEFAULT: OnceLock<CryptoProvider> = OnceLock::new();

impl CryptoProvider {
    /// Install the process wide default provider.
    ///
    /// [`Config::builder()`](crate::Config::builder) falls back to it when
    /// no provider is set explicitly.
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    pub fn install_default(provider: CryptoProvider) {
        if DEFAULT.set(provider).is_err() {
            panic!("CryptoProvider::install_default() called more than once");
        }
    }

    /// The installed default provider, if any.
    pub fn get_default() -> Option<&'static CryptoProvider> {
        DEFAULT.get()
    }

    /// Bulk cipher factory for `suite`.
    pub fn find_cipher_suite(
        &self,
        suite: CipherSuite,
    ) -> Option<&'static dyn SupportedCipherSuite> {
        self.cipher_suites.iter().copied().find(|s| s.suite() == suite)
    }

    pub fn find_kx_group(&self, group: NamedGroup) -> Option<&'static dyn SupportedKxGroup> {
        self.kx_groups.iter().copied().find(|g| g.name() == group)
    }

    /// Whether a key exchange in `group` can be started, either through a
    /// named group implementation or the DH provider.
    pub fn supports_group(&self, group: NamedGroup) -> bool {
        self.find_kx_group(group).is_some()
    }

    /// Check the provider can run a handshake at all.
    pub(crate) fn validate(&self) -> Result<(), crate::Error> {
        if self.cipher_suites.is_empty() {
            return Err(crate::Error::ConfigError(
                "crypto provider has no cipher suites".into(),
            ));
        }
        if self.kx_groups.is_empty() {
            return Err(crate::Error::ConfigError(
                "crypto provider has no key exchange groups".into(),
            ));
        }
        for suite in self.cipher_suites {
            let hash = suite.suite().hash_algorithm();
            self.hash_provider
                .create_hash(hash)
                .map_err(|e| crate::Error::ConfigError(format!("{:?}: {}", suite.suite(), e)))?;
        }
        Ok(())
    }

    pub(crate) fn random_bytes(&self, len: usize) -> Result<Vec<u8>, String> {
        let mut out = vec![0; len];
        self.secure_random.fill(&mut out)?;
        Ok(out)
    }
}
