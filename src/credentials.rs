//! Local credentials and peer authentication hooks.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use subtle::ConstantTimeEq;

use crate::certificate::calculate_fingerprint;
use crate::crypto::{CryptoProvider, Secret, Signer, SrpGroup, TlsCertificate};
use crate::types::KeyKind;
use crate::Error;

/// A certificate chain and the signer for its end entity key.
#[derive(Clone)]
pub struct Credentials {
    chain: Vec<Vec<u8>>,
    certificate: Arc<dyn TlsCertificate>,
    signer: Arc<dyn Signer>,
}

impl Credentials {
    /// Pair an already loaded signer with its chain. The end entity key must
    /// be of the signer's kind.
    pub fn new(
        provider: &CryptoProvider,
        chain: Vec<Vec<u8>>,
        signer: Arc<dyn Signer>,
    ) -> Result<Self, Error> {
        let end_entity = chain
            .first()
            .ok_or_else(|| Error::ConfigError("empty certificate chain".into()))?;
        let certificate = provider
            .certificate_parser
            .parse(end_entity)
            .map_err(Error::ConfigError)?;
        if certificate.key_kind() != signer.key_kind() {
            return Err(Error::ConfigError(format!(
                "certificate key {:?} does not match private key {:?}",
                certificate.key_kind(),
                signer.key_kind()
            )));
        }
        Ok(Credentials {
            chain,
            certificate,
            signer,
        })
    }

    /// Load the private key from DER (or PEM) through the provider.
    pub fn from_der(
        provider: &CryptoProvider,
        chain: Vec<Vec<u8>>,
        private_key: &[u8],
    ) -> Result<Self, Error> {
        let signer = provider
            .key_provider
            .load_private_key(private_key)
            .map_err(Error::ConfigError)?;
        Self::new(provider, chain, signer)
    }

    /// DER certificates, end entity first.
    pub fn chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    pub fn certificate(&self) -> &Arc<dyn TlsCertificate> {
        &self.certificate
    }

    pub fn signer(&self) -> &Arc<dyn Signer> {
        &self.signer
    }

    pub fn key_kind(&self) -> KeyKind {
        self.signer.key_kind()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("chain", &self.chain.len())
            .field("key_kind", &self.key_kind())
            .finish()
    }
}

/// Whether a server asks for and insists on a client certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientAuth {
    #[default]
    None,
    /// Request a certificate, accept an empty chain.
    Optional,
    /// Request a certificate, fail without one.
    Required,
}

/// What a [`CertificateVerifier`] is told about the chain it checks.
#[derive(Debug, Clone, Copy)]
pub struct VerifyContext<'a> {
    /// The name the client asked for, if any.
    pub server_name: Option<&'a str>,
    /// `true` when the chain is the server's.
    pub is_server: bool,
    /// Stapled OCSP response for the end entity.
    pub ocsp: Option<&'a [u8]>,
}

/// Peer certificate policy.
///
/// The engines only call this hook; trust anchors, path building and
/// revocation are the implementor's business. An `Err` aborts the handshake
/// with the error's alert, typically `bad_certificate`.
pub trait CertificateVerifier: Send + Sync + fmt::Debug {
    fn verify(&self, chain: &[Vec<u8>], context: &VerifyContext<'_>) -> Result<(), Error>;
}

/// Accept exactly the end entity certificates with the given SHA-256
/// fingerprints.
#[derive(Debug, Clone, Default)]
pub struct FingerprintVerifier {
    fingerprints: Vec<Vec<u8>>,
}

impl FingerprintVerifier {
    pub fn new(fingerprints: Vec<Vec<u8>>) -> Self {
        FingerprintVerifier { fingerprints }
    }

    pub fn for_certificate(cert_der: &[u8]) -> Self {
        Self::new(vec![calculate_fingerprint(cert_der)])
    }
}

impl CertificateVerifier for FingerprintVerifier {
    fn verify(&self, chain: &[Vec<u8>], _context: &VerifyContext<'_>) -> Result<(), Error> {
        let end_entity = chain
            .first()
            .ok_or_else(|| Error::BadCertificate("empty chain".into()))?;
        let fingerprint = calculate_fingerprint(end_entity);
        if self.fingerprints.iter().any(|f| bool::from(f.ct_eq(&fingerprint))) {
            Ok(())
        } else {
            Err(Error::BadCertificate("unknown certificate fingerprint".into()))
        }
    }
}

/// Client side pre-shared key.
#[derive(Clone)]
pub struct PskCredentials {
    pub identity: Vec<u8>,
    pub key: Secret,
}

impl PskCredentials {
    pub fn new(identity: &[u8], key: &[u8]) -> Self {
        PskCredentials {
            identity: identity.to_vec(),
            key: Secret::new(key.to_vec()),
        }
    }
}

impl fmt::Debug for PskCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PskCredentials")
            .field("identity", &String::from_utf8_lossy(&self.identity))
            .field("key", &self.key.len())
            .finish()
    }
}

/// Server side pre-shared keys.
pub trait PskStore: Send + Sync + fmt::Debug {
    /// Hint sent in ServerKeyExchange. `None` skips the message.
    fn identity_hint(&self) -> Option<Vec<u8>> {
        None
    }

    fn lookup(&self, identity: &[u8]) -> Option<Secret>;
}

#[derive(Default)]
pub struct InMemoryPskStore {
    hint: Option<Vec<u8>>,
    keys: RwLock<HashMap<Vec<u8>, Secret>>,
}

impl InMemoryPskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity_hint(mut self, hint: &[u8]) -> Self {
        self.hint = Some(hint.to_vec());
        self
    }

    pub fn insert(&self, identity: &[u8], key: &[u8]) {
        self.keys
            .write()
            .insert(identity.to_vec(), Secret::new(key.to_vec()));
    }
}

impl PskStore for InMemoryPskStore {
    fn identity_hint(&self) -> Option<Vec<u8>> {
        self.hint.clone()
    }

    fn lookup(&self, identity: &[u8]) -> Option<Secret> {
        self.keys.read().get(identity).cloned()
    }
}

impl fmt::Debug for InMemoryPskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryPskStore")
            .field("hint", &self.hint)
            .field("identities", &self.keys.read().len())
            .finish()
    }
}

/// Client side SRP user name and password.
#[derive(Clone)]
pub struct SrpCredentials {
    pub identity: Vec<u8>,
    pub password: Secret,
}

impl SrpCredentials {
    pub fn new(identity: &[u8], password: &[u8]) -> Self {
        SrpCredentials {
            identity: identity.to_vec(),
            password: Secret::new(password.to_vec()),
        }
    }
}

impl fmt::Debug for SrpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SrpCredentials")
            .field("identity", &String::from_utf8_lossy(&self.identity))
            .finish()
    }
}

/// A stored SRP verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpVerifier {
    pub group: SrpGroup,
    pub salt: Vec<u8>,
    pub verifier: Vec<u8>,
}

/// Server side SRP verifiers.
pub trait SrpStore: Send + Sync + fmt::Debug {
    fn lookup(&self, identity: &[u8]) -> Option<SrpVerifier>;
}

#[derive(Debug, Default)]
pub struct InMemorySrpStore {
    users: RwLock<HashMap<Vec<u8>, SrpVerifier>>,
}

impl InMemorySrpStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive and store a verifier for `identity` in the RFC 5054 1024 bit
    /// group, with a fresh 16 byte salt.
    pub fn add_user(
        &self,
        provider: &CryptoProvider,
        identity: &[u8],
        password: &[u8],
    ) -> Result<(), Error> {
        let group = SrpGroup::rfc5054_1024();
        let salt = provider.random_bytes(16).map_err(Error::CryptoError)?;
        let verifier = provider
            .srp_provider
            .create_verifier(&group, &salt, identity, password)
            .map_err(Error::CryptoError)?;
        self.insert(
            identity,
            SrpVerifier {
                group,
                salt,
                verifier,
            },
        );
        Ok(())
    }

    pub fn insert(&self, identity: &[u8], verifier: SrpVerifier) {
        self.users.write().insert(identity.to_vec(), verifier);
    }
}

impl SrpStore for InMemorySrpStore {
    fn lookup(&self, identity: &[u8]) -> Option<SrpVerifier> {
        self.users.read().get(identity).cloned()
    }
}
