//! Session resumption state for TLS 1.2 and earlier.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use zeroize::Zeroize;

use crate::crypto::Secret;
use crate::message::{Certificate, Extensions, MaxFragmentLength};
use crate::types::{CipherSuite, ProtocolVersion, SessionId};
use crate::Error;

/// What a resumed handshake needs from the one that created the session.
///
/// Built through [`SessionParameters::builder()`]. The master secret is
/// zeroized on drop and by [`clear`](Self::clear).
#[derive(Clone)]
pub struct SessionParameters {
    cipher_suite: CipherSuite,
    version: ProtocolVersion,
    extended_master_secret: bool,
    master_secret: Secret,
    peer_certificate: Option<Certificate>,
    local_certificate: Option<Certificate>,
    psk_identity: Option<Vec<u8>>,
    srp_identity: Option<Vec<u8>>,
    encoded_server_extensions: Vec<u8>,
    server_extensions: OnceCell<Extensions>,
}

impl SessionParameters {
    pub fn builder() -> SessionParametersBuilder {
        SessionParametersBuilder::default()
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.cipher_suite
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn extended_master_secret(&self) -> bool {
        self.extended_master_secret
    }

    pub fn master_secret(&self) -> &[u8] {
        &self.master_secret
    }

    pub fn peer_certificate(&self) -> Option<&Certificate> {
        self.peer_certificate.as_ref()
    }

    pub fn local_certificate(&self) -> Option<&Certificate> {
        self.local_certificate.as_ref()
    }

    pub fn psk_identity(&self) -> Option<&[u8]> {
        self.psk_identity.as_deref()
    }

    pub fn srp_identity(&self) -> Option<&[u8]> {
        self.srp_identity.as_deref()
    }

    /// The extensions of the full handshake's ServerHello, decoded on first
    /// use.
    pub fn server_extensions(&self) -> Result<&Extensions, Error> {
        self.server_extensions.get_or_try_init(|| {
            if self.encoded_server_extensions.is_empty() {
                return Ok(Extensions::new());
            }
            crate::codec::decode_all(
                &self.encoded_server_extensions,
                Extensions::parse,
                "session server extensions",
            )
        })
    }

    /// The fragment limit negotiated by the full handshake.
    pub fn max_fragment_length(&self) -> Result<Option<MaxFragmentLength>, Error> {
        self.server_extensions()?.max_fragment_length()
    }

    /// Zeroize the master secret.
    pub fn clear(&mut self) {
        self.master_secret.zeroize();
    }
}

impl fmt::Debug for SessionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionParameters")
            .field("cipher_suite", &self.cipher_suite)
            .field("version", &self.version)
            .field("extended_master_secret", &self.extended_master_secret)
            .field("master_secret_len", &self.master_secret.len())
            .field("peer_certificate", &self.peer_certificate.as_ref().map(|c| c.len()))
            .finish()
    }
}

#[derive(Default)]
pub struct SessionParametersBuilder {
    cipher_suite: Option<CipherSuite>,
    version: Option<ProtocolVersion>,
    extended_master_secret: bool,
    master_secret: Option<Secret>,
    peer_certificate: Option<Certificate>,
    local_certificate: Option<Certificate>,
    psk_identity: Option<Vec<u8>>,
    srp_identity: Option<Vec<u8>>,
    server_extensions: Option<Extensions>,
}

impl SessionParametersBuilder {
    pub fn cipher_suite(mut self, suite: CipherSuite) -> Self {
        self.cipher_suite = Some(suite);
        self
    }

    pub fn version(mut self, version: ProtocolVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub fn extended_master_secret(mut self, ems: bool) -> Self {
        self.extended_master_secret = ems;
        self
    }

    pub fn master_secret(mut self, secret: &[u8]) -> Self {
        self.master_secret = Some(Secret::new(secret.to_vec()));
        self
    }

    pub fn peer_certificate(mut self, certificate: Option<Certificate>) -> Self {
        self.peer_certificate = certificate;
        self
    }

    pub fn local_certificate(mut self, certificate: Option<Certificate>) -> Self {
        self.local_certificate = certificate;
        self
    }

    pub fn psk_identity(mut self, identity: Option<Vec<u8>>) -> Self {
        self.psk_identity = identity;
        self
    }

    pub fn srp_identity(mut self, identity: Option<Vec<u8>>) -> Self {
        self.srp_identity = identity;
        self
    }

    pub fn server_extensions(mut self, extensions: Extensions) -> Self {
        self.server_extensions = Some(extensions);
        self
    }

    /// Fails with `internal_error` without a cipher suite or master secret.
    pub fn build(self) -> Result<SessionParameters, Error> {
        let cipher_suite = self
            .cipher_suite
            .ok_or_else(|| Error::InternalError("session without cipher suite".into()))?;
        let master_secret = self
            .master_secret
            .ok_or_else(|| Error::InternalError("session without master secret".into()))?;
        let mut encoded_server_extensions = Vec::new();
        if let Some(extensions) = &self.server_extensions {
            extensions.serialize(&mut encoded_server_extensions)?;
        }
        Ok(SessionParameters {
            cipher_suite,
            version: self.version.unwrap_or(ProtocolVersion::TLSV1_2),
            extended_master_secret: self.extended_master_secret,
            master_secret,
            peer_certificate: self.peer_certificate,
            local_certificate: self.local_certificate,
            psk_identity: self.psk_identity,
            srp_identity: self.srp_identity,
            encoded_server_extensions,
            server_extensions: OnceCell::new(),
        })
    }
}

/// A resumable session: an ID and its parameters.
///
/// Shared between the cache and connections as `Arc<Session>`. Once
/// invalidated it can never be resumed again.
pub struct Session {
    id: SessionId,
    parameters: Mutex<Option<SessionParameters>>,
}

impl Session {
    pub fn new(id: SessionId, parameters: SessionParameters) -> Self {
        Session {
            id,
            parameters: Mutex::new(Some(parameters)),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// A copy of the parameters, `None` once invalidated.
    pub fn parameters(&self) -> Option<SessionParameters> {
        self.parameters.lock().clone()
    }

    pub fn is_resumable(&self) -> bool {
        !self.id.is_empty() && self.parameters.lock().is_some()
    }

    /// Zeroize and drop the parameters.
    pub fn invalidate(&self) {
        if let Some(mut parameters) = self.parameters.lock().take() {
            parameters.clear();
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("resumable", &self.is_resumable())
            .finish()
    }
}

/// Server side store of resumable sessions.
pub trait SessionCache: Send + Sync + fmt::Debug {
    /// Store `session` under its ID, invalidating any previous session
    /// with the same ID.
    fn store(&self, session: Arc<Session>);

    fn lookup(&self, id: &[u8]) -> Option<Arc<Session>>;

    /// Remove and invalidate.
    fn remove(&self, id: &[u8]);
}

/// Bounded [`SessionCache`] evicting the oldest entry first.
#[derive(Debug)]
pub struct InMemorySessionCache {
    max_size: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    sessions: HashMap<Vec<u8>, Arc<Session>>,
    order: VecDeque<Vec<u8>>,
}

impl InMemorySessionCache {
    pub fn new(max_size: usize) -> Self {
        InMemorySessionCache {
            max_size: max_size.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemorySessionCache {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SessionCache for InMemorySessionCache {
    fn store(&self, session: Arc<Session>) {
        let id = session.id().as_slice().to_vec();
        if id.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        if let Some(previous) = inner.sessions.insert(id.clone(), session) {
            previous.invalidate();
            inner.order.retain(|k| *k != id);
        }
        inner.order.push_back(id);

        while inner.sessions.len() > self.max_size {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            trace!("Evict session {:02x?}", oldest);
            inner.sessions.remove(&oldest);
        }
    }

    fn lookup(&self, id: &[u8]) -> Option<Arc<Session>> {
        let inner = self.inner.lock();
        inner
            .sessions
            .get(id)
            .filter(|s| s.is_resumable())
            .cloned()
    }

    fn remove(&self, id: &[u8]) {
        let mut inner = self.inner.lock();
        if let Some(session) = inner.sessions.remove(id) {
            session.invalidate();
            inner.order.retain(|k| k.as_slice() != id);
        }
    }
}
