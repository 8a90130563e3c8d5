//! Handshake transcript hashing.
//!
//! The hash algorithm is unknown until the server selects a cipher suite,
//! so the transcript starts out as a raw buffer. Once the PRF is known the
//! buffered bytes are replayed into one running hash per tracked algorithm.
//! The raw buffer is dropped when tracking is sealed, unless buffering was
//! forced because a TLS 1.2 CertificateVerify signs the full transcript.

use std::collections::BTreeMap;

use crate::crypto::{HashContext, HashProvider};
use crate::types::{HashAlgorithm, MessageType, PrfAlgorithm};
use crate::Error;

pub(crate) struct DeferredHash {
    hash_provider: &'static dyn HashProvider,
    buffer: Option<Vec<u8>>,
    force_buffering: bool,
    sealed: bool,
    prf: Option<PrfAlgorithm>,
    hashes: BTreeMap<HashAlgorithm, Box<dyn HashContext>>,
}

impl DeferredHash {
    pub fn new(hash_provider: &'static dyn HashProvider) -> Self {
        DeferredHash {
            hash_provider,
            buffer: Some(Vec::new()),
            force_buffering: false,
            sealed: false,
            prf: None,
            hashes: BTreeMap::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        if let Some(buffer) = &mut self.buffer {
            buffer.extend_from_slice(data);
        }
        for ctx in self.hashes.values_mut() {
            ctx.update(data);
        }
    }

    /// Record the negotiated PRF and start the hashes it needs.
    pub fn notify_prf_determined(&mut self, prf: PrfAlgorithm) -> Result<(), Error> {
        if self.prf.is_some() {
            return Err(Error::InternalError("PRF already determined".into()));
        }
        self.prf = Some(prf);
        for hash in prf.transcript_hashes() {
            self.start_hash(*hash)?;
        }
        Ok(())
    }

    /// Keep a running hash for `hash` in addition to the PRF hashes.
    pub fn track_hash_algorithm(&mut self, hash: HashAlgorithm) -> Result<(), Error> {
        if self.sealed {
            return Err(Error::InternalError(
                "transcript hash tracking already sealed".into(),
            ));
        }
        self.start_hash(hash)
    }

    /// No more hash algorithms will be tracked.
    pub fn seal_hash_algorithms(&mut self) {
        self.sealed = true;
        if !self.force_buffering {
            self.buffer = None;
        }
    }

    /// Keep the raw transcript past sealing.
    pub fn force_buffering(&mut self) -> Result<(), Error> {
        if self.buffer.is_none() {
            return Err(Error::InternalError(
                "transcript buffer already released".into(),
            ));
        }
        self.force_buffering = true;
        Ok(())
    }

    /// Release a forced buffer once the signature over it is done.
    pub fn stop_buffering(&mut self) {
        self.force_buffering = false;
        if self.sealed {
            self.buffer = None;
        }
    }

    /// The raw transcript, while it is kept.
    pub fn buffered(&self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }

    pub fn prf(&self) -> Option<PrfAlgorithm> {
        self.prf
    }

    /// Hash of the transcript so far under the negotiated PRF. The legacy
    /// PRF uses MD5 || SHA-1.
    pub fn current_prf_hash(&self) -> Result<Vec<u8>, Error> {
        match self.prf {
            Some(PrfAlgorithm::Legacy) => {
                let mut out = self.final_hash(HashAlgorithm::MD5)?;
                out.extend_from_slice(&self.final_hash(HashAlgorithm::SHA1)?);
                Ok(out)
            }
            Some(PrfAlgorithm::Hash(hash)) => self.final_hash(hash),
            None => Err(Error::InternalError("PRF not determined".into())),
        }
    }

    /// Hash of the transcript so far. The running hash keeps going.
    pub fn final_hash(&self, hash: HashAlgorithm) -> Result<Vec<u8>, Error> {
        if let Some(ctx) = self.hashes.get(&hash) {
            return Ok(ctx.clone_and_finalize());
        }
        match &self.buffer {
            Some(buffer) => self
                .hash_provider
                .hash(hash, buffer)
                .map_err(Error::CryptoError),
            None => Err(Error::InternalError(format!(
                "{:?} is not tracked by the transcript",
                hash
            ))),
        }
    }

    /// Replace ClientHello1 by a synthetic `message_hash` message
    /// (RFC 8446 4.4.1) after a HelloRetryRequest.
    pub fn replace_with_message_hash(&mut self, hash: HashAlgorithm) -> Result<(), Error> {
        let digest = self.final_hash(hash)?;
        let prf = self.prf;
        self.reset();
        if let Some(prf) = prf {
            self.notify_prf_determined(prf)?;
        }
        let mut message = vec![MessageType::MessageHash.as_u8(), 0, 0, digest.len() as u8];
        message.extend_from_slice(&digest);
        self.update(&message);
        Ok(())
    }

    /// Back to the initial buffering state.
    pub fn reset(&mut self) {
        self.buffer = Some(Vec::new());
        self.force_buffering = false;
        self.sealed = false;
        self.prf = None;
        self.hashes.clear();
    }

    fn start_hash(&mut self, hash: HashAlgorithm) -> Result<(), Error> {
        if self.hashes.contains_key(&hash) {
            return Ok(());
        }
        let Some(buffer) = &self.buffer else {
            return Err(Error::InternalError(format!(
                "cannot start {:?} after the transcript buffer was released",
                hash
            )));
        };
        let mut ctx = self
            .hash_provider
            .create_hash(hash)
            .map_err(Error::CryptoError)?;
        ctx.update(buffer);
        self.hashes.insert(hash, ctx);
        Ok(())
    }
}

impl std::fmt::Debug for DeferredHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredHash")
            .field("buffered", &self.buffer.as_ref().map(|b| b.len()))
            .field("force_buffering", &self.force_buffering)
            .field("sealed", &self.sealed)
            .field("prf", &self.prf)
            .field("hashes", &self.hashes.keys().collect::<Vec<_>>())
            .finish()
    }
}
