//! TLS 1.3 key schedule (RFC 8446 7.1).
//!
//! ```text
//!              0
//!              |
//!    0 ->  HKDF-Extract = Early Secret
//!              |
//!        Derive-Secret(., "derived", "")
//!              |
//! (EC)DHE -> HKDF-Extract = Handshake Secret
//!              +-----> "c hs traffic" / "s hs traffic" (CH..SH)
//!              |
//!        Derive-Secret(., "derived", "")
//!              |
//!    0 ->  HKDF-Extract = Master Secret
//!              +-----> "c ap traffic" / "s ap traffic" (CH..server Finished)
//!              +-----> "exp master" (CH..server Finished)
//!              +-----> "res master" (CH..client Finished)
//! ```
//!
//! PSK input is always zero: resumption and 0-RTT are not offered.

use crate::crypto::provider::{CryptoProvider, Secret};
use crate::types::HashAlgorithm;
use crate::Error;

/// Which secret the schedule currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Derived from the early secret, waiting for the shared secret.
    AwaitHandshakeInput,
    /// Handshake secret derived, waiting for the transition to master.
    Handshake,
    Master,
}

pub(crate) struct KeySchedule {
    provider: CryptoProvider,
    hash: HashAlgorithm,
    stage: Stage,
    secret: Secret,
}

impl KeySchedule {
    pub fn new(provider: &CryptoProvider, hash: HashAlgorithm) -> Result<Self, Error> {
        let zeros = vec![0; hash.output_len()];
        let early = provider
            .hkdf_provider
            .hkdf_extract(hash, &[], &zeros)
            .map_err(Error::CryptoError)?;

        let mut schedule = KeySchedule {
            provider: provider.clone(),
            hash,
            stage: Stage::AwaitHandshakeInput,
            secret: early,
        };
        schedule.secret = schedule.derive_secret(&schedule.secret, b"derived", &[])?;
        Ok(schedule)
    }

    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    /// Mix in the (EC)DHE shared secret.
    pub fn input_shared_secret(&mut self, shared: &[u8]) -> Result<(), Error> {
        self.expect_stage(Stage::AwaitHandshakeInput)?;
        self.secret = self
            .provider
            .hkdf_provider
            .hkdf_extract(self.hash, &self.secret, shared)
            .map_err(Error::CryptoError)?;
        self.stage = Stage::Handshake;
        Ok(())
    }

    /// `(client, server)` handshake traffic secrets over CH..SH.
    pub fn handshake_traffic_secrets(
        &self,
        transcript_hash: &[u8],
    ) -> Result<(Secret, Secret), Error> {
        self.expect_stage(Stage::Handshake)?;
        let client = self.derive_secret_hashed(&self.secret, b"c hs traffic", transcript_hash)?;
        let server = self.derive_secret_hashed(&self.secret, b"s hs traffic", transcript_hash)?;
        Ok((client, server))
    }

    /// Move from the handshake secret to the master secret.
    pub fn input_master(&mut self) -> Result<(), Error> {
        self.expect_stage(Stage::Handshake)?;
        let derived = self.derive_secret(&self.secret, b"derived", &[])?;
        let zeros = vec![0; self.hash.output_len()];
        self.secret = self
            .provider
            .hkdf_provider
            .hkdf_extract(self.hash, &derived, &zeros)
            .map_err(Error::CryptoError)?;
        self.stage = Stage::Master;
        Ok(())
    }

    /// `(client, server)` application traffic secrets over CH..server Finished.
    pub fn application_traffic_secrets(
        &self,
        transcript_hash: &[u8],
    ) -> Result<(Secret, Secret), Error> {
        self.expect_stage(Stage::Master)?;
        let client = self.derive_secret_hashed(&self.secret, b"c ap traffic", transcript_hash)?;
        let server = self.derive_secret_hashed(&self.secret, b"s ap traffic", transcript_hash)?;
        Ok((client, server))
    }

    /// Finished verify data: HMAC(finished_key(base), transcript_hash).
    pub fn verify_data(
        &self,
        base_secret: &[u8],
        transcript_hash: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let finished_key =
            self.expand_label(base_secret, b"finished", &[], self.hash.output_len())?;
        self.provider
            .hmac_provider
            .hmac(self.hash, &finished_key, transcript_hash)
            .map_err(Error::CryptoError)
    }

    /// Clear the secret held by the schedule.
    pub fn clear(&mut self) {
        self.secret = Secret::new(Vec::new());
    }

    fn expand_label(
        &self,
        secret: &[u8],
        label: &[u8],
        context: &[u8],
        len: usize,
    ) -> Result<Secret, Error> {
        self.provider
            .hkdf_provider
            .hkdf_expand_label(self.hash, secret, label, context, len)
            .map_err(Error::CryptoError)
    }

    /// Derive-Secret with the transcript hash already computed.
    fn derive_secret_hashed(
        &self,
        secret: &[u8],
        label: &[u8],
        hash: &[u8],
    ) -> Result<Secret, Error> {
        self.expand_label(secret, label, hash, self.hash.output_len())
    }

    /// Derive-Secret over raw `messages`.
    fn derive_secret(&self, secret: &[u8], label: &[u8], messages: &[u8]) -> Result<Secret, Error> {
        let hash = self
            .provider
            .hash_provider
            .hash(self.hash, messages)
            .map_err(Error::CryptoError)?;
        self.derive_secret_hashed(secret, label, &hash)
    }

    fn expect_stage(&self, stage: Stage) -> Result<(), Error> {
        if self.stage != stage {
            return Err(Error::InternalError(format!(
                "key schedule in {:?}, expected {:?}",
                self.stage, stage
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for KeySchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySchedule")
            .field("hash", &self.hash)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "rust-crypto"))]
mod tests {
    use super::*;
    use crate::crypto::rust_crypto;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    // RFC 8448 section 3, simple 1-RTT handshake.
    #[test]
    fn rfc8448_handshake_secrets() {
        let provider = rust_crypto::default_provider();
        let mut ks = KeySchedule::new(&provider, HashAlgorithm::SHA256).unwrap();

        let shared = hex("8bd4054fb55b9d63fdfbacf9f04b9f0d35e6d63f537563efd46272900f89492d");
        ks.input_shared_secret(&shared).unwrap();

        let transcript =
            hex("860c06edc07858ee8e78f0e7428c58edd6b43f2ca3e6e95f02ed063cf0e1cad8");
        let (client, server) = ks.handshake_traffic_secrets(&transcript).unwrap();
        assert_eq!(
            client.as_slice(),
            hex("b3eddb126e067f35a780b3abf45e2d8f3b1a950738f52e9600746a0e27a55a21")
        );
        assert_eq!(
            server.as_slice(),
            hex("b67b7d690cc16c4e75e54213cb2d37b4e9c912bcded9105d42befd59d391ad38")
        );

        let key = ks.expand_label(&server, b"key", &[], 16).unwrap();
        let iv = ks.expand_label(&server, b"iv", &[], 12).unwrap();
        assert_eq!(key.as_slice(), hex("3fce516009c21727d0f2e4e86ee403bc"));
        assert_eq!(iv.as_slice(), hex("5d313eb2671276ee13000b30"));
    }

    #[test]
    fn stages_are_enforced() {
        let provider = rust_crypto::default_provider();
        let mut ks = KeySchedule::new(&provider, HashAlgorithm::SHA256).unwrap();
        assert!(ks.application_traffic_secrets(&[0; 32]).is_err());
        assert!(ks.input_master().is_err());
        ks.input_shared_secret(&[1; 32]).unwrap();
        assert!(ks.input_shared_secret(&[1; 32]).is_err());
        ks.input_master().unwrap();
        assert!(ks.application_traffic_secrets(&[0; 32]).is_ok());
    }
}
