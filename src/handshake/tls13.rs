//! TLS 1.3 pieces shared by both roles.

use crate::crypto::key_schedule::KeySchedule;
use crate::crypto::record_cipher::{Aead13Cipher, RecordCipher};
use crate::crypto::{CryptoProvider, Secret, SupportedCipherSuite};
use crate::message::ServerHello;
use crate::transcript::DeferredHash;
use crate::types::{CipherSuite, HashAlgorithm, PrfAlgorithm};
use crate::Error;

const CLIENT_SIGNATURE_CONTEXT: &[u8] = b"TLS 1.3, client CertificateVerify";
const SERVER_SIGNATURE_CONTEXT: &[u8] = b"TLS 1.3, server CertificateVerify";

/// Key schedule of one TLS 1.3 handshake, holding the traffic secrets it
/// has derived so far.
pub(crate) struct Tls13Keys {
    provider: CryptoProvider,
    suite: &'static dyn SupportedCipherSuite,
    schedule: KeySchedule,
    client_handshake: Option<Secret>,
    server_handshake: Option<Secret>,
    client_application: Option<Secret>,
    server_application: Option<Secret>,
}

impl Tls13Keys {
    pub fn new(provider: &CryptoProvider, suite: CipherSuite) -> Result<Self, Error> {
        let factory = provider
            .find_cipher_suite(suite)
            .ok_or_else(|| Error::InternalError(format!("{:?} not supported by provider", suite)))?;
        let schedule = KeySchedule::new(provider, suite.hash_algorithm())?;
        Ok(Tls13Keys {
            provider: provider.clone(),
            suite: factory,
            schedule,
            client_handshake: None,
            server_handshake: None,
            client_application: None,
            server_application: None,
        })
    }

    pub fn hash(&self) -> HashAlgorithm {
        self.schedule.hash()
    }

    /// Mix in the (EC)DHE secret and derive the handshake traffic secrets
    /// over ClientHello..ServerHello.
    pub fn derive_handshake_secrets(
        &mut self,
        shared_secret: &[u8],
        transcript: &DeferredHash,
    ) -> Result<(), Error> {
        self.schedule.input_shared_secret(shared_secret)?;
        let hash = transcript.final_hash(self.hash())?;
        let (client, server) = self.schedule.handshake_traffic_secrets(&hash)?;
        self.client_handshake = Some(client);
        self.server_handshake = Some(server);
        Ok(())
    }

    /// Derive the application traffic secrets over ClientHello..server
    /// Finished.
    pub fn derive_application_secrets(&mut self, transcript: &DeferredHash) -> Result<(), Error> {
        self.schedule.input_master()?;
        let hash = transcript.final_hash(self.hash())?;
        let (client, server) = self.schedule.application_traffic_secrets(&hash)?;
        self.client_application = Some(client);
        self.server_application = Some(server);
        Ok(())
    }

    fn handshake_secret(&self, client: bool) -> Result<&Secret, Error> {
        let secret = if client {
            &self.client_handshake
        } else {
            &self.server_handshake
        };
        secret
            .as_ref()
            .ok_or_else(|| Error::InternalError("handshake secrets not derived".into()))
    }

    fn application_secret(&self, client: bool) -> Result<&Secret, Error> {
        let secret = if client {
            &self.client_application
        } else {
            &self.server_application
        };
        secret
            .as_ref()
            .ok_or_else(|| Error::InternalError("application secrets not derived".into()))
    }

    /// Record protection with the client's (`client == true`) or the
    /// server's handshake traffic secret.
    pub fn handshake_cipher(&self, client: bool) -> Result<Box<dyn RecordCipher>, Error> {
        let secret = self.handshake_secret(client)?.clone();
        self.traffic_cipher(secret)
    }

    pub fn application_cipher(&self, client: bool) -> Result<Box<dyn RecordCipher>, Error> {
        let secret = self.application_secret(client)?.clone();
        self.traffic_cipher(secret)
    }

    fn traffic_cipher(&self, secret: Secret) -> Result<Box<dyn RecordCipher>, Error> {
        let cipher = Aead13Cipher::new(&self.provider, self.suite, self.hash(), secret)?;
        Ok(Box::new(cipher))
    }

    /// Finished verify data of one side over the transcript so far.
    pub fn finished(&self, client: bool, transcript: &DeferredHash) -> Result<Vec<u8>, Error> {
        let hash = transcript.final_hash(self.hash())?;
        self.schedule
            .verify_data(self.handshake_secret(client)?, &hash)
    }

    /// Zeroize every secret held.
    pub fn clear(&mut self) {
        self.schedule.clear();
        self.client_handshake = None;
        self.server_handshake = None;
        self.client_application = None;
        self.server_application = None;
    }
}

/// The content covered by a TLS 1.3 CertificateVerify signature
/// (RFC 8446 4.4.3).
pub(crate) fn certificate_verify_content(server: bool, transcript_hash: &[u8]) -> Vec<u8> {
    let context = if server {
        SERVER_SIGNATURE_CONTEXT
    } else {
        CLIENT_SIGNATURE_CONTEXT
    };
    let mut content = vec![0x20; 64];
    content.extend_from_slice(context);
    content.push(0);
    content.extend_from_slice(transcript_hash);
    content
}

/// Whether a ServerHello body is a HelloRetryRequest.
pub(crate) fn is_hello_retry_request(hello: &ServerHello) -> bool {
    hello.is_hello_retry_request()
}

/// Swap ClientHello1 for its `message_hash` stand-in once a
/// HelloRetryRequest selected `suite`. The caller hashes the retry request
/// itself afterwards.
pub(crate) fn restart_transcript_for_retry(
    transcript: &mut DeferredHash,
    suite: CipherSuite,
) -> Result<(), Error> {
    let hash = suite.hash_algorithm();
    if transcript.prf().is_none() {
        transcript.notify_prf_determined(PrfAlgorithm::Hash(hash))?;
    }
    transcript.replace_with_message_hash(hash)
}

#[cfg(all(test, feature = "rust-crypto"))]
mod tests {
    use super::*;
    use crate::crypto::rust_crypto::default_provider;

    #[test]
    fn signature_content_layout() {
        let content = certificate_verify_content(true, &[0xAB; 32]);
        assert_eq!(&content[..64], &[0x20; 64][..]);
        assert_eq!(&content[64..64 + SERVER_SIGNATURE_CONTEXT.len()], SERVER_SIGNATURE_CONTEXT);
        assert_eq!(content[64 + SERVER_SIGNATURE_CONTEXT.len()], 0);
        assert_eq!(content.len(), 64 + SERVER_SIGNATURE_CONTEXT.len() + 1 + 32);

        let client = certificate_verify_content(false, &[0xAB; 32]);
        assert_ne!(content, client);
    }

    #[test]
    fn both_sides_derive_the_same_keys() {
        let provider = default_provider();
        let mut transcript = DeferredHash::new(provider.hash_provider);
        transcript.update(b"client hello");
        transcript.update(b"server hello");
        transcript
            .notify_prf_determined(PrfAlgorithm::Hash(HashAlgorithm::SHA256))
            .unwrap();

        let suite = CipherSuite::TLS13_AES_128_GCM_SHA256;
        let mut client = Tls13Keys::new(&provider, suite).unwrap();
        let mut server = Tls13Keys::new(&provider, suite).unwrap();
        client.derive_handshake_secrets(&[9; 32], &transcript).unwrap();
        server.derive_handshake_secrets(&[9; 32], &transcript).unwrap();

        assert_eq!(
            client.finished(false, &transcript).unwrap(),
            server.finished(false, &transcript).unwrap()
        );
        assert_ne!(
            client.finished(true, &transcript).unwrap(),
            client.finished(false, &transcript).unwrap()
        );
        assert!(client.application_cipher(true).is_err());

        client.derive_application_secrets(&transcript).unwrap();
        assert!(client.application_cipher(true).is_ok());

        client.clear();
        assert!(client.handshake_cipher(true).is_err());
    }

    #[test]
    fn retry_replaces_first_hello() {
        let provider = default_provider();
        let mut transcript = DeferredHash::new(provider.hash_provider);
        transcript.update(b"client hello 1");
        restart_transcript_for_retry(&mut transcript, CipherSuite::TLS13_AES_128_GCM_SHA256)
            .unwrap();
        assert_eq!(
            transcript.prf(),
            Some(PrfAlgorithm::Hash(HashAlgorithm::SHA256))
        );

        let mut expected = DeferredHash::new(provider.hash_provider);
        let digest = provider
            .hash_provider
            .hash(HashAlgorithm::SHA256, b"client hello 1")
            .unwrap();
        let mut synthetic = vec![254, 0, 0, 32];
        synthetic.extend_from_slice(&digest);
        expected.update(&synthetic);
        assert_eq!(
            transcript.final_hash(HashAlgorithm::SHA256).unwrap(),
            expected.final_hash(HashAlgorithm::SHA256).unwrap()
        );
    }
}
