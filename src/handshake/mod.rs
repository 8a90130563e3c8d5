//! Handshake state machines.
//!
//! [`ClientHandshake`](client::ClientHandshake) and
//! [`ServerHandshake`](server::ServerHandshake) are independent machines
//! keyed by [`ConnectionState`]. They never touch a transport: records,
//! flights and cipher changes go through [`HandshakeIo`], which the stream
//! and datagram wrappers implement. The free functions in this module are
//! the steps both roles share.

use std::sync::Arc;

use subtle::ConstantTimeEq;

use crate::config::Config;
use crate::credentials::VerifyContext;
use crate::crypto::prf::{self, CipherPair};
use crate::crypto::record_cipher::RecordCipher;
use crate::crypto::{CryptoProvider, Secret, TlsCertificate};
use crate::message::{Certificate, Extensions, HandshakeMessage, MaxFragmentLength};
use crate::message::{HeartbeatMode, SupplementalDataEntry};
use crate::session::{Session, SessionParameters};
use crate::transcript::DeferredHash;
use crate::types::{
    CipherSuite, MessageType, PrfAlgorithm, ProtocolVersion, Random, DOWNGRADE_TLS11,
    DOWNGRADE_TLS12,
};
use crate::Error;

pub(crate) mod client;
pub(crate) mod server;
pub(crate) mod tls13;

/// Position of a handshake, named after the last message sent or received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Start,
    ClientHello,
    ServerHelloRetryRequest,
    ClientHelloRetry,
    ServerHello,
    ServerEncryptedExtensions,
    ServerSupplementalData,
    ServerCertificate,
    ServerCertificateStatus,
    ServerCertificateVerify,
    ServerKeyExchange,
    ServerCertificateRequest,
    ServerHelloDone,
    ClientSupplementalData,
    ClientCertificate,
    ClientKeyExchange,
    ClientCertificateVerify,
    ClientFinished,
    ServerFinished,
    End,
}

impl ConnectionState {
    pub const ALL: &'static [ConnectionState] = &[
        ConnectionState::Start,
        ConnectionState::ClientHello,
        ConnectionState::ServerHelloRetryRequest,
        ConnectionState::ClientHelloRetry,
        ConnectionState::ServerHello,
        ConnectionState::ServerEncryptedExtensions,
        ConnectionState::ServerSupplementalData,
        ConnectionState::ServerCertificate,
        ConnectionState::ServerCertificateStatus,
        ConnectionState::ServerCertificateVerify,
        ConnectionState::ServerKeyExchange,
        ConnectionState::ServerCertificateRequest,
        ConnectionState::ServerHelloDone,
        ConnectionState::ClientSupplementalData,
        ConnectionState::ClientCertificate,
        ConnectionState::ClientKeyExchange,
        ConnectionState::ClientCertificateVerify,
        ConnectionState::ClientFinished,
        ConnectionState::ServerFinished,
        ConnectionState::End,
    ];
}

/// What a handshake machine may ask of its transport.
pub(crate) trait HandshakeIo {
    fn is_datagram(&self) -> bool;

    /// Queue a handshake message. Datagram transports assign
    /// `message_seq`, so the transcript form is taken after this call.
    fn send_message(&mut self, message: &mut HandshakeMessage) -> Result<(), Error>;

    fn send_change_cipher_spec(&mut self) -> Result<(), Error>;

    fn set_pending_cipher(&mut self, ciphers: CipherPair);

    fn enable_pending_write(&mut self) -> Result<(), Error>;

    /// A ChangeCipherSpec was accepted: read with the pending cipher.
    fn enable_pending_read(&mut self) -> Result<(), Error>;

    fn install_tls13_read(&mut self, cipher: Box<dyn RecordCipher>) -> Result<(), Error>;

    fn install_tls13_write(&mut self, cipher: Box<dyn RecordCipher>) -> Result<(), Error>;

    /// Version of records sent and expected from now on.
    fn set_record_version(&mut self, version: ProtocolVersion);

    fn set_plaintext_limit(&mut self, limit: usize);

    /// The messages sent since the last call form one flight.
    fn end_flight(&mut self) -> Result<(), Error>;

    fn handshake_complete(&mut self);
}

/// The operations a protocol wrapper drives, implemented by both roles.
pub(crate) trait Handshake {
    /// Send whatever opens the handshake. Only the client has anything to
    /// send.
    fn start(&mut self, _io: &mut dyn HandshakeIo) -> Result<(), Error> {
        Ok(())
    }

    /// Process one complete handshake message.
    fn handle_message(
        &mut self,
        io: &mut dyn HandshakeIo,
        message: &HandshakeMessage,
    ) -> Result<(), Error>;

    fn handle_change_cipher_spec(&mut self, io: &mut dyn HandshakeIo) -> Result<(), Error>;

    /// Whether a ChangeCipherSpec is acceptable in the current state.
    fn expects_change_cipher_spec(&self) -> bool;

    fn state(&self) -> ConnectionState;

    fn is_complete(&self) -> bool {
        self.state() == ConnectionState::End
    }

    fn negotiated(&self) -> &Negotiated;

    /// The session established or resumed by this handshake.
    fn session(&self) -> Option<Arc<Session>>;

    /// Drop all secrets and invalidate the session in progress.
    fn abort(&mut self);
}

/// Parameters agreed by a handshake, readable once it completes.
#[derive(Debug, Clone, Default)]
pub struct Negotiated {
    pub version: Option<ProtocolVersion>,
    pub cipher_suite: Option<CipherSuite>,
    pub resumed: bool,
    pub extended_master_secret: bool,
    /// The peer's chain. Empty when the peer did not authenticate.
    pub peer_certificate: Option<Certificate>,
    /// Host name from `server_name`.
    pub server_name: Option<String>,
    /// Stapled OCSP response for the server's end entity certificate.
    pub ocsp_response: Option<Vec<u8>>,
    pub heartbeat: Option<HeartbeatMode>,
    pub max_fragment_length: Option<MaxFragmentLength>,
    /// SupplementalData entries received from the peer.
    pub supplemental_data: Vec<SupplementalDataEntry>,
    pub psk_identity: Option<Vec<u8>>,
    pub srp_identity: Option<Vec<u8>>,
}

pub(crate) fn unexpected_message(msg_type: MessageType, state: ConnectionState) -> Error {
    Error::UnexpectedMessage(format!("{:?} in state {:?}", msg_type, state))
}

/// Resumable parameters of a completed TLS 1.0 to 1.2 handshake.
pub(crate) fn session_parameters(
    negotiated: &Negotiated,
    master_secret: &[u8],
    local_certificate: Option<Certificate>,
    server_extensions: Extensions,
) -> Result<SessionParameters, Error> {
    let (Some(version), Some(suite)) = (negotiated.version, negotiated.cipher_suite) else {
        return Err(Error::InternalError("session before negotiation".into()));
    };
    SessionParameters::builder()
        .cipher_suite(suite)
        .version(version)
        .extended_master_secret(negotiated.extended_master_secret)
        .master_secret(master_secret)
        .peer_certificate(negotiated.peer_certificate.clone())
        .local_certificate(local_certificate)
        .psk_identity(negotiated.psk_identity.clone())
        .srp_identity(negotiated.srp_identity.clone())
        .server_extensions(server_extensions)
        .build()
}

/// Frame `body`, hand it to the transport and add it to the transcript.
pub(crate) fn send_handshake_message(
    io: &mut dyn HandshakeIo,
    transcript: &mut DeferredHash,
    msg_type: MessageType,
    body: Vec<u8>,
) -> Result<(), Error> {
    let mut message = HandshakeMessage::new(msg_type, body)?;
    io.send_message(&mut message)?;
    transcript.update(&message.encoding(io.is_datagram()));
    trace!("Sent {:?} ({} bytes)", msg_type, message.body.len());
    Ok(())
}

/// Add a received message to the transcript.
pub(crate) fn update_transcript(
    io: &dyn HandshakeIo,
    transcript: &mut DeferredHash,
    message: &HandshakeMessage,
) {
    transcript.update(&message.encoding(io.is_datagram()));
}

/// Client side check of the suite in ServerHello.
pub(crate) fn validate_selected_cipher_suite(
    offered: &[CipherSuite],
    selected: CipherSuite,
    version: ProtocolVersion,
) -> Result<(), Error> {
    if selected.is_scsv() || !offered.contains(&selected) {
        return Err(Error::IllegalParameter(format!(
            "server selected {:?}, which was not offered",
            selected
        )));
    }
    if !selected.is_valid_for_version(version) {
        return Err(Error::IllegalParameter(format!(
            "server selected {:?} for {:?}",
            selected, version
        )));
    }
    Ok(())
}

/// Lower the record plaintext limit after `max_fragment_length` was agreed.
pub(crate) fn apply_max_fragment_length(
    io: &mut dyn HandshakeIo,
    value: Option<MaxFragmentLength>,
) {
    if let Some(value) = value {
        debug!("Plaintext limit {}", value.plaintext_limit());
        io.set_plaintext_limit(value.plaintext_limit());
    }
}

pub(crate) fn send_certificate_message(
    io: &mut dyn HandshakeIo,
    transcript: &mut DeferredHash,
    certificate: &Certificate,
) -> Result<(), Error> {
    let mut body = Vec::new();
    certificate.serialize(&mut body)?;
    send_handshake_message(io, transcript, MessageType::Certificate, body)
}

/// Decode a peer Certificate message.
///
/// An empty chain is returned as is; whether that is acceptable depends on
/// the role.
pub(crate) fn receive_certificate_message(
    config: &Config,
    body: &[u8],
    tls13: bool,
) -> Result<Certificate, Error> {
    Certificate::decode(body, tls13, config.max_certificate_chain_length())
}

/// Run the configured verifier over a non-empty peer chain and parse its
/// end entity certificate.
pub(crate) fn verify_peer_certificate(
    config: &Config,
    certificate: &Certificate,
    context: &VerifyContext<'_>,
) -> Result<Arc<dyn TlsCertificate>, Error> {
    let end_entity = certificate
        .end_entity()
        .ok_or_else(|| Error::BadCertificate("empty certificate chain".into()))?;
    if let Some(verifier) = config.certificate_verifier() {
        verifier.verify(&certificate.chain(), context)?;
    }
    debug!(
        "Peer certificate chain of {} accepted (is_server={})",
        certificate.len(),
        context.is_server
    );
    config
        .crypto_provider()
        .certificate_parser
        .parse(end_entity)
        .map_err(Error::BadCertificate)
}

/// The master secret from a premaster secret.
///
/// `session_hash` is the transcript hash through ClientKeyExchange when
/// extended master secret was negotiated.
pub(crate) fn establish_master_secret(
    provider: &CryptoProvider,
    prf_algorithm: PrfAlgorithm,
    pre_master_secret: &[u8],
    client_random: &Random,
    server_random: &Random,
    session_hash: Option<&[u8]>,
) -> Result<Secret, Error> {
    match session_hash {
        Some(hash) => {
            prf::extended_master_secret(provider, prf_algorithm, pre_master_secret, hash)
        }
        None => prf::master_secret(
            provider,
            prf_algorithm,
            pre_master_secret,
            client_random.as_bytes(),
            server_random.as_bytes(),
        ),
    }
}

/// Finished verify data before TLS 1.3, over the transcript so far.
pub(crate) fn calculate_verify_data(
    provider: &CryptoProvider,
    transcript: &DeferredHash,
    master_secret: &[u8],
    is_client: bool,
) -> Result<Vec<u8>, Error> {
    let prf_algorithm = transcript
        .prf()
        .ok_or_else(|| Error::InternalError("PRF not determined".into()))?;
    let hash = transcript.current_prf_hash()?;
    prf::verify_data(provider, prf_algorithm, master_secret, is_client, &hash)
}

/// Constant time comparison of received Finished data.
pub(crate) fn check_verify_data(expected: &[u8], received: &[u8]) -> Result<(), Error> {
    if expected.len() != received.len() || !bool::from(expected.ct_eq(received)) {
        return Err(Error::DecryptError("Finished verify data mismatch".into()));
    }
    Ok(())
}

/// The sentinel a server writes when it negotiates below its maximum.
fn downgrade_sentinel(
    negotiated: ProtocolVersion,
    max: ProtocolVersion,
) -> Option<&'static [u8; 8]> {
    if !negotiated.is_earlier_than(max) {
        return None;
    }
    let negotiated = negotiated.equivalent_tls();
    if negotiated == ProtocolVersion::TLSV1_2 {
        Some(&DOWNGRADE_TLS12)
    } else if negotiated.is_earlier_than(ProtocolVersion::TLSV1_2) {
        Some(&DOWNGRADE_TLS11)
    } else {
        None
    }
}

/// Server: mark the random when negotiating below the local maximum.
pub(crate) fn write_downgrade_sentinel(
    random: &mut Random,
    negotiated: ProtocolVersion,
    server_max: ProtocolVersion,
) {
    if let Some(sentinel) = downgrade_sentinel(negotiated, server_max) {
        trace!("Downgrade sentinel for {:?}", negotiated);
        random.set_downgrade_sentinel(sentinel);
    }
}

/// Client: a sentinel matching a version below our maximum means an
/// attacker removed the higher versions from the hello.
pub(crate) fn check_downgrade_sentinel(
    random: &Random,
    negotiated: ProtocolVersion,
    client_max: ProtocolVersion,
) -> Result<(), Error> {
    let Some(expected) = downgrade_sentinel(negotiated, client_max) else {
        return Ok(());
    };
    if random.downgrade_sentinel() == Some(expected) {
        return Err(Error::IllegalParameter(format!(
            "downgrade to {:?} detected",
            negotiated
        )));
    }
    Ok(())
}

/// Initial handshake `renegotiation_info`: empty `renegotiated_connection`.
pub(crate) fn check_renegotiation_info(extensions: &Extensions) -> Result<bool, Error> {
    match extensions.renegotiation_info() {
        None => Ok(false),
        Some([0x00]) => Ok(true),
        Some(_) => Err(Error::HandshakeFailure(
            "renegotiation_info is not empty".into(),
        )),
    }
}

/// Extensions only a server may answer with, given what the client sent.
pub(crate) fn check_server_extensions(
    offered: &Extensions,
    received: &Extensions,
    allowed_unsolicited: &[crate::types::ExtensionType],
) -> Result<(), Error> {
    received.check_duplicates()?;
    for (extension_type, _) in received.iter() {
        if !offered.contains(extension_type) && !allowed_unsolicited.contains(&extension_type) {
            return Err(Error::UnsupportedExtension(format!(
                "unsolicited {:?}",
                extension_type
            )));
        }
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExtensionType;

    #[test]
    fn selected_suite_checks() {
        let offered = [
            CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
            CipherSuite::EMPTY_RENEGOTIATION_INFO_SCSV,
            CipherSuite::RSA_AES128_CBC_SHA,
        ];
        assert!(validate_selected_cipher_suite(
            &offered,
            CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
            ProtocolVersion::TLSV1_2
        )
        .is_ok());
        assert!(matches!(
            validate_selected_cipher_suite(
                &offered,
                CipherSuite::EMPTY_RENEGOTIATION_INFO_SCSV,
                ProtocolVersion::TLSV1_2
            ),
            Err(Error::IllegalParameter(_))
        ));
        assert!(matches!(
            validate_selected_cipher_suite(
                &offered,
                CipherSuite::PSK_AES128_GCM_SHA256,
                ProtocolVersion::TLSV1_2
            ),
            Err(Error::IllegalParameter(_))
        ));
        // GCM needs TLS 1.2.
        assert!(matches!(
            validate_selected_cipher_suite(
                &offered,
                CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
                ProtocolVersion::TLSV1_1
            ),
            Err(Error::IllegalParameter(_))
        ));
    }

    #[test]
    fn downgrade_sentinels() {
        let mut random = Random::from_bytes([7; 32]);
        write_downgrade_sentinel(&mut random, ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_3);
        assert_eq!(random.downgrade_sentinel(), Some(&DOWNGRADE_TLS12));

        assert!(matches!(
            check_downgrade_sentinel(&random, ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_3),
            Err(Error::IllegalParameter(_))
        ));
        // A 1.2 only client cannot tell.
        assert!(
            check_downgrade_sentinel(&random, ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
                .is_ok()
        );

        let mut random = Random::from_bytes([7; 32]);
        write_downgrade_sentinel(&mut random, ProtocolVersion::TLSV1_1, ProtocolVersion::TLSV1_2);
        assert_eq!(random.downgrade_sentinel(), Some(&DOWNGRADE_TLS11));

        let mut random = Random::from_bytes([7; 32]);
        write_downgrade_sentinel(&mut random, ProtocolVersion::TLSV1_3, ProtocolVersion::TLSV1_3);
        assert_eq!(random.downgrade_sentinel(), None);

        let mut random = Random::from_bytes([7; 32]);
        write_downgrade_sentinel(&mut random, ProtocolVersion::DTLSV1_0, ProtocolVersion::DTLSV1_2);
        assert_eq!(random.downgrade_sentinel(), Some(&DOWNGRADE_TLS11));
    }

    #[test]
    fn verify_data_comparison() {
        assert!(check_verify_data(&[1, 2, 3], &[1, 2, 3]).is_ok());
        assert!(matches!(
            check_verify_data(&[1, 2, 3], &[1, 2, 4]),
            Err(Error::DecryptError(_))
        ));
        assert!(check_verify_data(&[1, 2, 3], &[1, 2]).is_err());
    }

    #[test]
    fn renegotiation_info_must_be_empty() {
        let mut extensions = Extensions::new();
        assert!(!check_renegotiation_info(&extensions).unwrap());
        extensions.add_renegotiation_info();
        assert!(check_renegotiation_info(&extensions).unwrap());

        let mut extensions = Extensions::new();
        extensions.insert(ExtensionType::RenegotiationInfo, vec![0x01, 0xAA]);
        assert!(matches!(
            check_renegotiation_info(&extensions),
            Err(Error::HandshakeFailure(_))
        ));
    }

    #[test]
    fn unsolicited_server_extensions() {
        let mut offered = Extensions::new();
        offered.add_extended_master_secret();
        let mut received = Extensions::new();
        received.add_extended_master_secret();
        assert!(check_server_extensions(&offered, &received, &[]).is_ok());

        received.add_heartbeat(HeartbeatMode::PeerAllowedToSend);
        assert!(matches!(
            check_server_extensions(&offered, &received, &[]),
            Err(Error::UnsupportedExtension(_))
        ));
    }
}
