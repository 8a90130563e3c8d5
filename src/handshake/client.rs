//! Client handshake state machine.

use std::sync::Arc;

use super::tls13::{self, Tls13Keys};
use super::{
    apply_max_fragment_length, calculate_verify_data, check_downgrade_sentinel,
    check_renegotiation_info, check_server_extensions, check_verify_data,
    establish_master_secret, receive_certificate_message, send_certificate_message,
    send_handshake_message, session_parameters, unexpected_message, update_transcript,
    validate_selected_cipher_suite, verify_peer_certificate, ConnectionState, Handshake,
    HandshakeIo, Negotiated,
};
use crate::codec::decode_all;
use crate::config::Config;
use crate::credentials::{Credentials, VerifyContext};
use crate::crypto::prf::create_cipher_pair;
use crate::crypto::{ActiveKeyExchange, Secret, TlsCertificate};
use crate::key_exchange::{
    select_signature_scheme, verify_signature, KeyExchange, KeyExchangeContext,
};
use crate::message::{
    Certificate, CertificateRequest, CertificateRequestTls13, CertificateStatus,
    CertificateStatusRequest, CertificateStatusRequestItemV2, CertificateStatusType,
    ClientHello, DigitallySigned, Extensions, HandshakeMessage, HelloVerifyRequest,
    KeyShareEntry, OcspStatusRequest, ServerHello, ServerName, SupplementalDataEntry,
    COMPRESSION_NULL,
};
use crate::session::Session;
use crate::transcript::DeferredHash;
use crate::types::{
    CipherSuite, Cookie, ExtensionType, KeyExchangeAlgorithm, MessageType, NamedGroup,
    ProtocolVersion, Random, SessionId, SignatureScheme,
};
use crate::Error;

use ConnectionState as S;

/// A certificate request from the server.
enum ClientAuthRequest {
    Legacy(CertificateRequest),
    Tls13 {
        context: Vec<u8>,
        schemes: Vec<SignatureScheme>,
    },
}

/// States after which `msg_type` may arrive at a client.
pub(crate) fn expected_predecessors(
    msg_type: MessageType,
    tls13: bool,
    resumed: bool,
    datagram: bool,
) -> &'static [ConnectionState] {
    match msg_type {
        MessageType::HelloVerifyRequest if datagram => &[S::ClientHello],
        MessageType::ServerHello => &[S::ClientHello, S::ClientHelloRetry],
        MessageType::EncryptedExtensions if tls13 => &[S::ServerHello],
        MessageType::CertificateRequest if tls13 => &[S::ServerEncryptedExtensions],
        MessageType::CertificateRequest => &[
            S::ServerCertificate,
            S::ServerCertificateStatus,
            S::ServerKeyExchange,
        ],
        MessageType::Certificate if tls13 => {
            &[S::ServerEncryptedExtensions, S::ServerCertificateRequest]
        }
        MessageType::Certificate if !resumed => &[S::ServerHello, S::ServerSupplementalData],
        MessageType::CertificateStatus if !tls13 && !resumed => &[S::ServerCertificate],
        MessageType::CertificateVerify if tls13 => &[S::ServerCertificate],
        MessageType::ServerKeyExchange if !tls13 && !resumed => &[
            S::ServerHello,
            S::ServerSupplementalData,
            S::ServerCertificate,
            S::ServerCertificateStatus,
        ],
        MessageType::ServerHelloDone if !tls13 && !resumed => &[
            S::ServerHello,
            S::ServerSupplementalData,
            S::ServerCertificate,
            S::ServerCertificateStatus,
            S::ServerKeyExchange,
            S::ServerCertificateRequest,
        ],
        MessageType::SupplementalData if !tls13 && !resumed => &[S::ServerHello],
        MessageType::Finished if tls13 => &[S::ServerCertificateVerify],
        MessageType::Finished if resumed => &[S::ServerHello],
        MessageType::Finished => &[S::ClientFinished],
        _ => &[],
    }
}

pub(crate) struct ClientHandshake {
    config: Arc<Config>,
    datagram: bool,
    state: ConnectionState,
    transcript: DeferredHash,
    /// The last ClientHello sent.
    hello: Option<ClientHello>,
    server_random: Option<Random>,
    /// Session offered for resumption.
    offered_session: Option<Arc<Session>>,
    /// Session established or resumed.
    session: Option<Arc<Session>>,
    server_session_id: SessionId,
    server_extensions: Extensions,
    ccs_received: bool,
    server_key_exchange_received: bool,
    key_exchange: Option<KeyExchange>,
    key_shares: Vec<Box<dyn ActiveKeyExchange>>,
    tls13: Option<Tls13Keys>,
    master_secret: Option<Secret>,
    server_certificate: Option<Arc<dyn TlsCertificate>>,
    /// Server chain waiting for a possible CertificateStatus before it is
    /// verified.
    pending_verification: Option<Certificate>,
    status_types: Vec<CertificateStatusType>,
    request: Option<ClientAuthRequest>,
    sent_certificate: Option<Certificate>,
    negotiated: Negotiated,
}

impl ClientHandshake {
    /// `session` is offered for resumption when it is still resumable.
    pub fn new(config: Arc<Config>, datagram: bool, session: Option<Arc<Session>>) -> Self {
        let transcript = DeferredHash::new(config.crypto_provider().hash_provider);
        ClientHandshake {
            config,
            datagram,
            state: S::Start,
            transcript,
            hello: None,
            server_random: None,
            offered_session: session.filter(|s| s.is_resumable()),
            session: None,
            server_session_id: SessionId::empty(),
            server_extensions: Extensions::new(),
            ccs_received: false,
            server_key_exchange_received: false,
            key_exchange: None,
            key_shares: Vec::new(),
            tls13: None,
            master_secret: None,
            server_certificate: None,
            pending_verification: None,
            status_types: Vec::new(),
            request: None,
            sent_certificate: None,
            negotiated: Negotiated::default(),
        }
    }

    fn version(&self) -> Option<ProtocolVersion> {
        self.negotiated.version
    }

    fn is_tls13(&self) -> bool {
        self.version().map(|v| v.is_tls13()).unwrap_or(false)
    }

    fn hello(&self) -> Result<&ClientHello, Error> {
        self.hello
            .as_ref()
            .ok_or_else(|| Error::InternalError("no ClientHello sent".into()))
    }

    fn negotiated_version(&self) -> Result<ProtocolVersion, Error> {
        self.version()
            .ok_or_else(|| Error::InternalError("version not negotiated".into()))
    }

    fn negotiated_suite(&self) -> Result<CipherSuite, Error> {
        self.negotiated
            .cipher_suite
            .ok_or_else(|| Error::InternalError("cipher suite not negotiated".into()))
    }

    fn tls13_keys(&self) -> Result<&Tls13Keys, Error> {
        self.tls13
            .as_ref()
            .ok_or_else(|| Error::InternalError("TLS 1.3 keys not derived".into()))
    }

    fn master_secret(&self) -> Result<&Secret, Error> {
        self.master_secret
            .as_ref()
            .ok_or_else(|| Error::InternalError("master secret not established".into()))
    }

    fn offers_tls13(&self) -> bool {
        let (_, max) = self.config.version_bounds(self.datagram);
        !self.datagram && max.is_tls13()
    }

    /// Suites to offer: usable ones in preference order, then the SCSVs.
    fn offered_suites(&self) -> Result<Vec<CipherSuite>, Error> {
        let (min, max) = self.config.version_bounds(self.datagram);
        let versions = ProtocolVersion::range_descending(min, max);
        let provider = self.config.crypto_provider();
        let mut suites: Vec<CipherSuite> = self
            .config
            .cipher_suites()
            .iter()
            .copied()
            .filter(|s| {
                self.config.has_credentials_for(*s, true)
                    && provider.find_cipher_suite(*s).is_some()
                    && versions.iter().any(|v| s.is_valid_for_version(*v))
            })
            .collect();
        if suites.is_empty() {
            return Err(Error::HandshakeFailure("no cipher suite to offer".into()));
        }
        if min.is_earlier_than(ProtocolVersion::TLSV1_3) {
            suites.push(CipherSuite::EMPTY_RENEGOTIATION_INFO_SCSV);
        }
        if self.config.fallback() {
            suites.push(CipherSuite::FALLBACK_SCSV);
        }
        Ok(suites)
    }

    fn supported_groups(&self) -> Vec<NamedGroup> {
        let provider = self.config.crypto_provider();
        self.config
            .groups()
            .iter()
            .copied()
            .filter(|g| provider.supports_group(*g))
            .collect()
    }

    fn start_key_share(&mut self, group: NamedGroup) -> Result<KeyShareEntry, Error> {
        let kx_group = self
            .config
            .crypto_provider()
            .find_kx_group(group)
            .ok_or_else(|| Error::InternalError(format!("{:?} not supported", group)))?;
        let active = kx_group.start_exchange().map_err(Error::CryptoError)?;
        let entry = KeyShareEntry::new(group, active.pub_key().to_vec());
        self.key_shares.push(active);
        Ok(entry)
    }

    fn client_extensions(
        &mut self,
        suites: &[CipherSuite],
        key_share_group: Option<NamedGroup>,
        cookie: Option<&[u8]>,
    ) -> Result<Extensions, Error> {
        let config = self.config.clone();
        let (min, max) = config.version_bounds(self.datagram);
        let mut extensions = Extensions::new();

        if let Some(name) = config.server_name() {
            extensions.add_server_name(&[ServerName::host_name(name)])?;
        }
        let groups = self.supported_groups();
        if !groups.is_empty() {
            extensions.add_supported_groups(&groups)?;
        }
        if suites.iter().any(|s| {
            matches!(
                s.key_exchange(),
                Some(KeyExchangeAlgorithm::EcdheEcdsa | KeyExchangeAlgorithm::EcdheRsa)
            )
        }) {
            extensions.add_ec_point_formats();
        }
        if max.has_signature_algorithms() {
            extensions.add_signature_algorithms(config.signature_schemes())?;
        }
        if self.offers_tls13() {
            extensions.add_supported_versions_client(&config.versions(false))?;
            if let Some(group) = key_share_group {
                let entry = self.start_key_share(group)?;
                extensions.add_key_share_client(&[entry])?;
            } else {
                extensions.add_key_share_client(&[])?;
            }
        }
        if config.use_extended_master_secret() && min.is_earlier_than(ProtocolVersion::TLSV1_3) {
            extensions.add_extended_master_secret();
        }
        if let Some(value) = config.max_fragment_length() {
            extensions.add_max_fragment_length(value);
        }
        if config.status_request() {
            extensions.add_status_request(&CertificateStatusRequest::ocsp())?;
        }
        if config.status_request_v2() {
            extensions.add_status_request_v2(&[
                CertificateStatusRequestItemV2::OcspMulti(OcspStatusRequest::default()),
                CertificateStatusRequestItemV2::Ocsp(OcspStatusRequest::default()),
            ])?;
        }
        if !config.trusted_ca_keys().is_empty() {
            extensions.add_trusted_ca_keys(config.trusted_ca_keys())?;
        }
        if let Some(mode) = config.heartbeat() {
            extensions.add_heartbeat(mode);
        }
        if let Some(srp) = config.srp() {
            if suites
                .iter()
                .any(|s| s.key_exchange() == Some(KeyExchangeAlgorithm::SrpSha))
            {
                extensions.add_srp_identity(&srp.identity)?;
            }
        }
        if let Some(cookie) = cookie {
            extensions.add_cookie(cookie)?;
        }
        Ok(extensions)
    }

    fn send_client_hello(&mut self, io: &mut dyn HandshakeIo) -> Result<(), Error> {
        let hello = self.hello()?;
        let mut body = Vec::new();
        hello.serialize(&mut body)?;
        send_handshake_message(io, &mut self.transcript, MessageType::ClientHello, body)?;
        io.end_flight()
    }

    fn kx_context(&self) -> Result<KeyExchangeContext<'_>, Error> {
        let hello = self.hello()?;
        let server_random = self
            .server_random
            .as_ref()
            .ok_or_else(|| Error::InternalError("no server random".into()))?;
        Ok(KeyExchangeContext {
            config: &self.config,
            version: self.negotiated_version()?,
            client_version: hello.client_version,
            client_random: hello.random.as_bytes(),
            server_random: server_random.as_bytes(),
            credentials: self.config.credentials(),
            peer_schemes: None,
            client_groups: None,
            srp_identity: None,
        })
    }

    fn with_key_exchange<T>(
        &mut self,
        f: impl FnOnce(&mut KeyExchange, &KeyExchangeContext<'_>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut kx = self
            .key_exchange
            .take()
            .ok_or_else(|| Error::InternalError("no key exchange".into()))?;
        let result = match self.kx_context() {
            Ok(ctx) => f(&mut kx, &ctx),
            Err(e) => Err(e),
        };
        self.key_exchange = Some(kx);
        result
    }

    // ------------------------------------------------------------------
    // Hello phase
    // ------------------------------------------------------------------

    fn handle_hello_verify_request(
        &mut self,
        io: &mut dyn HandshakeIo,
        message: &HandshakeMessage,
    ) -> Result<(), Error> {
        let request = HelloVerifyRequest::decode(&message.body)?;
        if request.cookie.is_empty() {
            return Err(Error::IllegalParameter("empty HelloVerifyRequest cookie".into()));
        }
        debug!("HelloVerifyRequest with cookie of {}", request.cookie.len());
        // Neither the first ClientHello nor the request are hashed.
        self.transcript.reset();
        let hello = self
            .hello
            .as_mut()
            .ok_or_else(|| Error::InternalError("no ClientHello sent".into()))?;
        hello.cookie = Some(request.cookie);
        self.send_client_hello(io)
    }

    fn handle_server_hello(
        &mut self,
        io: &mut dyn HandshakeIo,
        message: &HandshakeMessage,
    ) -> Result<(), Error> {
        let hello = ServerHello::decode(&message.body)?;
        if tls13::is_hello_retry_request(&hello) {
            return self.handle_hello_retry_request(io, message, hello);
        }

        let (min, max) = self.config.version_bounds(self.datagram);
        let offered = self.hello()?;
        let version = match hello.extensions.supported_versions_server()? {
            Some(v) => {
                if !self.offers_tls13() || v != ProtocolVersion::TLSV1_3 {
                    return Err(Error::IllegalParameter(format!(
                        "supported_versions selected {:?}",
                        v
                    )));
                }
                v
            }
            None => hello.server_version,
        };
        let legacy_tls13 =
            version.is_tls13() && hello.extensions.supported_versions_server()?.is_none();
        if version.is_dtls() != self.datagram
            || version.is_earlier_than(min)
            || max.is_earlier_than(version)
            || legacy_tls13
        {
            return Err(Error::IllegalParameter(format!(
                "server selected {:?} outside {:?}..={:?}",
                version, min, max
            )));
        }
        if self.state == S::ClientHelloRetry && !version.is_tls13() {
            return Err(Error::IllegalParameter(
                "ServerHello below TLS 1.3 after HelloRetryRequest".into(),
            ));
        }
        check_downgrade_sentinel(&hello.random, version, max)?;
        validate_selected_cipher_suite(&offered.cipher_suites, hello.cipher_suite, version)?;
        if hello.compression_method != COMPRESSION_NULL {
            return Err(Error::IllegalParameter("non null compression".into()));
        }
        check_server_extensions(
            &offered.extensions,
            &hello.extensions,
            &[ExtensionType::RenegotiationInfo],
        )?;

        debug!("Negotiated {:?} with {:?}", version, hello.cipher_suite);
        self.negotiated.version = Some(version);
        self.negotiated.cipher_suite = Some(hello.cipher_suite);
        self.server_random = Some(hello.random);
        io.set_record_version(version);

        let prf = hello.cipher_suite.prf_algorithm(version);
        if self.transcript.prf().is_none() {
            self.transcript.notify_prf_determined(prf)?;
        }
        if version.has_signature_algorithms() {
            self.transcript
                .track_hash_algorithm(hello.cipher_suite.hash_algorithm())?;
        }

        if version.is_tls13() {
            self.transcript.seal_hash_algorithms();
            update_transcript(io, &mut self.transcript, message);
            self.server_hello_tls13(io, hello)
        } else {
            let kx = hello
                .cipher_suite
                .key_exchange()
                .ok_or_else(|| Error::InternalError("suite without key exchange".into()))?;
            if self.config.credentials().is_some() && kx.allows_client_certificate() {
                self.transcript.force_buffering()?;
            }
            self.transcript.seal_hash_algorithms();
            update_transcript(io, &mut self.transcript, message);
            self.server_hello_legacy(io, hello)
        }
    }

    fn handle_hello_retry_request(
        &mut self,
        io: &mut dyn HandshakeIo,
        message: &HandshakeMessage,
        retry: ServerHello,
    ) -> Result<(), Error> {
        if self.state != S::ClientHello || !self.offers_tls13() {
            return Err(Error::UnexpectedMessage(
                "HelloRetryRequest after HelloRetryRequest".into(),
            ));
        }
        let offered = self.hello()?;
        let suites = offered.cipher_suites.clone();
        if retry.extensions.supported_versions_server()? != Some(ProtocolVersion::TLSV1_3) {
            return Err(Error::IllegalParameter(
                "HelloRetryRequest without TLS 1.3".into(),
            ));
        }
        validate_selected_cipher_suite(
            &suites,
            retry.cipher_suite,
            ProtocolVersion::TLSV1_3,
        )?;
        check_server_extensions(&offered.extensions, &retry.extensions, &[ExtensionType::Cookie])?;
        let group = retry.extensions.key_share_hello_retry()?;
        let cookie = retry.extensions.cookie()?;
        if group.is_none() && cookie.is_none() {
            return Err(Error::IllegalParameter(
                "HelloRetryRequest would not change the ClientHello".into(),
            ));
        }
        let group = match group {
            Some(g) => {
                let sent = self.key_shares.iter().any(|k| k.group() == g);
                if sent || !self.supported_groups().contains(&g) {
                    return Err(Error::IllegalParameter(format!(
                        "HelloRetryRequest for group {:?}",
                        g
                    )));
                }
                Some(g)
            }
            None => self.key_shares.first().map(|k| k.group()),
        };
        debug!("HelloRetryRequest for {:?}", group);
        io.set_record_version(ProtocolVersion::TLSV1_3);

        tls13::restart_transcript_for_retry(&mut self.transcript, retry.cipher_suite)?;
        update_transcript(io, &mut self.transcript, message);

        self.key_shares.clear();
        let extensions = self.client_extensions(&suites, group, cookie.as_deref())?;
        let hello = self
            .hello
            .as_mut()
            .ok_or_else(|| Error::InternalError("no ClientHello sent".into()))?;
        hello.extensions = extensions;
        self.state = S::ClientHelloRetry;
        self.send_client_hello(io)
    }

    fn server_hello_tls13(
        &mut self,
        io: &mut dyn HandshakeIo,
        hello: ServerHello,
    ) -> Result<(), Error> {
        if hello.session_id != self.hello()?.session_id {
            return Err(Error::IllegalParameter("legacy_session_id not echoed".into()));
        }
        let share = hello
            .extensions
            .key_share_server()?
            .ok_or_else(|| Error::Fatal(
                crate::alert::AlertDescription::MissingExtension,
                "ServerHello without key_share".into(),
            ))?;
        let index = self
            .key_shares
            .iter()
            .position(|k| k.group() == share.group)
            .ok_or_else(|| {
                Error::IllegalParameter(format!("key share for unoffered {:?}", share.group))
            })?;
        let active = self.key_shares.swap_remove(index);
        self.key_shares.clear();
        let shared = active
            .complete(&share.key_exchange)
            .map_err(Error::IllegalParameter)?;

        let mut keys = Tls13Keys::new(self.config.crypto_provider(), hello.cipher_suite)?;
        keys.derive_handshake_secrets(&shared, &self.transcript)?;
        io.install_tls13_read(keys.handshake_cipher(false)?)?;
        io.install_tls13_write(keys.handshake_cipher(true)?)?;
        self.tls13 = Some(keys);
        self.server_extensions = hello.extensions;
        self.state = S::ServerHello;
        Ok(())
    }

    fn server_hello_legacy(
        &mut self,
        io: &mut dyn HandshakeIo,
        hello: ServerHello,
    ) -> Result<(), Error> {
        let version = hello.server_version;
        let extensions = &hello.extensions;
        check_renegotiation_info(extensions)?;

        let ems = extensions.extended_master_secret()?;
        if !ems && self.config.require_extended_master_secret() {
            return Err(Error::HandshakeFailure(
                "server did not negotiate extended master secret".into(),
            ));
        }
        let max_fragment_length = extensions.max_fragment_length()?;
        if max_fragment_length.is_some() && max_fragment_length != self.config.max_fragment_length()
        {
            return Err(Error::IllegalParameter(
                "max_fragment_length differs from the offer".into(),
            ));
        }
        if extensions.has_empty(ExtensionType::StatusRequest)? {
            self.status_types = vec![CertificateStatusType::Ocsp];
        }
        if extensions.has_empty(ExtensionType::StatusRequestV2)? {
            self.status_types = vec![CertificateStatusType::Ocsp, CertificateStatusType::OcspMulti];
        }
        self.negotiated.heartbeat = extensions.heartbeat()?;
        self.negotiated.extended_master_secret = ems;
        self.negotiated.max_fragment_length = max_fragment_length;
        self.negotiated.server_name = self.config.server_name().map(str::to_string);

        let offered_id = self
            .offered_session
            .as_ref()
            .map(|s| s.id().clone())
            .unwrap_or_else(SessionId::empty);
        let resumed = !hello.session_id.is_empty() && hello.session_id == offered_id;
        self.server_session_id = hello.session_id.clone();
        self.server_extensions = hello.extensions.clone();

        if resumed {
            let session = self
                .offered_session
                .clone()
                .ok_or_else(|| Error::InternalError("resumed without session".into()))?;
            let parameters = session
                .parameters()
                .ok_or_else(|| Error::HandshakeFailure("offered session was invalidated".into()))?;
            if parameters.version() != version || parameters.cipher_suite() != hello.cipher_suite {
                return Err(Error::IllegalParameter(
                    "resumed session with different parameters".into(),
                ));
            }
            if parameters.extended_master_secret() != ems {
                return Err(Error::HandshakeFailure(
                    "extended master secret differs from the session".into(),
                ));
            }
            if max_fragment_length.is_some()
                && max_fragment_length != parameters.max_fragment_length()?
            {
                return Err(Error::IllegalParameter(
                    "max_fragment_length differs from the session".into(),
                ));
            }
            debug!("Resuming session");
            self.negotiated.resumed = true;
            self.negotiated.peer_certificate = parameters.peer_certificate().cloned();
            self.negotiated.psk_identity = parameters.psk_identity().map(<[u8]>::to_vec);
            self.negotiated.srp_identity = parameters.srp_identity().map(<[u8]>::to_vec);
            self.master_secret = Some(Secret::new(parameters.master_secret().to_vec()));
            self.session = Some(session);
            self.install_pending_cipher(io)?;
        } else {
            let kx = hello
                .cipher_suite
                .key_exchange()
                .ok_or_else(|| Error::InternalError("suite without key exchange".into()))?;
            self.key_exchange = Some(KeyExchange::for_algorithm(kx)?);
        }
        apply_max_fragment_length(io, max_fragment_length);
        self.state = S::ServerHello;
        Ok(())
    }

    fn install_pending_cipher(&mut self, io: &mut dyn HandshakeIo) -> Result<(), Error> {
        let version = self.negotiated_version()?;
        let suite = self.negotiated_suite()?;
        let prf = self
            .transcript
            .prf()
            .ok_or_else(|| Error::InternalError("PRF not determined".into()))?;
        let server_random = self
            .server_random
            .as_ref()
            .ok_or_else(|| Error::InternalError("no server random".into()))?;
        let pair = create_cipher_pair(
            self.config.crypto_provider(),
            suite,
            version,
            prf,
            self.master_secret()?,
            self.hello()?.random.as_bytes(),
            server_random.as_bytes(),
            true,
        )?;
        io.set_pending_cipher(pair);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Server flight before TLS 1.3
    // ------------------------------------------------------------------

    fn handle_supplemental_data(&mut self, message: &HandshakeMessage) -> Result<(), Error> {
        let entries = SupplementalDataEntry::decode_list(&message.body)?;
        debug!("Server supplemental data, {} entries", entries.len());
        self.negotiated.supplemental_data = entries;
        self.state = S::ServerSupplementalData;
        Ok(())
    }

    fn handle_certificate_legacy(&mut self, message: &HandshakeMessage) -> Result<(), Error> {
        let certificate = receive_certificate_message(&self.config, &message.body, false)?;
        if certificate.is_empty() {
            return Err(Error::BadCertificate("server sent an empty chain".into()));
        }
        self.pending_verification = Some(certificate);
        if self.status_types.is_empty() {
            self.finish_server_verification(None)?;
        }
        self.state = S::ServerCertificate;
        Ok(())
    }

    /// Verify the pending server chain, with the stapled response if one
    /// arrived.
    fn finish_server_verification(&mut self, ocsp: Option<&[u8]>) -> Result<(), Error> {
        let Some(certificate) = self.pending_verification.take() else {
            return Ok(());
        };
        let context = VerifyContext {
            server_name: self.config.server_name(),
            is_server: true,
            ocsp,
        };
        let parsed = verify_peer_certificate(&self.config, &certificate, &context)?;
        if let Some(kx) = self.key_exchange.as_mut() {
            kx.process_server_certificate(parsed.clone())?;
        }
        self.server_certificate = Some(parsed);
        self.negotiated.peer_certificate = Some(certificate);
        Ok(())
    }

    /// Suites authenticating the server must not skip its Certificate.
    fn require_server_certificate(&self) -> Result<(), Error> {
        let required = self
            .negotiated
            .cipher_suite
            .and_then(|s| s.key_exchange())
            .map(|k| k.requires_server_certificate())
            .unwrap_or(false);
        if required && self.server_certificate.is_none() {
            return Err(Error::UnexpectedMessage("server Certificate missing".into()));
        }
        Ok(())
    }

    fn handle_certificate_status(&mut self, message: &HandshakeMessage) -> Result<(), Error> {
        if self.status_types.is_empty() {
            return Err(Error::UnexpectedMessage(
                "CertificateStatus without status_request".into(),
            ));
        }
        let chain_length = self
            .pending_verification
            .as_ref()
            .map(|c| c.len())
            .unwrap_or(1);
        let status = CertificateStatus::decode(&message.body, &self.status_types, chain_length)?;
        let response = status.end_entity_response().map(<[u8]>::to_vec);
        debug!("Stapled OCSP response of {:?} bytes", response.as_ref().map(Vec::len));
        self.finish_server_verification(response.as_deref())?;
        self.negotiated.ocsp_response = response;
        self.state = S::ServerCertificateStatus;
        Ok(())
    }

    fn handle_server_key_exchange(&mut self, message: &HandshakeMessage) -> Result<(), Error> {
        self.finish_server_verification(None)?;
        self.require_server_certificate()?;
        self.with_key_exchange(|kx, ctx| kx.process_server_key_exchange(ctx, &message.body))?;
        self.server_key_exchange_received = true;
        self.state = S::ServerKeyExchange;
        Ok(())
    }

    fn handle_certificate_request_legacy(
        &mut self,
        message: &HandshakeMessage,
    ) -> Result<(), Error> {
        self.finish_server_verification(None)?;
        let version = self.negotiated_version()?;
        let allowed = self
            .negotiated
            .cipher_suite
            .and_then(|s| s.key_exchange())
            .map(|k| k.allows_client_certificate())
            .unwrap_or(false);
        if !allowed {
            return Err(Error::HandshakeFailure(
                "certificate request from an anonymous server".into(),
            ));
        }
        let request =
            CertificateRequest::decode(&message.body, version.has_signature_algorithms())?;
        debug!("Server requests a client certificate");
        self.request = Some(ClientAuthRequest::Legacy(request));
        self.state = S::ServerCertificateRequest;
        Ok(())
    }

    /// Credentials and scheme usable for the server's request, if any.
    fn client_credentials(&self) -> Result<Option<(&Credentials, Option<SignatureScheme>)>, Error> {
        let Some(credentials) = self.config.credentials() else {
            return Ok(None);
        };
        let version = self.negotiated_version()?;
        let (kind_ok, peer_schemes) = match &self.request {
            None => return Ok(None),
            Some(ClientAuthRequest::Legacy(request)) => (
                request
                    .certificate_types
                    .iter()
                    .any(|t| t.key_kind() == Some(credentials.key_kind())),
                request.signature_schemes.as_deref(),
            ),
            Some(ClientAuthRequest::Tls13 { schemes, .. }) => (true, Some(schemes.as_slice())),
        };
        if !kind_ok {
            return Ok(None);
        }
        let signer = credentials.signer();
        match select_signature_scheme(&self.config, version, signer.as_ref(), peer_schemes) {
            Ok(scheme) => Ok(Some((credentials, scheme))),
            Err(_) => Ok(None),
        }
    }

    fn handle_server_hello_done(
        &mut self,
        io: &mut dyn HandshakeIo,
        message: &HandshakeMessage,
    ) -> Result<(), Error> {
        if !message.body.is_empty() {
            return Err(Error::DecodeError("ServerHelloDone with a body".into()));
        }
        self.finish_server_verification(None)?;
        self.require_server_certificate()?;
        if !self.server_key_exchange_received {
            self.key_exchange
                .as_mut()
                .ok_or_else(|| Error::InternalError("no key exchange".into()))?
                .skip_server_key_exchange()?;
        }
        update_transcript(io, &mut self.transcript, message);
        self.state = S::ServerHelloDone;
        self.send_client_flight_legacy(io)
    }

    fn send_client_flight_legacy(&mut self, io: &mut dyn HandshakeIo) -> Result<(), Error> {
        let version = self.negotiated_version()?;

        if !self.config.supplemental_data().is_empty() {
            let mut body = Vec::new();
            SupplementalDataEntry::serialize_list(self.config.supplemental_data(), &mut body)?;
            send_handshake_message(io, &mut self.transcript, MessageType::SupplementalData, body)?;
            self.state = S::ClientSupplementalData;
        }

        let mut signing = None;
        if self.request.is_some() {
            let certificate = match self.client_credentials()? {
                Some((credentials, scheme)) => {
                    signing = Some((credentials.signer().clone(), scheme));
                    Certificate::new(credentials.chain().to_vec())
                }
                None => {
                    debug!("No suitable client certificate, sending an empty chain");
                    Certificate::empty_chain()
                }
            };
            send_certificate_message(io, &mut self.transcript, &certificate)?;
            self.sent_certificate = Some(certificate);
            self.state = S::ClientCertificate;
        }

        let body = self.with_key_exchange(|kx, ctx| kx.generate_client_key_exchange(ctx))?;
        send_handshake_message(io, &mut self.transcript, MessageType::ClientKeyExchange, body)?;
        self.state = S::ClientKeyExchange;

        let pre_master_secret = self
            .key_exchange
            .as_mut()
            .ok_or_else(|| Error::InternalError("no key exchange".into()))?
            .generate_pre_master_secret()?;
        if let Some(kx) = &self.key_exchange {
            self.negotiated.psk_identity = kx.psk_identity().map(<[u8]>::to_vec);
            self.negotiated.srp_identity = kx.srp_identity().map(<[u8]>::to_vec);
        }
        let session_hash = if self.negotiated.extended_master_secret {
            Some(self.transcript.current_prf_hash()?)
        } else {
            None
        };
        let prf = self
            .transcript
            .prf()
            .ok_or_else(|| Error::InternalError("PRF not determined".into()))?;
        let server_random = self
            .server_random
            .ok_or_else(|| Error::InternalError("no server random".into()))?;
        let master_secret = establish_master_secret(
            self.config.crypto_provider(),
            prf,
            &pre_master_secret,
            &self.hello()?.random,
            &server_random,
            session_hash.as_deref(),
        )?;
        self.master_secret = Some(master_secret);

        if let Some((signer, scheme)) = signing {
            let data = self
                .transcript
                .buffered()
                .ok_or_else(|| Error::InternalError("transcript not buffered".into()))?;
            let signature = signer.sign(scheme, data).map_err(Error::CryptoError)?;
            let mut body = Vec::new();
            DigitallySigned::new(scheme, signature).serialize(&mut body)?;
            send_handshake_message(io, &mut self.transcript, MessageType::CertificateVerify, body)?;
            self.state = S::ClientCertificateVerify;
        }
        self.transcript.stop_buffering();

        self.install_pending_cipher(io)?;
        io.send_change_cipher_spec()?;
        io.enable_pending_write()?;
        self.send_finished_legacy(io)?;
        io.end_flight()?;
        trace!("Client flight sent with {:?}", version);
        self.state = S::ClientFinished;
        Ok(())
    }

    fn send_finished_legacy(&mut self, io: &mut dyn HandshakeIo) -> Result<(), Error> {
        let verify_data = calculate_verify_data(
            self.config.crypto_provider(),
            &self.transcript,
            self.master_secret()?,
            true,
        )?;
        send_handshake_message(io, &mut self.transcript, MessageType::Finished, verify_data)
    }

    fn handle_finished_legacy(
        &mut self,
        io: &mut dyn HandshakeIo,
        message: &HandshakeMessage,
    ) -> Result<(), Error> {
        if !self.ccs_received {
            return Err(Error::UnexpectedMessage("Finished before ChangeCipherSpec".into()));
        }
        let expected = calculate_verify_data(
            self.config.crypto_provider(),
            &self.transcript,
            self.master_secret()?,
            false,
        )?;
        check_verify_data(&expected, &message.body)?;
        update_transcript(io, &mut self.transcript, message);

        if self.negotiated.resumed {
            io.send_change_cipher_spec()?;
            io.enable_pending_write()?;
            self.send_finished_legacy(io)?;
            io.end_flight()?;
        } else if !self.server_session_id.is_empty() {
            let parameters = session_parameters(
                &self.negotiated,
                self.master_secret()?,
                self.sent_certificate.clone(),
                self.server_extensions.clone(),
            )?;
            self.session = Some(Arc::new(Session::new(
                self.server_session_id.clone(),
                parameters,
            )));
        }
        self.complete(io);
        Ok(())
    }

    fn complete(&mut self, io: &mut dyn HandshakeIo) {
        debug!(
            "Handshake complete: {:?} {:?} resumed={}",
            self.negotiated.version, self.negotiated.cipher_suite, self.negotiated.resumed
        );
        self.state = S::End;
        self.key_exchange = None;
        io.handshake_complete();
    }

    // ------------------------------------------------------------------
    // TLS 1.3 server flight
    // ------------------------------------------------------------------

    fn handle_encrypted_extensions(
        &mut self,
        io: &mut dyn HandshakeIo,
        message: &HandshakeMessage,
    ) -> Result<(), Error> {
        let extensions = decode_all(&message.body, Extensions::parse, "EncryptedExtensions")?;
        check_server_extensions(&self.hello()?.extensions, &extensions, &[])?;
        for forbidden in [
            ExtensionType::SupportedVersions,
            ExtensionType::KeyShare,
            ExtensionType::StatusRequest,
        ] {
            if extensions.contains(forbidden) {
                return Err(Error::IllegalParameter(format!(
                    "{:?} in EncryptedExtensions",
                    forbidden
                )));
            }
        }
        let max_fragment_length = extensions.max_fragment_length()?;
        if max_fragment_length.is_some() && max_fragment_length != self.config.max_fragment_length()
        {
            return Err(Error::IllegalParameter(
                "max_fragment_length differs from the offer".into(),
            ));
        }
        apply_max_fragment_length(io, max_fragment_length);
        self.negotiated.max_fragment_length = max_fragment_length;
        self.negotiated.heartbeat = extensions.heartbeat()?;
        self.negotiated.server_name = self.config.server_name().map(str::to_string);
        self.server_extensions = extensions;
        self.state = S::ServerEncryptedExtensions;
        Ok(())
    }

    fn handle_certificate_request_tls13(
        &mut self,
        message: &HandshakeMessage,
    ) -> Result<(), Error> {
        let request = CertificateRequestTls13::decode(&message.body)?;
        let schemes = request
            .extensions
            .signature_algorithms()?
            .unwrap_or_default();
        debug!("Server requests a client certificate");
        self.request = Some(ClientAuthRequest::Tls13 {
            context: request.request_context,
            schemes,
        });
        self.state = S::ServerCertificateRequest;
        Ok(())
    }

    fn handle_certificate_tls13(&mut self, message: &HandshakeMessage) -> Result<(), Error> {
        let certificate = receive_certificate_message(&self.config, &message.body, true)?;
        if certificate.request_context.as_ref().map(|c| !c.is_empty()).unwrap_or(false) {
            return Err(Error::IllegalParameter(
                "server Certificate with a request context".into(),
            ));
        }
        if certificate.is_empty() {
            return Err(Error::DecodeError("server sent an empty chain".into()));
        }
        let mut ocsp = None;
        if let Some(data) = certificate.entries[0]
            .extensions
            .as_ref()
            .and_then(|e| e.get(ExtensionType::StatusRequest))
        {
            if !self.config.status_request() {
                return Err(Error::UnsupportedExtension(
                    "unsolicited status_request in Certificate".into(),
                ));
            }
            let status = CertificateStatus::decode(
                data,
                &[CertificateStatusType::Ocsp],
                certificate.len(),
            )?;
            ocsp = status.end_entity_response().map(<[u8]>::to_vec);
        }
        let context = VerifyContext {
            server_name: self.config.server_name(),
            is_server: true,
            ocsp: ocsp.as_deref(),
        };
        self.server_certificate =
            Some(verify_peer_certificate(&self.config, &certificate, &context)?);
        self.negotiated.ocsp_response = ocsp;
        self.negotiated.peer_certificate = Some(certificate);
        self.state = S::ServerCertificate;
        Ok(())
    }

    fn handle_certificate_verify_tls13(&mut self, message: &HandshakeMessage) -> Result<(), Error> {
        let signed = DigitallySigned::decode(&message.body, true)?;
        let certificate = self
            .server_certificate
            .clone()
            .ok_or_else(|| Error::InternalError("no server certificate".into()))?;
        let hash = self.transcript.final_hash(self.tls13_keys()?.hash())?;
        let content = tls13::certificate_verify_content(true, &hash);
        verify_signature(
            &self.config,
            ProtocolVersion::TLSV1_3,
            certificate.as_ref(),
            &signed,
            &content,
        )?;
        self.state = S::ServerCertificateVerify;
        Ok(())
    }

    fn handle_finished_tls13(
        &mut self,
        io: &mut dyn HandshakeIo,
        message: &HandshakeMessage,
    ) -> Result<(), Error> {
        let expected = self.tls13_keys()?.finished(false, &self.transcript)?;
        check_verify_data(&expected, &message.body)?;
        update_transcript(io, &mut self.transcript, message);

        let mut keys = self
            .tls13
            .take()
            .ok_or_else(|| Error::InternalError("TLS 1.3 keys not derived".into()))?;
        let result = self.send_client_flight_tls13(io, &mut keys);
        self.tls13 = Some(keys);
        result?;
        self.complete(io);
        Ok(())
    }

    fn send_client_flight_tls13(
        &mut self,
        io: &mut dyn HandshakeIo,
        keys: &mut Tls13Keys,
    ) -> Result<(), Error> {
        keys.derive_application_secrets(&self.transcript)?;
        io.install_tls13_read(keys.application_cipher(false)?)?;

        if let Some(ClientAuthRequest::Tls13 { context, .. }) = &self.request {
            let context = context.clone();
            let selected = self
                .client_credentials()?
                .map(|(c, s)| (c.chain().to_vec(), c.signer().clone(), s));
            let certificate = match &selected {
                Some((chain, _, _)) => Certificate::new_tls13(context, chain.clone()),
                None => Certificate::empty_chain_tls13(context),
            };
            send_certificate_message(io, &mut self.transcript, &certificate)?;
            self.sent_certificate = Some(certificate);
            self.state = S::ClientCertificate;

            if let Some((_, signer, scheme)) = selected {
                let hash = self.transcript.final_hash(keys.hash())?;
                let content = tls13::certificate_verify_content(false, &hash);
                let signature = signer.sign(scheme, &content).map_err(Error::CryptoError)?;
                let mut body = Vec::new();
                DigitallySigned::new(scheme, signature).serialize(&mut body)?;
                send_handshake_message(
                    io,
                    &mut self.transcript,
                    MessageType::CertificateVerify,
                    body,
                )?;
                self.state = S::ClientCertificateVerify;
            }
        }

        let verify_data = keys.finished(true, &self.transcript)?;
        send_handshake_message(io, &mut self.transcript, MessageType::Finished, verify_data)?;
        io.end_flight()?;
        io.install_tls13_write(keys.application_cipher(true)?)?;
        self.state = S::ClientFinished;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: ConnectionState, version: Option<ProtocolVersion>) {
        self.state = state;
        self.negotiated.version = version;
    }
}

impl Handshake for ClientHandshake {
    fn start(&mut self, io: &mut dyn HandshakeIo) -> Result<(), Error> {
        if self.state != S::Start {
            return Err(Error::InternalError("handshake already started".into()));
        }
        let provider = self.config.crypto_provider();
        let random = Random::new(provider.secure_random)?;
        let (_, max) = self.config.version_bounds(self.datagram);
        let client_version = if max.is_tls13() {
            ProtocolVersion::TLSV1_2
        } else {
            max
        };
        let suites = self.offered_suites()?;
        let key_share_group = if self.offers_tls13() {
            self.supported_groups().first().copied()
        } else {
            None
        };
        let extensions = self.client_extensions(&suites, key_share_group, None)?;
        let session_id = match &self.offered_session {
            Some(session) => {
                debug!("Offering session resumption");
                session.id().clone()
            }
            None => SessionId::empty(),
        };
        let cookie = self.datagram.then(Cookie::empty);
        self.hello = Some(ClientHello::new(
            client_version,
            random,
            session_id,
            cookie,
            suites,
            extensions,
        ));
        debug!("Begin handshake, offering up to {:?}", max);
        self.state = S::ClientHello;
        self.send_client_hello(io)
    }

    fn handle_message(
        &mut self,
        io: &mut dyn HandshakeIo,
        message: &HandshakeMessage,
    ) -> Result<(), Error> {
        let msg_type = message.msg_type;
        let tls13 = self.is_tls13();
        // Never hashed into the transcript.
        if msg_type == MessageType::HelloRequest && !tls13 {
            if !message.body.is_empty() {
                return Err(Error::DecodeError("HelloRequest body".into()));
            }
            debug!("Ignoring HelloRequest in {:?}", self.state);
            return Ok(());
        }
        let expected =
            expected_predecessors(msg_type, tls13, self.negotiated.resumed, self.datagram);
        if !expected.contains(&self.state) {
            return Err(unexpected_message(msg_type, self.state));
        }
        trace!("Received {:?} in {:?}", msg_type, self.state);

        match msg_type {
            MessageType::HelloVerifyRequest => self.handle_hello_verify_request(io, message),
            // Hashes itself: a retry request restarts the transcript first.
            MessageType::ServerHello => self.handle_server_hello(io, message),
            MessageType::ServerHelloDone => self.handle_server_hello_done(io, message),
            MessageType::Finished if tls13 => self.handle_finished_tls13(io, message),
            MessageType::Finished => self.handle_finished_legacy(io, message),
            _ => {
                match msg_type {
                    MessageType::EncryptedExtensions => {
                        self.handle_encrypted_extensions(io, message)?
                    }
                    MessageType::CertificateRequest if tls13 => {
                        self.handle_certificate_request_tls13(message)?
                    }
                    MessageType::CertificateRequest => {
                        self.handle_certificate_request_legacy(message)?
                    }
                    MessageType::Certificate if tls13 => self.handle_certificate_tls13(message)?,
                    MessageType::Certificate => self.handle_certificate_legacy(message)?,
                    MessageType::CertificateStatus => self.handle_certificate_status(message)?,
                    MessageType::CertificateVerify => {
                        self.handle_certificate_verify_tls13(message)?
                    }
                    MessageType::ServerKeyExchange => self.handle_server_key_exchange(message)?,
                    MessageType::SupplementalData => self.handle_supplemental_data(message)?,
                    _ => return Err(unexpected_message(msg_type, self.state)),
                }
                update_transcript(io, &mut self.transcript, message);
                Ok(())
            }
        }
    }

    fn handle_change_cipher_spec(&mut self, io: &mut dyn HandshakeIo) -> Result<(), Error> {
        if !self.expects_change_cipher_spec() {
            return Err(Error::UnexpectedMessage(format!(
                "ChangeCipherSpec in state {:?}",
                self.state
            )));
        }
        io.enable_pending_read()?;
        self.ccs_received = true;
        Ok(())
    }

    fn expects_change_cipher_spec(&self) -> bool {
        if self.is_tls13() || self.ccs_received {
            return false;
        }
        if self.negotiated.resumed {
            self.state == S::ServerHello
        } else {
            self.state == S::ClientFinished
        }
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn negotiated(&self) -> &Negotiated {
        &self.negotiated
    }

    fn session(&self) -> Option<Arc<Session>> {
        self.session.clone()
    }

    fn abort(&mut self) {
        self.master_secret = None;
        self.key_exchange = None;
        self.key_shares.clear();
        if let Some(keys) = self.tls13.as_mut() {
            keys.clear();
        }
        if let Some(session) = &self.session {
            session.invalidate();
        }
    }
}
