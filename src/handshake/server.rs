//! Server handshake state machine.

use std::sync::Arc;

use super::tls13::{self, Tls13Keys};
use super::{
    apply_max_fragment_length, calculate_verify_data, check_renegotiation_info,
    check_verify_data, establish_master_secret, receive_certificate_message,
    send_certificate_message, send_handshake_message, session_parameters, unexpected_message,
    update_transcript, verify_peer_certificate, write_downgrade_sentinel, ConnectionState,
    Handshake, HandshakeIo, Negotiated,
};
use crate::alert::AlertDescription;
use crate::config::Config;
use crate::credentials::{ClientAuth, VerifyContext};
use crate::crypto::prf::create_cipher_pair;
use crate::crypto::{Secret, TlsCertificate};
use crate::key_exchange::{
    select_signature_scheme, verify_signature, KeyExchange, KeyExchangeContext,
};
use crate::message::{
    Certificate, CertificateRequest, CertificateRequestTls13, CertificateStatus,
    CertificateStatusRequest, CertificateStatusRequestItemV2, CertificateStatusType,
    ClientCertificateType, ClientHello, DigitallySigned, Extensions, HandshakeMessage,
    KeyShareEntry, ServerHello, SupplementalDataEntry, COMPRESSION_NULL,
};
use crate::session::Session;
use crate::transcript::DeferredHash;
use crate::types::{
    CipherSuite, ExtensionType, KeyExchangeAlgorithm, MessageType, NamedGroup, ProtocolVersion,
    Random, SessionId,
};
use crate::Error;

use ConnectionState as S;

/// States after which `msg_type` may arrive at a server.
pub(crate) fn expected_predecessors(
    msg_type: MessageType,
    tls13: bool,
    resumed: bool,
) -> &'static [ConnectionState] {
    match msg_type {
        MessageType::ClientHello => &[S::Start, S::ServerHelloRetryRequest],
        MessageType::SupplementalData if !tls13 && !resumed => &[S::ServerHelloDone],
        MessageType::Certificate if tls13 => &[S::ServerFinished],
        MessageType::Certificate if !resumed => &[S::ServerHelloDone, S::ClientSupplementalData],
        MessageType::ClientKeyExchange if !tls13 && !resumed => &[
            S::ServerHelloDone,
            S::ClientSupplementalData,
            S::ClientCertificate,
        ],
        MessageType::CertificateVerify if tls13 => &[S::ClientCertificate],
        MessageType::CertificateVerify if !resumed => &[S::ClientKeyExchange],
        MessageType::Finished if tls13 => &[
            S::ServerFinished,
            S::ClientCertificate,
            S::ClientCertificateVerify,
        ],
        MessageType::Finished if resumed => &[S::ServerFinished],
        MessageType::Finished => &[S::ClientKeyExchange, S::ClientCertificateVerify],
        _ => &[],
    }
}

pub(crate) struct ServerHandshake {
    config: Arc<Config>,
    datagram: bool,
    state: ConnectionState,
    transcript: DeferredHash,
    client_hello: Option<ClientHello>,
    server_random: Option<Random>,
    session_id: SessionId,
    session: Option<Arc<Session>>,
    /// Group requested by our HelloRetryRequest.
    retry_group: Option<NamedGroup>,
    ccs_received: bool,
    key_exchange: Option<KeyExchange>,
    tls13: Option<Tls13Keys>,
    master_secret: Option<Secret>,
    certificate_requested: bool,
    client_certificate_received: bool,
    client_certificate: Option<Arc<dyn TlsCertificate>>,
    status_type: Option<CertificateStatusType>,
    server_extensions: Extensions,
    negotiated: Negotiated,
}

impl ServerHandshake {
    pub fn new(config: Arc<Config>, datagram: bool) -> Self {
        let transcript = DeferredHash::new(config.crypto_provider().hash_provider);
        ServerHandshake {
            config,
            datagram,
            state: S::Start,
            transcript,
            client_hello: None,
            server_random: None,
            session_id: SessionId::empty(),
            session: None,
            retry_group: None,
            ccs_received: false,
            key_exchange: None,
            tls13: None,
            master_secret: None,
            certificate_requested: false,
            client_certificate_received: false,
            client_certificate: None,
            status_type: None,
            server_extensions: Extensions::new(),
            negotiated: Negotiated::default(),
        }
    }

    fn is_tls13(&self) -> bool {
        self.negotiated.version.map(|v| v.is_tls13()).unwrap_or(false)
    }

    fn client_hello(&self) -> Result<&ClientHello, Error> {
        self.client_hello
            .as_ref()
            .ok_or_else(|| Error::InternalError("no ClientHello received".into()))
    }

    fn negotiated_version(&self) -> Result<ProtocolVersion, Error> {
        self.negotiated
            .version
            .ok_or_else(|| Error::InternalError("version not negotiated".into()))
    }

    fn negotiated_suite(&self) -> Result<CipherSuite, Error> {
        self.negotiated
            .cipher_suite
            .ok_or_else(|| Error::InternalError("cipher suite not negotiated".into()))
    }

    fn master_secret(&self) -> Result<&Secret, Error> {
        self.master_secret
            .as_ref()
            .ok_or_else(|| Error::InternalError("master secret not established".into()))
    }

    fn tls13_keys(&self) -> Result<&Tls13Keys, Error> {
        self.tls13
            .as_ref()
            .ok_or_else(|| Error::InternalError("TLS 1.3 keys not derived".into()))
    }

    fn server_random(&self) -> Result<&Random, Error> {
        self.server_random
            .as_ref()
            .ok_or_else(|| Error::InternalError("no server random".into()))
    }

    // ------------------------------------------------------------------
    // Negotiation
    // ------------------------------------------------------------------

    fn select_version(&self, hello: &ClientHello) -> Result<ProtocolVersion, Error> {
        let ours = self.config.versions(self.datagram);
        let selected = match hello.extensions.supported_versions_client()? {
            Some(offered) if !self.datagram => {
                ours.iter().copied().find(|v| offered.contains(v))
            }
            _ => ours
                .iter()
                .copied()
                .filter(|v| !v.is_tls13() && v.is_dtls() == self.datagram)
                .find(|v| !hello.client_version.is_earlier_than(*v)),
        };
        selected.ok_or_else(|| {
            Error::ProtocolVersion(format!(
                "client offers {:?}, we support {:?}",
                hello.client_version, ours
            ))
        })
    }

    fn client_groups(hello: &ClientHello) -> Result<Option<Vec<NamedGroup>>, Error> {
        hello.extensions.supported_groups()
    }

    /// First suite in our preference order that the client offered and we
    /// can complete.
    fn select_cipher_suite(
        &self,
        hello: &ClientHello,
        version: ProtocolVersion,
    ) -> Result<CipherSuite, Error> {
        let provider = self.config.crypto_provider();
        let client_groups = Self::client_groups(hello)?;
        let has_ecdhe_group = match &client_groups {
            Some(groups) => self
                .config
                .groups()
                .iter()
                .any(|g| g.is_ecdhe() && groups.contains(g)),
            None => true,
        };
        self.config
            .cipher_suites()
            .iter()
            .copied()
            .find(|s| {
                hello.offers(*s)
                    && s.is_valid_for_version(version)
                    && provider.find_cipher_suite(*s).is_some()
                    && self.config.has_credentials_for(*s, false)
                    && match s.key_exchange() {
                        Some(KeyExchangeAlgorithm::EcdheEcdsa | KeyExchangeAlgorithm::EcdheRsa) => {
                            has_ecdhe_group
                        }
                        _ => true,
                    }
            })
            .ok_or_else(|| Error::HandshakeFailure("no shared cipher suite".into()))
    }

    fn kx_context(&self) -> Result<KeyExchangeContext<'_>, Error> {
        let hello = self.client_hello()?;
        Ok(KeyExchangeContext {
            config: &self.config,
            version: self.negotiated_version()?,
            client_version: hello.client_version,
            client_random: hello.random.as_bytes(),
            server_random: self.server_random()?.as_bytes(),
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
        let hello = self.client_hello()?;
        let peer_schemes = hello.extensions.signature_algorithms()?;
        let client_groups = Self::client_groups(hello)?;
        let srp_identity = hello.extensions.srp_identity()?;
        let mut kx = self
            .key_exchange
            .take()
            .ok_or_else(|| Error::InternalError("no key exchange".into()))?;
        let result = match self.kx_context() {
            Ok(mut ctx) => {
                ctx.peer_schemes = peer_schemes.as_deref();
                ctx.client_groups = client_groups.as_deref();
                ctx.srp_identity = srp_identity.as_deref();
                f(&mut kx, &ctx)
            }
            Err(e) => Err(e),
        };
        self.key_exchange = Some(kx);
        result
    }

    fn handle_client_hello(
        &mut self,
        io: &mut dyn HandshakeIo,
        message: &HandshakeMessage,
    ) -> Result<(), Error> {
        let hello = ClientHello::decode(&message.body, self.datagram)?;
        update_transcript(io, &mut self.transcript, message);

        if self.state == S::ServerHelloRetryRequest {
            return self.handle_retried_client_hello(io, hello);
        }

        let version = self.select_version(&hello)?;
        let (_, server_max) = self.config.version_bounds(self.datagram);
        if hello.offers(CipherSuite::FALLBACK_SCSV) && version.is_earlier_than(server_max) {
            return Err(Error::InappropriateFallback);
        }
        let suite = self.select_cipher_suite(&hello, version)?;
        debug!("Negotiated {:?} with {:?}", version, suite);
        self.negotiated.version = Some(version);
        self.negotiated.cipher_suite = Some(suite);
        self.negotiated.server_name = hello.extensions.server_host_name()?;
        io.set_record_version(version);

        self.client_hello = Some(hello);
        if version.is_tls13() {
            self.start_tls13(io)
        } else {
            self.start_legacy(io)
        }
    }

    // ------------------------------------------------------------------
    // TLS 1.3
    // ------------------------------------------------------------------

    fn start_tls13(&mut self, io: &mut dyn HandshakeIo) -> Result<(), Error> {
        let suite = self.negotiated_suite()?;
        let hello = self.client_hello()?;
        let missing = |what: &str| {
            Error::Fatal(
                AlertDescription::MissingExtension,
                format!("TLS 1.3 ClientHello without {}", what),
            )
        };
        if hello.extensions.signature_algorithms()?.is_none() {
            return Err(missing("signature_algorithms"));
        }
        let groups = Self::client_groups(hello)?.ok_or_else(|| missing("supported_groups"))?;
        let shares = hello
            .extensions
            .key_share_client()?
            .ok_or_else(|| missing("key_share"))?;
        if hello.compression_methods != [COMPRESSION_NULL] {
            return Err(Error::IllegalParameter(
                "TLS 1.3 ClientHello with compression".into(),
            ));
        }

        let ours = self.config.groups();
        if let Some(share) = ours
            .iter()
            .find_map(|g| shares.iter().find(|s| s.group == *g))
        {
            let share = share.clone();
            return self.send_server_flight_tls13(io, share);
        }
        let group = ours
            .iter()
            .copied()
            .find(|g| groups.contains(g))
            .ok_or_else(|| Error::HandshakeFailure("no shared group".into()))?;
        self.send_hello_retry_request(io, suite, group)
    }

    fn send_hello_retry_request(
        &mut self,
        io: &mut dyn HandshakeIo,
        suite: CipherSuite,
        group: NamedGroup,
    ) -> Result<(), Error> {
        debug!("HelloRetryRequest for {:?}", group);
        tls13::restart_transcript_for_retry(&mut self.transcript, suite)?;
        let mut extensions = Extensions::new();
        extensions.add_supported_versions_server(ProtocolVersion::TLSV1_3);
        extensions.add_key_share_hello_retry(group);
        let retry = ServerHello::new(
            ProtocolVersion::TLSV1_2,
            Random::HELLO_RETRY_REQUEST,
            self.client_hello()?.session_id.clone(),
            suite,
            extensions,
        );
        let mut body = Vec::new();
        retry.serialize(&mut body)?;
        send_handshake_message(io, &mut self.transcript, MessageType::ServerHello, body)?;
        io.end_flight()?;
        self.retry_group = Some(group);
        self.state = S::ServerHelloRetryRequest;
        Ok(())
    }

    fn handle_retried_client_hello(
        &mut self,
        io: &mut dyn HandshakeIo,
        hello: ClientHello,
    ) -> Result<(), Error> {
        let group = self
            .retry_group
            .ok_or_else(|| Error::InternalError("retry without group".into()))?;
        let first = self.client_hello()?;
        if hello.random != first.random || hello.session_id != first.session_id {
            return Err(Error::IllegalParameter(
                "second ClientHello changed random or session id".into(),
            ));
        }
        if self.select_version(&hello)? != ProtocolVersion::TLSV1_3 {
            return Err(Error::IllegalParameter(
                "second ClientHello dropped TLS 1.3".into(),
            ));
        }
        if !hello.offers(self.negotiated_suite()?) {
            return Err(Error::IllegalParameter(
                "second ClientHello dropped the selected suite".into(),
            ));
        }
        let shares = hello.extensions.key_share_client()?.unwrap_or_default();
        let share = match shares.as_slice() {
            [share] if share.group == group => share.clone(),
            _ => {
                return Err(Error::IllegalParameter(format!(
                    "second ClientHello without a single {:?} key share",
                    group
                )))
            }
        };
        self.client_hello = Some(hello);
        self.send_server_flight_tls13(io, share)
    }

    fn send_server_flight_tls13(
        &mut self,
        io: &mut dyn HandshakeIo,
        client_share: KeyShareEntry,
    ) -> Result<(), Error> {
        let suite = self.negotiated_suite()?;
        let provider = self.config.crypto_provider().clone();
        if self.transcript.prf().is_none() {
            self.transcript
                .notify_prf_determined(suite.prf_algorithm(ProtocolVersion::TLSV1_3))?;
        }
        self.transcript.track_hash_algorithm(suite.hash_algorithm())?;
        self.transcript.seal_hash_algorithms();

        let kx_group = provider
            .find_kx_group(client_share.group)
            .ok_or_else(|| {
                Error::InternalError(format!("{:?} not supported", client_share.group))
            })?;
        let active = kx_group.start_exchange().map_err(Error::CryptoError)?;
        let server_share = KeyShareEntry::new(client_share.group, active.pub_key().to_vec());
        let shared = active
            .complete(&client_share.key_exchange)
            .map_err(Error::IllegalParameter)?;

        let random = Random::new(provider.secure_random)?;
        self.server_random = Some(random);
        let mut extensions = Extensions::new();
        extensions.add_supported_versions_server(ProtocolVersion::TLSV1_3);
        extensions.add_key_share_server(&server_share)?;
        let hello = self.client_hello()?;
        let legacy_session_id = hello.session_id.clone();
        let server_hello = ServerHello::new(
            ProtocolVersion::TLSV1_2,
            random,
            legacy_session_id.clone(),
            suite,
            extensions,
        );
        let mut body = Vec::new();
        server_hello.serialize(&mut body)?;
        send_handshake_message(io, &mut self.transcript, MessageType::ServerHello, body)?;
        self.state = S::ServerHello;
        // Middlebox compatibility mode (RFC 8446 D.4).
        if !legacy_session_id.is_empty() {
            io.send_change_cipher_spec()?;
        }

        let mut keys = Tls13Keys::new(&provider, suite)?;
        keys.derive_handshake_secrets(&shared, &self.transcript)?;
        io.install_tls13_write(keys.handshake_cipher(false)?)?;
        io.install_tls13_read(keys.handshake_cipher(true)?)?;

        let result = self.send_encrypted_flight_tls13(io, &mut keys);
        self.tls13 = Some(keys);
        result
    }

    fn send_encrypted_flight_tls13(
        &mut self,
        io: &mut dyn HandshakeIo,
        keys: &mut Tls13Keys,
    ) -> Result<(), Error> {
        let hello = self
            .client_hello
            .clone()
            .ok_or_else(|| Error::InternalError("no ClientHello received".into()))?;

        let mut extensions = Extensions::new();
        if hello.extensions.contains(ExtensionType::ServerName) {
            extensions.add_empty(ExtensionType::ServerName);
        }
        if let Some(value) = hello.extensions.max_fragment_length()? {
            extensions.add_max_fragment_length(value);
            self.negotiated.max_fragment_length = Some(value);
        }
        if let (Some(mode), Some(_)) = (self.config.heartbeat(), hello.extensions.heartbeat()?) {
            extensions.add_heartbeat(mode);
            self.negotiated.heartbeat = Some(mode);
        }
        let mut body = Vec::new();
        extensions.serialize(&mut body)?;
        send_handshake_message(io, &mut self.transcript, MessageType::EncryptedExtensions, body)?;
        self.server_extensions = extensions;
        self.state = S::ServerEncryptedExtensions;

        if self.config.client_auth() != ClientAuth::None {
            let mut request_extensions = Extensions::new();
            request_extensions.add_signature_algorithms(self.config.signature_schemes())?;
            let request = CertificateRequestTls13 {
                request_context: Vec::new(),
                extensions: request_extensions,
            };
            let mut body = Vec::new();
            request.serialize(&mut body)?;
            send_handshake_message(
                io,
                &mut self.transcript,
                MessageType::CertificateRequest,
                body,
            )?;
            self.certificate_requested = true;
            self.state = S::ServerCertificateRequest;
        }

        let credentials = self
            .config
            .credentials()
            .ok_or_else(|| Error::InternalError("TLS 1.3 without credentials".into()))?;
        let mut certificate = Certificate::new_tls13(Vec::new(), credentials.chain().to_vec());
        if let (Some(CertificateStatusRequest::Ocsp(_)), Some(response)) =
            (hello.extensions.status_request()?, self.config.ocsp_response())
        {
            let mut status = Vec::new();
            CertificateStatus::Ocsp(response.to_vec()).serialize(&mut status)?;
            if let Some(entry) = certificate.entries.first_mut() {
                entry
                    .extensions
                    .get_or_insert_with(Extensions::new)
                    .insert(ExtensionType::StatusRequest, status);
            }
        }
        send_certificate_message(io, &mut self.transcript, &certificate)?;
        self.state = S::ServerCertificate;

        let peer_schemes = hello.extensions.signature_algorithms()?;
        let scheme = select_signature_scheme(
            &self.config,
            ProtocolVersion::TLSV1_3,
            credentials.signer().as_ref(),
            peer_schemes.as_deref(),
        )?;
        let hash = self.transcript.final_hash(keys.hash())?;
        let content = tls13::certificate_verify_content(true, &hash);
        let signature = credentials
            .signer()
            .sign(scheme, &content)
            .map_err(Error::CryptoError)?;
        let mut body = Vec::new();
        DigitallySigned::new(scheme, signature).serialize(&mut body)?;
        send_handshake_message(io, &mut self.transcript, MessageType::CertificateVerify, body)?;
        self.state = S::ServerCertificateVerify;

        let verify_data = keys.finished(false, &self.transcript)?;
        send_handshake_message(io, &mut self.transcript, MessageType::Finished, verify_data)?;
        io.end_flight()?;
        keys.derive_application_secrets(&self.transcript)?;
        io.install_tls13_write(keys.application_cipher(false)?)?;
        apply_max_fragment_length(io, self.negotiated.max_fragment_length);
        self.state = S::ServerFinished;
        Ok(())
    }

    fn handle_certificate_tls13(&mut self, message: &HandshakeMessage) -> Result<(), Error> {
        if !self.certificate_requested {
            return Err(Error::UnexpectedMessage("unrequested client Certificate".into()));
        }
        let certificate = receive_certificate_message(&self.config, &message.body, true)?;
        if certificate.request_context.as_deref() != Some(&[][..]) {
            return Err(Error::IllegalParameter(
                "client Certificate with a foreign request context".into(),
            ));
        }
        self.receive_client_certificate(certificate)?;
        self.state = S::ClientCertificate;
        Ok(())
    }

    fn handle_certificate_verify_tls13(&mut self, message: &HandshakeMessage) -> Result<(), Error> {
        let certificate = self
            .client_certificate
            .clone()
            .ok_or_else(|| {
                Error::UnexpectedMessage("CertificateVerify without a certificate".into())
            })?;
        let signed = DigitallySigned::decode(&message.body, true)?;
        let hash = self.transcript.final_hash(self.tls13_keys()?.hash())?;
        let content = tls13::certificate_verify_content(false, &hash);
        verify_signature(
            &self.config,
            ProtocolVersion::TLSV1_3,
            certificate.as_ref(),
            &signed,
            &content,
        )?;
        self.state = S::ClientCertificateVerify;
        Ok(())
    }

    fn handle_finished_tls13(
        &mut self,
        io: &mut dyn HandshakeIo,
        message: &HandshakeMessage,
    ) -> Result<(), Error> {
        if self.certificate_requested && !self.client_certificate_received {
            return Err(self.missing_client_certificate());
        }
        if self.client_certificate.is_some() && self.state != S::ClientCertificateVerify {
            return Err(Error::UnexpectedMessage(
                "Finished without CertificateVerify".into(),
            ));
        }
        let keys = self.tls13_keys()?;
        let expected = keys.finished(true, &self.transcript)?;
        check_verify_data(&expected, &message.body)?;
        io.install_tls13_read(keys.application_cipher(true)?)?;
        update_transcript(io, &mut self.transcript, message);
        self.complete(io);
        Ok(())
    }

    // ------------------------------------------------------------------
    // TLS 1.0 to 1.2
    // ------------------------------------------------------------------

    /// A cached session the client may resume, if any.
    fn find_resumable_session(
        &self,
        hello: &ClientHello,
        version: ProtocolVersion,
        client_ems: bool,
    ) -> Result<Option<Arc<Session>>, Error> {
        if hello.session_id.is_empty() {
            return Ok(None);
        }
        let Some(cache) = self.config.session_cache() else {
            return Ok(None);
        };
        let Some(session) = cache.lookup(hello.session_id.as_slice()) else {
            return Ok(None);
        };
        let Some(parameters) = session.parameters() else {
            return Ok(None);
        };
        let suite = parameters.cipher_suite();
        if parameters.version() != version
            || !hello.offers(suite)
            || !self.config.cipher_suites().contains(&suite)
        {
            return Ok(None);
        }
        match (parameters.extended_master_secret(), client_ems) {
            (true, false) => Err(Error::HandshakeFailure(
                "session used extended master secret, the resuming hello does not".into(),
            )),
            (false, true) => Ok(None),
            _ => Ok(Some(session)),
        }
    }

    fn start_legacy(&mut self, io: &mut dyn HandshakeIo) -> Result<(), Error> {
        let version = self.negotiated_version()?;
        let hello = self
            .client_hello
            .clone()
            .ok_or_else(|| Error::InternalError("no ClientHello received".into()))?;
        let extensions = &hello.extensions;

        let secure_renegotiation = check_renegotiation_info(extensions)?
            || hello.offers(CipherSuite::EMPTY_RENEGOTIATION_INFO_SCSV);
        let client_ems = extensions.extended_master_secret()?;
        if !client_ems && self.config.require_extended_master_secret() {
            return Err(Error::HandshakeFailure(
                "client does not offer extended master secret".into(),
            ));
        }
        let ems = client_ems && self.config.use_extended_master_secret();
        let max_fragment_length = extensions.max_fragment_length()?;

        let provider = self.config.crypto_provider().clone();
        let mut random = Random::new(provider.secure_random)?;
        let (_, server_max) = self.config.version_bounds(self.datagram);
        write_downgrade_sentinel(&mut random, version, server_max);
        self.server_random = Some(random);

        let resumed = self.find_resumable_session(&hello, version, ems)?;
        let mut server_extensions = Extensions::new();
        if secure_renegotiation {
            server_extensions.add_renegotiation_info();
        }
        if ems {
            server_extensions.add_extended_master_secret();
        }

        if let Some(session) = resumed {
            let parameters = session
                .parameters()
                .ok_or_else(|| Error::InternalError("session invalidated".into()))?;
            let stored = parameters.max_fragment_length()?;
            if max_fragment_length.is_some() && max_fragment_length != stored {
                return Err(Error::IllegalParameter(
                    "max_fragment_length differs from the session".into(),
                ));
            }
            if let Some(value) = stored {
                server_extensions.add_max_fragment_length(value);
            }
            debug!("Resuming session");
            self.negotiated.cipher_suite = Some(parameters.cipher_suite());
            self.negotiated.resumed = true;
            self.negotiated.extended_master_secret = ems;
            self.negotiated.max_fragment_length = stored;
            self.negotiated.peer_certificate = parameters.peer_certificate().cloned();
            self.negotiated.psk_identity = parameters.psk_identity().map(<[u8]>::to_vec);
            self.negotiated.srp_identity = parameters.srp_identity().map(<[u8]>::to_vec);
            self.master_secret = Some(Secret::new(parameters.master_secret().to_vec()));
            self.session_id = session.id().clone();
            self.session = Some(session);
        } else {
            self.negotiated.extended_master_secret = ems;
            self.negotiated.max_fragment_length = max_fragment_length;
            self.add_full_handshake_extensions(&hello, &mut server_extensions)?;
            if self.config.session_cache().is_some() {
                self.session_id = SessionId::random(32, provider.secure_random)?;
            }
        }

        let suite = self.negotiated_suite()?;
        let kx = suite
            .key_exchange()
            .ok_or_else(|| Error::InternalError("suite without key exchange".into()))?;
        self.transcript
            .notify_prf_determined(suite.prf_algorithm(version))?;
        if version.has_signature_algorithms() {
            self.transcript.track_hash_algorithm(suite.hash_algorithm())?;
        }
        self.certificate_requested = !self.negotiated.resumed
            && self.config.client_auth() != ClientAuth::None
            && kx.allows_client_certificate();
        if self.certificate_requested {
            self.transcript.force_buffering()?;
        }
        self.transcript.seal_hash_algorithms();

        let server_hello = ServerHello::new(
            version,
            random,
            self.session_id.clone(),
            suite,
            server_extensions.clone(),
        );
        let mut body = Vec::new();
        server_hello.serialize(&mut body)?;
        send_handshake_message(io, &mut self.transcript, MessageType::ServerHello, body)?;
        self.server_extensions = server_extensions;
        self.state = S::ServerHello;
        apply_max_fragment_length(io, self.negotiated.max_fragment_length);

        if self.negotiated.resumed {
            self.install_pending_cipher(io)?;
            io.send_change_cipher_spec()?;
            io.enable_pending_write()?;
            self.send_finished_legacy(io)?;
            io.end_flight()?;
            self.state = S::ServerFinished;
            return Ok(());
        }

        self.key_exchange = Some(KeyExchange::for_algorithm(kx)?);
        self.send_server_flight_legacy(io, kx)
    }

    /// Answers to the client's extensions in a full handshake.
    fn add_full_handshake_extensions(
        &mut self,
        hello: &ClientHello,
        server_extensions: &mut Extensions,
    ) -> Result<(), Error> {
        let extensions = &hello.extensions;
        let suite = self.negotiated_suite()?;
        if extensions.contains(ExtensionType::ServerName) {
            server_extensions.add_empty(ExtensionType::ServerName);
        }
        if let Some(value) = extensions.max_fragment_length()? {
            server_extensions.add_max_fragment_length(value);
        }
        if extensions.ec_point_formats()?.is_some()
            && matches!(
                suite.key_exchange(),
                Some(KeyExchangeAlgorithm::EcdheEcdsa | KeyExchangeAlgorithm::EcdheRsa)
            )
        {
            server_extensions.add_ec_point_formats();
        }
        if let (Some(mode), Some(_)) = (self.config.heartbeat(), extensions.heartbeat()?) {
            server_extensions.add_heartbeat(mode);
            self.negotiated.heartbeat = Some(mode);
        }

        let sends_certificate = suite
            .key_exchange()
            .map(|k| k.requires_server_certificate())
            .unwrap_or(false);
        if sends_certificate && self.config.ocsp_response().is_some() {
            let v2_types: Vec<CertificateStatusType> = extensions
                .status_request_v2()?
                .unwrap_or_default()
                .iter()
                .filter_map(CertificateStatusRequestItemV2::status_type)
                .collect();
            if v2_types.contains(&CertificateStatusType::OcspMulti) {
                server_extensions.add_empty(ExtensionType::StatusRequestV2);
                self.status_type = Some(CertificateStatusType::OcspMulti);
            } else if v2_types.contains(&CertificateStatusType::Ocsp) {
                server_extensions.add_empty(ExtensionType::StatusRequestV2);
                self.status_type = Some(CertificateStatusType::Ocsp);
            } else if let Some(CertificateStatusRequest::Ocsp(_)) = extensions.status_request()? {
                server_extensions.add_empty(ExtensionType::StatusRequest);
                self.status_type = Some(CertificateStatusType::Ocsp);
            }
        }
        Ok(())
    }

    fn send_server_flight_legacy(
        &mut self,
        io: &mut dyn HandshakeIo,
        kx: KeyExchangeAlgorithm,
    ) -> Result<(), Error> {
        let version = self.negotiated_version()?;

        if !self.config.supplemental_data().is_empty() {
            let mut body = Vec::new();
            SupplementalDataEntry::serialize_list(self.config.supplemental_data(), &mut body)?;
            send_handshake_message(io, &mut self.transcript, MessageType::SupplementalData, body)?;
            self.state = S::ServerSupplementalData;
        }

        if kx.requires_server_certificate() {
            let credentials = self
                .config
                .credentials()
                .ok_or_else(|| Error::InternalError("suite needs credentials".into()))?;
            let certificate = Certificate::new(credentials.chain().to_vec());
            send_certificate_message(io, &mut self.transcript, &certificate)?;
            self.state = S::ServerCertificate;

            if let (Some(status_type), Some(response)) =
                (self.status_type, self.config.ocsp_response())
            {
                let status = match status_type {
                    CertificateStatusType::Ocsp => CertificateStatus::Ocsp(response.to_vec()),
                    CertificateStatusType::OcspMulti => {
                        CertificateStatus::OcspMulti(vec![Some(response.to_vec())])
                    }
                };
                let mut body = Vec::new();
                status.serialize(&mut body)?;
                send_handshake_message(
                    io,
                    &mut self.transcript,
                    MessageType::CertificateStatus,
                    body,
                )?;
                self.state = S::ServerCertificateStatus;
            }
        }

        let server_key_exchange =
            self.with_key_exchange(|kx, ctx| kx.generate_server_key_exchange(ctx))?;
        if let Some(body) = server_key_exchange {
            send_handshake_message(io, &mut self.transcript, MessageType::ServerKeyExchange, body)?;
            self.state = S::ServerKeyExchange;
        }

        if self.certificate_requested {
            let request = CertificateRequest {
                certificate_types: vec![
                    ClientCertificateType::EcdsaSign,
                    ClientCertificateType::RsaSign,
                ],
                signature_schemes: version
                    .has_signature_algorithms()
                    .then(|| self.config.signature_schemes().to_vec()),
                certificate_authorities: Vec::new(),
            };
            let mut body = Vec::new();
            request.serialize(&mut body)?;
            send_handshake_message(
                io,
                &mut self.transcript,
                MessageType::CertificateRequest,
                body,
            )?;
            self.state = S::ServerCertificateRequest;
        }

        send_handshake_message(io, &mut self.transcript, MessageType::ServerHelloDone, Vec::new())?;
        io.end_flight()?;
        self.state = S::ServerHelloDone;
        Ok(())
    }

    fn install_pending_cipher(&mut self, io: &mut dyn HandshakeIo) -> Result<(), Error> {
        let prf = self
            .transcript
            .prf()
            .ok_or_else(|| Error::InternalError("PRF not determined".into()))?;
        let pair = create_cipher_pair(
            self.config.crypto_provider(),
            self.negotiated_suite()?,
            self.negotiated_version()?,
            prf,
            self.master_secret()?,
            self.client_hello()?.random.as_bytes(),
            self.server_random()?.as_bytes(),
            false,
        )?;
        io.set_pending_cipher(pair);
        Ok(())
    }

    fn send_finished_legacy(&mut self, io: &mut dyn HandshakeIo) -> Result<(), Error> {
        let verify_data = calculate_verify_data(
            self.config.crypto_provider(),
            &self.transcript,
            self.master_secret()?,
            false,
        )?;
        send_handshake_message(io, &mut self.transcript, MessageType::Finished, verify_data)
    }

    fn missing_client_certificate(&self) -> Error {
        if self.is_tls13() {
            Error::CertificateRequired
        } else {
            Error::HandshakeFailure("client did not send a certificate".into())
        }
    }

    /// Verify a client chain. An empty one is fine unless a certificate is
    /// required.
    fn receive_client_certificate(&mut self, certificate: Certificate) -> Result<(), Error> {
        self.client_certificate_received = true;
        if certificate.is_empty() {
            debug!("Client sent an empty certificate chain");
            if self.config.client_auth() == ClientAuth::Required {
                return Err(self.missing_client_certificate());
            }
            return Ok(());
        }
        let context = VerifyContext {
            server_name: self.negotiated.server_name.as_deref(),
            is_server: false,
            ocsp: None,
        };
        let parsed = verify_peer_certificate(&self.config, &certificate, &context)?;
        self.client_certificate = Some(parsed);
        self.negotiated.peer_certificate = Some(certificate);
        Ok(())
    }

    fn handle_supplemental_data(&mut self, message: &HandshakeMessage) -> Result<(), Error> {
        let entries = SupplementalDataEntry::decode_list(&message.body)?;
        debug!("Client supplemental data, {} entries", entries.len());
        self.negotiated.supplemental_data = entries;
        self.state = S::ClientSupplementalData;
        Ok(())
    }

    fn handle_certificate_legacy(&mut self, message: &HandshakeMessage) -> Result<(), Error> {
        if !self.certificate_requested {
            return Err(Error::UnexpectedMessage("unrequested client Certificate".into()));
        }
        let certificate = receive_certificate_message(&self.config, &message.body, false)?;
        self.receive_client_certificate(certificate)?;
        self.state = S::ClientCertificate;
        Ok(())
    }

    fn handle_client_key_exchange(
        &mut self,
        io: &mut dyn HandshakeIo,
        message: &HandshakeMessage,
    ) -> Result<(), Error> {
        if self.certificate_requested && !self.client_certificate_received {
            return Err(Error::UnexpectedMessage(
                "ClientKeyExchange without the requested Certificate".into(),
            ));
        }
        self.with_key_exchange(|kx, ctx| kx.process_client_key_exchange(ctx, &message.body))?;
        update_transcript(io, &mut self.transcript, message);

        let kx = self
            .key_exchange
            .as_mut()
            .ok_or_else(|| Error::InternalError("no key exchange".into()))?;
        let pre_master_secret = kx.generate_pre_master_secret()?;
        self.negotiated.psk_identity = kx.psk_identity().map(<[u8]>::to_vec);
        self.negotiated.srp_identity = kx.srp_identity().map(<[u8]>::to_vec);

        let session_hash = if self.negotiated.extended_master_secret {
            Some(self.transcript.current_prf_hash()?)
        } else {
            None
        };
        let prf = self
            .transcript
            .prf()
            .ok_or_else(|| Error::InternalError("PRF not determined".into()))?;
        let master_secret = establish_master_secret(
            self.config.crypto_provider(),
            prf,
            &pre_master_secret,
            &self.client_hello()?.random,
            self.server_random()?,
            session_hash.as_deref(),
        )?;
        self.master_secret = Some(master_secret);
        self.install_pending_cipher(io)?;
        self.state = S::ClientKeyExchange;
        Ok(())
    }

    fn handle_certificate_verify_legacy(
        &mut self,
        io: &mut dyn HandshakeIo,
        message: &HandshakeMessage,
    ) -> Result<(), Error> {
        let certificate = self
            .client_certificate
            .clone()
            .ok_or_else(|| {
                Error::UnexpectedMessage("CertificateVerify without a certificate".into())
            })?;
        let version = self.negotiated_version()?;
        let signed = DigitallySigned::decode(&message.body, version.has_signature_algorithms())?;
        let data = self
            .transcript
            .buffered()
            .ok_or_else(|| Error::InternalError("transcript not buffered".into()))?;
        verify_signature(&self.config, version, certificate.as_ref(), &signed, data)?;
        self.transcript.stop_buffering();
        update_transcript(io, &mut self.transcript, message);
        self.state = S::ClientCertificateVerify;
        Ok(())
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
            true,
        )?;
        check_verify_data(&expected, &message.body)?;
        update_transcript(io, &mut self.transcript, message);

        if !self.negotiated.resumed {
            io.send_change_cipher_spec()?;
            io.enable_pending_write()?;
            self.send_finished_legacy(io)?;
            io.end_flight()?;
            self.store_session()?;
        }
        self.complete(io);
        Ok(())
    }

    fn store_session(&mut self) -> Result<(), Error> {
        let Some(cache) = self.config.session_cache().cloned() else {
            return Ok(());
        };
        if self.session_id.is_empty() {
            return Ok(());
        }
        let local_certificate = self
            .config
            .credentials()
            .filter(|_| {
                self.negotiated
                    .cipher_suite
                    .and_then(|s| s.key_exchange())
                    .map(|k| k.requires_server_certificate())
                    .unwrap_or(false)
            })
            .map(|c| Certificate::new(c.chain().to_vec()));
        let parameters = session_parameters(
            &self.negotiated,
            self.master_secret()?,
            local_certificate,
            self.server_extensions.clone(),
        )?;
        let session = Arc::new(Session::new(self.session_id.clone(), parameters));
        trace!("Caching session {:?}", session.id());
        cache.store(session.clone());
        self.session = Some(session);
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

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: ConnectionState, version: Option<ProtocolVersion>) {
        self.state = state;
        self.negotiated.version = version;
    }
}

impl Handshake for ServerHandshake {
    fn handle_message(
        &mut self,
        io: &mut dyn HandshakeIo,
        message: &HandshakeMessage,
    ) -> Result<(), Error> {
        let msg_type = message.msg_type;
        let tls13 = self.is_tls13();
        let expected = expected_predecessors(msg_type, tls13, self.negotiated.resumed);
        if !expected.contains(&self.state) {
            return Err(unexpected_message(msg_type, self.state));
        }
        trace!("Received {:?} in {:?}", msg_type, self.state);

        match msg_type {
            MessageType::ClientHello => self.handle_client_hello(io, message),
            MessageType::ClientKeyExchange => self.handle_client_key_exchange(io, message),
            MessageType::CertificateVerify if !tls13 => {
                self.handle_certificate_verify_legacy(io, message)
            }
            MessageType::Finished if tls13 => self.handle_finished_tls13(io, message),
            MessageType::Finished => self.handle_finished_legacy(io, message),
            _ => {
                match msg_type {
                    MessageType::SupplementalData => self.handle_supplemental_data(message)?,
                    MessageType::Certificate if tls13 => self.handle_certificate_tls13(message)?,
                    MessageType::Certificate => self.handle_certificate_legacy(message)?,
                    MessageType::CertificateVerify => {
                        self.handle_certificate_verify_tls13(message)?
                    }
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
        self.transcript.stop_buffering();
        io.enable_pending_read()?;
        self.ccs_received = true;
        Ok(())
    }

    fn expects_change_cipher_spec(&self) -> bool {
        if self.is_tls13() || self.ccs_received {
            return false;
        }
        if self.negotiated.resumed {
            self.state == S::ServerFinished
        } else if self.client_certificate.is_some() {
            // A signing client must send CertificateVerify first.
            self.state == S::ClientCertificateVerify
        } else {
            matches!(self.state, S::ClientKeyExchange | S::ClientCertificateVerify)
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
        if let Some(keys) = self.tls13.as_mut() {
            keys.clear();
        }
        if let Some(session) = self.session.take() {
            session.invalidate();
            if let Some(cache) = self.config.session_cache() {
                cache.remove(session.id().as_slice());
            }
        }
    }
}

#[cfg(all(test, feature = "rust-crypto"))]
mod tests {
    use super::*;
    use crate::crypto::rust_crypto::default_provider;
    use crate::handshake::client::ClientHandshake;
    use crate::handshake::testing::RecordingIo;

    fn config() -> Arc<Config> {
        Arc::new(
            Config::builder()
                .with_crypto_provider(default_provider())
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn unexpected_messages_for_every_state() {
        for version in [None, Some(ProtocolVersion::TLSV1_2), Some(ProtocolVersion::TLSV1_3)] {
            let tls13 = version.map(|v| v.is_tls13()).unwrap_or(false);
            for state in ConnectionState::ALL {
                for msg_type in MessageType::ALL {
                    if expected_predecessors(*msg_type, tls13, false).contains(state) {
                        continue;
                    }
                    let mut server = ServerHandshake::new(config(), false);
                    server.force_state(*state, version);
                    let mut io = RecordingIo::new(false);
                    let message = HandshakeMessage::new(*msg_type, Vec::new()).unwrap();
                    let result = server.handle_message(&mut io, &message);
                    assert!(
                        matches!(result, Err(Error::UnexpectedMessage(_))),
                        "{:?} in {:?} ({:?}) gave {:?}",
                        msg_type,
                        state,
                        version,
                        result
                    );
                    assert!(io.sent.is_empty());
                }
            }
        }
    }

    #[test]
    fn resumed_handshake_expects_only_finished() {
        for msg_type in [
            MessageType::Certificate,
            MessageType::ClientKeyExchange,
            MessageType::CertificateVerify,
        ] {
            assert!(expected_predecessors(msg_type, false, true).is_empty());
        }
        assert_eq!(
            expected_predecessors(MessageType::Finished, false, true),
            &[S::ServerFinished]
        );
    }

    fn client_hello(config: Arc<Config>) -> HandshakeMessage {
        let mut client = ClientHandshake::new(config, false, None);
        let mut io = RecordingIo::new(false);
        client.start(&mut io).unwrap();
        io.take_sent().remove(0)
    }

    #[test]
    fn version_without_overlap_is_protocol_version() {
        let client = Arc::new(
            Config::builder()
                .with_crypto_provider(default_provider())
                .versions(ProtocolVersion::TLSV1_0, ProtocolVersion::TLSV1_1)
                .build()
                .unwrap(),
        );
        let mut server = ServerHandshake::new(config(), false);
        let mut io = RecordingIo::new(false);
        let result = server.handle_message(&mut io, &client_hello(client));
        assert!(matches!(result, Err(Error::ProtocolVersion(_))));
    }

    #[test]
    fn no_shared_suite_is_handshake_failure() {
        // No credentials: the server can only do anonymous suites.
        let mut server = ServerHandshake::new(config(), false);
        let mut io = RecordingIo::new(false);
        let result = server.handle_message(&mut io, &client_hello(config()));
        assert!(matches!(result, Err(Error::HandshakeFailure(_))));
    }

    #[test]
    fn fallback_scsv_below_our_maximum() {
        let client = Arc::new(
            Config::builder()
                .with_crypto_provider(default_provider())
                .versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
                .fallback(true)
                .build()
                .unwrap(),
        );
        let mut server = ServerHandshake::new(config(), false);
        let mut io = RecordingIo::new(false);
        let result = server.handle_message(&mut io, &client_hello(client));
        assert!(matches!(result, Err(Error::InappropriateFallback)));
    }

    fn anonymous_config() -> Arc<Config> {
        Arc::new(
            Config::builder()
                .with_crypto_provider(default_provider())
                .versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
                .cipher_suites(&[CipherSuite::DH_ANON_AES128_GCM_SHA256])
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn anonymous_server_flight() {
        let mut server = ServerHandshake::new(anonymous_config(), false);
        let mut io = RecordingIo::new(false);
        server
            .handle_message(&mut io, &client_hello(anonymous_config()))
            .unwrap();
        let types: Vec<MessageType> = io.sent.iter().map(|m| m.msg_type).collect();
        assert_eq!(
            types,
            [
                MessageType::ServerHello,
                MessageType::ServerKeyExchange,
                MessageType::ServerHelloDone
            ]
        );
        assert_eq!(io.flights, 1);
        assert_eq!(server.state(), S::ServerHelloDone);

        let hello = ServerHello::decode(&io.sent[0].body).unwrap();
        assert_eq!(hello.extensions.renegotiation_info(), Some(&[0u8][..]));
        assert!(hello.extensions.extended_master_secret().unwrap());
        // No cache, no session id.
        assert!(hello.session_id.is_empty());
        // Anonymous suites never request a certificate.
        let certificate = HandshakeMessage::new(MessageType::Certificate, Vec::new()).unwrap();
        assert!(matches!(
            server.handle_message(&mut io, &certificate),
            Err(Error::UnexpectedMessage(_))
        ));
    }

    #[test]
    fn renegotiation_info_must_be_initial() {
        let mut message = client_hello(anonymous_config());
        let mut hello = ClientHello::decode(&message.body, false).unwrap();
        hello
            .extensions
            .insert(ExtensionType::RenegotiationInfo, vec![1, 7]);
        message.body.clear();
        hello.serialize(&mut message.body).unwrap();

        let mut server = ServerHandshake::new(anonymous_config(), false);
        let mut io = RecordingIo::new(false);
        let result = server.handle_message(&mut io, &message);
        assert!(matches!(result, Err(Error::HandshakeFailure(_))));
        assert!(io.sent.is_empty());
    }

    #[test]
    fn change_cipher_spec_before_key_exchange_is_unexpected() {
        let mut server = ServerHandshake::new(config(), false);
        server.force_state(S::ServerHelloDone, Some(ProtocolVersion::TLSV1_2));
        let mut io = RecordingIo::new(false);
        assert!(!server.expects_change_cipher_spec());
        assert!(matches!(
            server.handle_change_cipher_spec(&mut io),
            Err(Error::UnexpectedMessage(_))
        ));
    }
}
