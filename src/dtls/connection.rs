use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use subtle::ConstantTimeEq;

use super::reliable::DtlsReliableHandshake;
use super::Output;
use crate::alert::{Alert, AlertDescription};
use crate::config::Config;
use crate::handshake::{ConnectionState, Handshake, Negotiated};
use crate::message::{ClientHello, HandshakeHeader, HandshakeMessage, HelloVerifyRequest};
use crate::record::DtlsRecord;
use crate::session::Session;
use crate::types::{ContentType, Cookie, MessageType};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Handshaking,
    Connected,
    /// close_notify received.
    Closed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalEvent {
    Connected,
    PeerCert,
}

/// One DTLS association: a handshake machine driven through the
/// reliability layer, then application data.
pub(crate) struct DtlsConnection {
    config: Arc<Config>,
    handshake: Box<dyn Handshake + Send>,
    reliable: DtlsReliableHandshake,
    is_client: bool,
    phase: Phase,
    started: bool,
    /// Server: the HelloVerifyRequest secret until a cookie checks out.
    cookie_secret: Option<[u8; 32]>,
    events: VecDeque<LocalEvent>,
    application_input: VecDeque<Vec<u8>>,
    /// Sent before the handshake completed.
    queued_output: VecDeque<Vec<u8>>,
    close_sent: bool,
}

impl DtlsConnection {
    pub fn new(
        config: Arc<Config>,
        handshake: Box<dyn Handshake + Send>,
        is_client: bool,
        mtu: usize,
    ) -> Result<Self, Error> {
        let mut reliable = DtlsReliableHandshake::new(&config, mtu);
        let cookie_secret = if !is_client && config.dtls_cookie_exchange() {
            let mut secret = [0; 32];
            if config.rng_seed().is_some() {
                reliable.rng().fill(&mut secret);
            } else {
                config
                    .crypto_provider()
                    .secure_random
                    .fill(&mut secret)
                    .map_err(Error::CryptoError)?;
            }
            reliable.set_stateless(true);
            Some(secret)
        } else {
            None
        };
        Ok(DtlsConnection {
            config,
            handshake,
            reliable,
            is_client,
            phase: Phase::Handshaking,
            started: false,
            cookie_secret,
            events: VecDeque::new(),
            application_input: VecDeque::new(),
            queued_output: VecDeque::new(),
            close_sent: false,
        })
    }

    pub fn handle_packet(&mut self, packet: &[u8]) -> Result<(), Error> {
        if self.phase == Phase::Failed {
            return Err(Error::Closed);
        }
        let mut rest = packet;
        while !rest.is_empty() && self.phase != Phase::Closed {
            let (record, tail) = self.reliable.decode_next(rest);
            rest = tail;
            if let Some(record) = record {
                let result = self.process_record(record);
                self.check(result)?;
            }
        }
        Ok(())
    }

    /// Drive timers. The client sends its first flight on the first call.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        if self.phase == Phase::Failed {
            return Err(Error::Closed);
        }
        if self.is_client && !self.started {
            self.started = true;
            self.reliable.start_connect_timer();
            let result = self.handshake.start(&mut self.reliable);
            self.check(result)?;
        }
        let result = self.reliable.handle_timeout(now);
        self.check(result)
    }

    pub fn poll_output<'a>(&mut self, buf: &'a mut [u8]) -> Output<'a> {
        if let Some(event) = self.events.pop_front() {
            match event {
                LocalEvent::Connected => return Output::Connected,
                LocalEvent::PeerCert => {
                    let der = self
                        .handshake
                        .negotiated()
                        .peer_certificate
                        .as_ref()
                        .and_then(|c| c.end_entity())
                        .unwrap_or_default();
                    return Output::PeerCert(copy_into(buf, der, "peer certificate"));
                }
            }
        }
        if let Some(data) = self.application_input.pop_front() {
            return Output::ApplicationData(copy_into(buf, &data, "application data"));
        }
        if let Some(datagram) = self.reliable.poll_datagram() {
            return Output::Packet(copy_into(buf, &datagram, "datagram"));
        }
        Output::Timeout(self.reliable.poll_timeout())
    }

    pub fn send_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        match self.phase {
            Phase::Failed | Phase::Closed => Err(Error::Closed),
            Phase::Handshaking => {
                self.queued_output.push_back(data.to_vec());
                Ok(())
            }
            Phase::Connected if self.close_sent => Err(Error::Closed),
            Phase::Connected => self.reliable.send_application_data(data),
        }
    }

    pub fn close(&mut self) -> Result<(), Error> {
        if self.phase == Phase::Failed {
            return Err(Error::Closed);
        }
        if self.close_sent {
            return Ok(());
        }
        debug!("Sending close_notify");
        self.close_sent = true;
        self.reliable
            .send_alert(Alert::warning(AlertDescription::CloseNotify))
    }

    pub fn is_connected(&self) -> bool {
        self.phase == Phase::Connected
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.phase, Phase::Closed | Phase::Failed)
    }

    pub fn state(&self) -> ConnectionState {
        self.handshake.state()
    }

    pub fn negotiated(&self) -> &Negotiated {
        self.handshake.negotiated()
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.handshake.session()
    }

    fn check(&mut self, result: Result<(), Error>) -> Result<(), Error> {
        result.map_err(|e| self.fail(e))
    }

    /// The single abort path: alert the peer, drop the handshake secrets
    /// and refuse any further use.
    fn fail(&mut self, error: Error) -> Error {
        if self.phase == Phase::Failed {
            return error;
        }
        if let Some(description) = error.alert_description() {
            if let Err(e) = self.reliable.send_alert(Alert::fatal(description)) {
                debug!("Could not send {:?} alert: {}", description, e);
            }
        }
        self.handshake.abort();
        self.reliable.stop_timers();
        self.queued_output.clear();
        self.phase = Phase::Failed;
        debug!("Connection failed: {}", error);
        error
    }

    fn process_record(&mut self, record: DtlsRecord) -> Result<(), Error> {
        match record.content_type {
            ContentType::Handshake => self.process_handshake(&record),
            ContentType::ChangeCipherSpec => {
                if record.fragment != [1] {
                    warn!("Dropping malformed change_cipher_spec");
                    return Ok(());
                }
                if !self.handshake.expects_change_cipher_spec() {
                    // Early or repeated; a retransmission brings it again.
                    trace!("Dropping change_cipher_spec in {:?}", self.handshake.state());
                    return Ok(());
                }
                self.handshake.handle_change_cipher_spec(&mut self.reliable)
            }
            ContentType::Alert => self.process_alert(&record.fragment),
            ContentType::ApplicationData => {
                if self.phase == Phase::Connected {
                    self.application_input.push_back(record.fragment);
                } else {
                    trace!("Dropping application data before the handshake completed");
                }
                Ok(())
            }
            other => {
                trace!("Dropping {:?} record", other);
                Ok(())
            }
        }
    }

    fn process_alert(&mut self, fragment: &[u8]) -> Result<(), Error> {
        let alert = match Alert::decode(fragment) {
            Ok(alert) => alert,
            Err(e) => {
                warn!("Dropping alert: {}", e);
                return Ok(());
            }
        };
        if alert.description == AlertDescription::CloseNotify {
            debug!("Received close_notify");
            self.phase = Phase::Closed;
            self.reliable.stop_timers();
            if !self.close_sent {
                self.close_sent = true;
                self.reliable
                    .send_alert(Alert::warning(AlertDescription::CloseNotify))?;
            }
            return Ok(());
        }
        if alert.is_fatal() {
            return Err(Error::PeerAlert(alert.description));
        }
        warn!("Received warning alert {:?}", alert.description);
        Ok(())
    }

    fn process_handshake(&mut self, record: &DtlsRecord) -> Result<(), Error> {
        let mut input = &record.fragment[..];
        while !input.is_empty() {
            let Ok((rest, header)) = HandshakeHeader::parse_dtls(input) else {
                warn!("Dropping {} bytes of malformed handshake", input.len());
                break;
            };
            let fragment_length = header.fragment_length as usize;
            let in_bounds = (header.fragment_offset as usize + fragment_length)
                <= header.length as usize;
            if rest.len() < fragment_length || !in_bounds {
                warn!("Dropping malformed {:?} fragment", header.msg_type);
                break;
            }
            let (fragment, tail) = rest.split_at(fragment_length);
            input = tail;
            self.reliable
                .receive_fragment(record.epoch, &header, fragment)?;
        }
        self.deliver_messages()
    }

    fn deliver_messages(&mut self) -> Result<(), Error> {
        while let Some(message) = self.reliable.next_message() {
            if self.cookie_secret.is_some() && !self.verify_cookie(&message)? {
                continue;
            }
            if self.phase != Phase::Handshaking {
                self.process_post_handshake(message)?;
                continue;
            }
            if !self.is_client && !self.started {
                // Our flights continue the numbering of the ClientHello.
                self.started = true;
                self.reliable.set_next_send_seq(message.message_seq);
                self.reliable.start_connect_timer();
            }
            self.handshake.handle_message(&mut self.reliable, &message)?;
            if self.handshake.is_complete() {
                self.on_complete()?;
            }
        }
        Ok(())
    }

    fn cookie_for(&self, secret: &[u8; 32], hello: &ClientHello) -> Result<[u8; 32], Error> {
        let mut data = Vec::with_capacity(64 + 2 * hello.cipher_suites.len());
        data.extend_from_slice(hello.random.as_bytes());
        data.extend_from_slice(hello.session_id.as_slice());
        for suite in &hello.cipher_suites {
            data.extend_from_slice(&suite.as_u16().to_be_bytes());
        }
        self.config
            .crypto_provider()
            .hmac_provider
            .hmac_sha256(secret, &data)
            .map_err(Error::CryptoError)
    }

    /// Answer a ClientHello without a valid cookie with a
    /// HelloVerifyRequest. Returns whether the hello may go on to the
    /// handshake.
    fn verify_cookie(&mut self, message: &HandshakeMessage) -> Result<bool, Error> {
        let Some(secret) = self.cookie_secret else {
            return Ok(true);
        };
        if message.msg_type != MessageType::ClientHello {
            self.reliable.reset_receive();
            return Ok(false);
        }
        let hello = match ClientHello::decode(&message.body, true) {
            Ok(hello) => hello,
            Err(e) => {
                warn!("Dropping ClientHello: {}", e);
                self.reliable.reset_receive();
                return Ok(false);
            }
        };
        let expected = self.cookie_for(&secret, &hello)?;
        let valid = hello
            .cookie
            .as_ref()
            .map(|c| bool::from(c.as_slice().ct_eq(&expected)))
            .unwrap_or(false);
        if valid {
            debug!("Cookie verified");
            self.cookie_secret = None;
            self.reliable.set_stateless(false);
            return Ok(true);
        }

        // Keep no state for an unverified client.
        self.reliable.reset_receive();
        debug!("Sending HelloVerifyRequest");
        let mut body = Vec::new();
        HelloVerifyRequest::new(Cookie::try_new(&expected)?).serialize(&mut body);
        let mut request = HandshakeMessage::new(MessageType::HelloVerifyRequest, body)?;
        request.message_seq = message.message_seq;
        self.reliable.send_hello_verify_request(&request)?;
        Ok(false)
    }

    fn on_complete(&mut self) -> Result<(), Error> {
        let negotiated = self.handshake.negotiated();
        debug!(
            "Handshake complete: {:?} {:?} resumed={}",
            negotiated.version, negotiated.cipher_suite, negotiated.resumed
        );
        let has_peer_cert = negotiated
            .peer_certificate
            .as_ref()
            .map(|c| c.end_entity().is_some())
            .unwrap_or(false);
        self.phase = Phase::Connected;
        self.events.push_back(LocalEvent::Connected);
        if has_peer_cert {
            self.events.push_back(LocalEvent::PeerCert);
        }
        while let Some(data) = self.queued_output.pop_front() {
            self.reliable.send_application_data(&data)?;
        }
        Ok(())
    }

    fn process_post_handshake(&mut self, message: HandshakeMessage) -> Result<(), Error> {
        match message.msg_type {
            MessageType::HelloRequest if self.is_client => {
                debug!("Refusing renegotiation");
                self.reliable
                    .send_alert(Alert::warning(AlertDescription::NoRenegotiation))
            }
            MessageType::ClientHello if !self.is_client => {
                debug!("Refusing renegotiation");
                self.reliable
                    .send_alert(Alert::warning(AlertDescription::NoRenegotiation))
            }
            other => Err(Error::UnexpectedMessage(format!(
                "{:?} after the handshake",
                other
            ))),
        }
    }
}

/// Copy `data` into the caller's buffer.
///
/// Panics if the buffer is too small, which is a caller error: it must hold
/// at least one MTU.
fn copy_into<'a>(buf: &'a mut [u8], data: &[u8], what: &str) -> &'a [u8] {
    assert!(
        data.len() <= buf.len(),
        "Output buffer too small for {} {} > {}",
        what,
        data.len(),
        buf.len()
    );
    buf[..data.len()].copy_from_slice(data);
    &buf[..data.len()]
}

impl std::fmt::Debug for DtlsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DtlsConnection")
            .field("is_client", &self.is_client)
            .field("phase", &self.phase)
            .field("state", &self.handshake.state())
            .field("reliable", &self.reliable)
            .finish()
    }
}
