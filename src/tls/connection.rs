use std::collections::VecDeque;
use std::sync::Arc;

use crate::alert::{Alert, AlertDescription};
use crate::buffer::ByteQueue;
use crate::crypto::prf::CipherPair;
use crate::crypto::record_cipher::RecordCipher;
use crate::handshake::{ConnectionState, Handshake, HandshakeIo, Negotiated};
use crate::message::{
    HandshakeMessage, KeyUpdate, NewSessionTicket, MAX_HANDSHAKE_LEN, TLS_HANDSHAKE_HEADER_LEN,
};
use crate::record::{Record, RecordStream};
use crate::session::Session;
use crate::types::{ContentType, MessageType, ProtocolVersion};
use crate::Error;

/// The transport side of a stream connection: record protection and the
/// bytes waiting to be sent.
struct StreamIo {
    record: RecordStream,
    output: ByteQueue,
    /// A cipher change happened while processing the current record.
    read_changed: bool,
}

impl StreamIo {
    fn new() -> Self {
        let mut record = RecordStream::new();
        // Hellos and early alerts go out as TLS 1.0 records.
        record.set_write_version(ProtocolVersion::TLSV1_0);
        StreamIo {
            record,
            output: ByteQueue::new(),
            read_changed: false,
        }
    }

    fn write(&mut self, content_type: ContentType, payload: &[u8]) -> Result<(), Error> {
        let bytes = self.record.encode(content_type, payload)?;
        self.output.add_data(&bytes);
        Ok(())
    }

    fn send_alert(&mut self, alert: Alert) -> Result<(), Error> {
        let mut body = Vec::with_capacity(2);
        alert.serialize(&mut body);
        self.write(ContentType::Alert, &body)
    }
}

impl HandshakeIo for StreamIo {
    fn is_datagram(&self) -> bool {
        false
    }

    fn send_message(&mut self, message: &mut HandshakeMessage) -> Result<(), Error> {
        self.write(ContentType::Handshake, &message.tls_encoding())
    }

    fn send_change_cipher_spec(&mut self) -> Result<(), Error> {
        self.write(ContentType::ChangeCipherSpec, &[1])
    }

    fn set_pending_cipher(&mut self, ciphers: CipherPair) {
        self.record.set_pending_cipher(ciphers.read, ciphers.write);
    }

    fn enable_pending_write(&mut self) -> Result<(), Error> {
        self.record.enable_pending_write()
    }

    fn enable_pending_read(&mut self) -> Result<(), Error> {
        self.record.notify_change_cipher_spec_received()?;
        self.read_changed = true;
        Ok(())
    }

    fn install_tls13_read(&mut self, cipher: Box<dyn RecordCipher>) -> Result<(), Error> {
        self.record.install_read(cipher, true);
        self.read_changed = true;
        Ok(())
    }

    fn install_tls13_write(&mut self, cipher: Box<dyn RecordCipher>) -> Result<(), Error> {
        self.record.install_write(cipher);
        Ok(())
    }

    fn set_record_version(&mut self, version: ProtocolVersion) {
        self.record.set_read_version(version);
        if version.is_tls13() {
            // TLS 1.3 records carry the 1.2 version on the wire.
            self.record.set_write_version(ProtocolVersion::TLSV1_2);
            self.record.set_ignore_change_cipher_spec(true);
        } else {
            self.record.set_write_version(version);
        }
    }

    fn set_plaintext_limit(&mut self, limit: usize) {
        self.record.set_plaintext_limit(limit);
    }

    fn end_flight(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn handshake_complete(&mut self) {
        self.record.set_ignore_change_cipher_spec(false);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Handshaking,
    Connected,
    /// close_notify received.
    Closed,
    Failed,
}

/// One stream connection: drives a handshake machine from received bytes
/// and carries application data once it completes.
pub(crate) struct Connection {
    handshake: Box<dyn Handshake + Send>,
    io: StreamIo,
    is_client: bool,
    phase: Phase,
    input: ByteQueue,
    /// Handshake bytes not yet forming a whole message.
    handshake_input: ByteQueue,
    application_input: ByteQueue,
    /// Written before the handshake completed.
    queued_output: VecDeque<Vec<u8>>,
    close_sent: bool,
    received_tickets: Vec<NewSessionTicket>,
}

impl Connection {
    pub fn new(handshake: Box<dyn Handshake + Send>, is_client: bool) -> Self {
        Connection {
            handshake,
            io: StreamIo::new(),
            is_client,
            phase: Phase::Handshaking,
            input: ByteQueue::new(),
            handshake_input: ByteQueue::new(),
            application_input: ByteQueue::new(),
            queued_output: VecDeque::new(),
            close_sent: false,
            received_tickets: Vec::new(),
        }
    }

    pub fn start(&mut self) -> Result<(), Error> {
        let result = self.handshake.start(&mut self.io);
        self.check(result)
    }

    pub fn offer_input(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.phase == Phase::Failed {
            return Err(Error::Closed);
        }
        if self.phase == Phase::Closed {
            trace!("Ignoring {} bytes after close_notify", data.len());
            return Ok(());
        }
        self.input.add_data(data);
        loop {
            let record = match self.io.record.try_decode(&mut self.input) {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => return Err(self.fail(e)),
            };
            let result = self.process_record(record);
            self.check(result)?;
            if self.phase == Phase::Closed {
                break;
            }
        }
        self.input.shrink();
        Ok(())
    }

    /// Copy pending output into `buf`, returning the number of bytes.
    pub fn read_output(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.io.output.available());
        self.io.output.remove_into(&mut buf[..n], 0);
        n
    }

    pub fn available_output_bytes(&self) -> usize {
        self.io.output.available()
    }

    pub fn read_application_data(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.application_input.available());
        self.application_input.remove_into(&mut buf[..n], 0);
        n
    }

    pub fn available_input_bytes(&self) -> usize {
        self.application_input.available()
    }

    pub fn write_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        match self.phase {
            Phase::Failed | Phase::Closed => return Err(Error::Closed),
            Phase::Handshaking => {
                self.queued_output.push_back(data.to_vec());
                return Ok(());
            }
            Phase::Connected => {}
        }
        if self.close_sent {
            return Err(Error::Closed);
        }
        let result = self.io.write(ContentType::ApplicationData, data);
        self.check(result)
    }

    /// Send close_notify. Reading continues until the peer closes.
    pub fn close(&mut self) -> Result<(), Error> {
        if self.phase == Phase::Failed {
            return Err(Error::Closed);
        }
        if self.close_sent {
            return Ok(());
        }
        debug!("Sending close_notify");
        self.close_sent = true;
        let result = self.io.send_alert(Alert::warning(AlertDescription::CloseNotify));
        self.check(result)
    }

    pub fn is_handshaking(&self) -> bool {
        self.phase == Phase::Handshaking
    }

    pub fn is_connected(&self) -> bool {
        self.phase == Phase::Connected
    }

    /// The peer closed or the connection failed.
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

    pub fn received_tickets(&self) -> &[NewSessionTicket] {
        &self.received_tickets
    }

    fn is_tls13(&self) -> bool {
        self.negotiated()
            .version
            .map(|v| v.is_tls13())
            .unwrap_or(false)
    }

    fn require_tls13_connected(&self, what: &str) -> Result<(), Error> {
        if self.phase != Phase::Connected || !self.is_tls13() {
            return Err(Error::InternalError(format!(
                "{} needs a connected TLS 1.3 session",
                what
            )));
        }
        Ok(())
    }

    /// Move our write side to the next traffic secret, optionally asking
    /// the peer to do the same.
    pub fn request_key_update(&mut self, update_requested: bool) -> Result<(), Error> {
        self.require_tls13_connected("KeyUpdate")?;
        let result = self.send_key_update(KeyUpdate::new(update_requested));
        self.check(result)
    }

    fn send_key_update(&mut self, update: KeyUpdate) -> Result<(), Error> {
        debug!("Sending KeyUpdate {:?}", update);
        let mut body = Vec::with_capacity(1);
        update.serialize(&mut body);
        let mut message = HandshakeMessage::new(MessageType::KeyUpdate, body)?;
        self.io.send_message(&mut message)?;
        self.io.record.key_update_write()
    }

    pub fn send_new_session_ticket(&mut self, ticket: &NewSessionTicket) -> Result<(), Error> {
        if self.is_client {
            return Err(Error::InternalError(
                "only a server sends NewSessionTicket".into(),
            ));
        }
        self.require_tls13_connected("NewSessionTicket")?;
        let mut body = Vec::new();
        ticket.serialize(&mut body)?;
        let result = HandshakeMessage::new(MessageType::NewSessionTicket, body)
            .and_then(|mut message| self.io.send_message(&mut message));
        self.check(result)
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
            if let Err(e) = self.io.send_alert(Alert::fatal(description)) {
                debug!("Could not send {:?} alert: {}", description, e);
            }
        }
        self.handshake.abort();
        self.handshake_input = ByteQueue::new();
        self.queued_output.clear();
        self.phase = Phase::Failed;
        debug!("Connection failed: {}", error);
        error
    }

    fn process_record(&mut self, record: Record) -> Result<(), Error> {
        if record.content_type != ContentType::Handshake && !self.handshake_input.is_empty() {
            return Err(Error::UnexpectedMessage(format!(
                "{:?} record inside a fragmented handshake message",
                record.content_type
            )));
        }
        match record.content_type {
            ContentType::Alert => self.process_alert(&record.fragment),
            ContentType::ChangeCipherSpec => {
                if record.fragment != [1] {
                    return Err(Error::DecodeError("change_cipher_spec payload".into()));
                }
                self.handshake.handle_change_cipher_spec(&mut self.io)
            }
            ContentType::Handshake => self.process_handshake(&record.fragment),
            ContentType::ApplicationData => {
                if self.phase != Phase::Connected {
                    return Err(Error::UnexpectedMessage(
                        "application data before the handshake completed".into(),
                    ));
                }
                self.application_input.add_data(&record.fragment);
                Ok(())
            }
            other => Err(Error::UnexpectedMessage(format!("{:?} record", other))),
        }
    }

    fn process_alert(&mut self, fragment: &[u8]) -> Result<(), Error> {
        let alert = Alert::decode(fragment)?;
        if alert.description == AlertDescription::CloseNotify {
            debug!("Received close_notify");
            self.phase = Phase::Closed;
            if !self.close_sent {
                self.close_sent = true;
                self.io
                    .send_alert(Alert::warning(AlertDescription::CloseNotify))?;
            }
            return Ok(());
        }
        // TLS 1.3 treats every alert but user_canceled as fatal.
        let fatal = alert.is_fatal()
            || (self.is_tls13() && alert.description != AlertDescription::UserCanceled);
        if fatal {
            return Err(Error::PeerAlert(alert.description));
        }
        warn!("Received warning alert {:?}", alert.description);
        Ok(())
    }

    fn process_handshake(&mut self, fragment: &[u8]) -> Result<(), Error> {
        self.handshake_input.add_data(fragment);
        self.io.read_changed = false;
        loop {
            let available = self.handshake_input.available();
            if available < TLS_HANDSHAKE_HEADER_LEN {
                break;
            }
            let length = self.handshake_input.read_u24(1) as usize;
            if length > MAX_HANDSHAKE_LEN {
                return Err(Error::DecodeError(format!(
                    "handshake message of {} bytes",
                    length
                )));
            }
            if available < TLS_HANDSHAKE_HEADER_LEN + length {
                break;
            }
            if self.io.read_changed {
                return Err(Error::UnexpectedMessage(
                    "handshake message spans a key change".into(),
                ));
            }
            let msg_type = MessageType::from_u8(self.handshake_input.read_u8(0));
            let body = self
                .handshake_input
                .remove_data(length, TLS_HANDSHAKE_HEADER_LEN);
            let message = HandshakeMessage::new(msg_type, body)?;
            self.process_message(message)?;
        }
        if self.io.read_changed && !self.handshake_input.is_empty() {
            return Err(Error::UnexpectedMessage(
                "handshake message spans a key change".into(),
            ));
        }
        self.handshake_input.shrink();
        Ok(())
    }

    fn process_message(&mut self, message: HandshakeMessage) -> Result<(), Error> {
        if self.phase != Phase::Handshaking {
            return self.process_post_handshake(message);
        }
        self.handshake.handle_message(&mut self.io, &message)?;
        if self.handshake.is_complete() {
            self.on_complete()?;
        }
        Ok(())
    }

    fn on_complete(&mut self) -> Result<(), Error> {
        let negotiated = self.handshake.negotiated();
        debug!(
            "Handshake complete: {:?} {:?} resumed={}",
            negotiated.version, negotiated.cipher_suite, negotiated.resumed
        );
        self.phase = Phase::Connected;
        while let Some(data) = self.queued_output.pop_front() {
            self.io.write(ContentType::ApplicationData, &data)?;
        }
        Ok(())
    }

    fn process_post_handshake(&mut self, message: HandshakeMessage) -> Result<(), Error> {
        let tls13 = self.is_tls13();
        match message.msg_type {
            MessageType::HelloRequest if self.is_client && !tls13 => {
                if !message.body.is_empty() {
                    return Err(Error::DecodeError("HelloRequest body".into()));
                }
                debug!("Refusing renegotiation");
                self.io
                    .send_alert(Alert::warning(AlertDescription::NoRenegotiation))
            }
            MessageType::ClientHello if !self.is_client && !tls13 => {
                debug!("Refusing renegotiation");
                self.io
                    .send_alert(Alert::warning(AlertDescription::NoRenegotiation))
            }
            MessageType::NewSessionTicket if self.is_client && tls13 => {
                let ticket = NewSessionTicket::decode(&message.body)?;
                debug!("Received NewSessionTicket, lifetime {}s", ticket.lifetime);
                self.received_tickets.push(ticket);
                Ok(())
            }
            MessageType::KeyUpdate if tls13 => {
                let update = KeyUpdate::decode(&message.body)?;
                debug!("Received KeyUpdate {:?}", update);
                self.io.record.key_update_read()?;
                if update == KeyUpdate::UpdateRequested {
                    self.send_key_update(KeyUpdate::UpdateNotRequested)?;
                }
                Ok(())
            }
            other => Err(Error::UnexpectedMessage(format!(
                "{:?} after the handshake",
                other
            ))),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("is_client", &self.is_client)
            .field("phase", &self.phase)
            .field("state", &self.handshake.state())
            .field("record", &self.io.record)
            .finish()
    }
}
