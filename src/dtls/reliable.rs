use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::alert::Alert;
use crate::config::Config;
use crate::crypto::prf::CipherPair;
use crate::crypto::record_cipher::RecordCipher;
use crate::dtls::reassembler::DtlsReassembler;
use crate::handshake::HandshakeIo;
use crate::message::{
    HandshakeHeader, HandshakeMessage, DTLS_HANDSHAKE_HEADER_LEN, MAX_HANDSHAKE_LEN,
};
use crate::record::{DtlsRecord, DtlsRecordLayer};
use crate::rng::SeededRng;
use crate::timer::{ExponentialBackoff, Timeout};
use crate::types::{ContentType, MessageType, ProtocolVersion};
use crate::Error;

/// How far ahead of the next expected message_seq fragments are buffered.
const MAX_FUTURE_MESSAGES: u16 = 16;

const DISTANT_FUTURE: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
enum FlightItem {
    Message { message: HandshakeMessage, epoch: u16 },
    ChangeCipherSpec { epoch: u16 },
}

/// Runs a handshake over an unreliable datagram transport (RFC 6347 4.2.4).
///
/// Outbound messages are numbered, fragmented to the MTU and kept per
/// flight, each tagged with the epoch it was first sent in, so the whole
/// flight can be sent again when the timer fires or the peer repeats its
/// previous flight. Inbound fragments are reassembled per message_seq and
/// released in order.
pub(crate) struct DtlsReliableHandshake {
    record: DtlsRecordLayer,
    rng: SeededRng,

    next_send_seq: u16,
    flight: Vec<FlightItem>,
    flight_no: usize,
    /// A flight is being built.
    sending: bool,
    /// Our flight is the latest one in the exchange.
    last_flight_ours: bool,

    next_receive_seq: u16,
    inbound: BTreeMap<u16, DtlsReassembler>,
    /// Messages released since our last flight.
    delivered: BTreeMap<u16, DtlsReassembler>,
    /// The peer flight our current flight answers.
    previous_inbound: BTreeMap<u16, DtlsReassembler>,
    /// Accept a ClientHello of any message_seq, without keeping state.
    stateless: bool,

    backoff: ExponentialBackoff,
    flight_timeout: Timeout,
    connect_timeout: Timeout,
    handshake_timeout: Duration,
    last_now: Option<Instant>,
}

impl DtlsReliableHandshake {
    pub fn new(config: &Config, mtu: usize) -> Self {
        let mut rng = SeededRng::new(config.rng_seed());
        let backoff =
            ExponentialBackoff::new(config.flight_start_rto(), config.flight_retries(), &mut rng);
        let mut record = DtlsRecordLayer::new(mtu);
        // Hellos and early alerts go out as DTLS 1.0 records.
        record.set_write_version(ProtocolVersion::DTLSV1_0);
        DtlsReliableHandshake {
            record,
            rng,
            next_send_seq: 0,
            flight: Vec::new(),
            flight_no: 0,
            sending: false,
            last_flight_ours: false,
            next_receive_seq: 0,
            inbound: BTreeMap::new(),
            delivered: BTreeMap::new(),
            previous_inbound: BTreeMap::new(),
            stateless: false,
            backoff,
            flight_timeout: Timeout::Disabled,
            connect_timeout: Timeout::Disabled,
            handshake_timeout: config.handshake_timeout(),
            last_now: None,
        }
    }

    pub fn rng(&mut self) -> &mut SeededRng {
        &mut self.rng
    }

    pub fn set_stateless(&mut self, stateless: bool) {
        self.stateless = stateless;
    }

    /// Number our messages from `seq` on. A server answers a ClientHello
    /// with the same message_seq.
    pub fn set_next_send_seq(&mut self, seq: u16) {
        self.next_send_seq = seq;
    }

    /// Forget every inbound fragment.
    pub fn reset_receive(&mut self) {
        self.inbound.clear();
        self.delivered.clear();
    }

    /// Arm the overall handshake deadline at the next `handle_timeout`.
    pub fn start_connect_timer(&mut self) {
        if self.connect_timeout == Timeout::Disabled {
            self.connect_timeout = Timeout::Unarmed;
        }
    }

    pub fn stop_timers(&mut self) {
        debug!("Stop connect and flight timeouts");
        self.flight_timeout = Timeout::Disabled;
        self.connect_timeout = Timeout::Disabled;
    }

    pub fn decode_next<'a>(&mut self, input: &'a [u8]) -> (Option<DtlsRecord>, &'a [u8]) {
        self.record.decode_next(input)
    }

    pub fn poll_datagram(&mut self) -> Option<Vec<u8>> {
        self.record.poll_datagram()
    }

    pub fn send_alert(&mut self, alert: Alert) -> Result<(), Error> {
        let mut body = Vec::with_capacity(2);
        alert.serialize(&mut body);
        let epoch = self.record.write_epoch();
        self.record.send_record(ContentType::Alert, epoch, &body)?;
        self.record.flush();
        Ok(())
    }

    /// One application data record in its own datagram.
    pub fn send_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        let epoch = self.record.write_epoch();
        let limit = self.record.max_fragment(epoch);
        if data.len() > limit {
            return Err(Error::InternalError(format!(
                "{} bytes of application data do not fit a {} byte record",
                data.len(),
                limit
            )));
        }
        self.record
            .send_record(ContentType::ApplicationData, epoch, data)?;
        self.record.flush();
        Ok(())
    }

    /// Answer a ClientHello without keeping any state for it.
    pub fn send_hello_verify_request(&mut self, message: &HandshakeMessage) -> Result<(), Error> {
        self.record
            .send_record(ContentType::Handshake, 0, &message.dtls_encoding())?;
        self.record.flush();
        Ok(())
    }

    /// Add one handshake fragment received in `epoch`.
    pub fn receive_fragment(
        &mut self,
        epoch: u16,
        header: &HandshakeHeader,
        fragment: &[u8],
    ) -> Result<(), Error> {
        let length = header.length as usize;
        if length > MAX_HANDSHAKE_LEN {
            warn!("Dropping {:?} of {} bytes", header.msg_type, length);
            return Ok(());
        }
        let seq = header.message_seq;

        if self.stateless {
            if header.msg_type != MessageType::ClientHello {
                trace!("Dropping {:?} before cookie exchange", header.msg_type);
                return Ok(());
            }
            if seq != self.next_receive_seq {
                self.inbound.clear();
                self.next_receive_seq = seq;
            }
        }

        // Older epochs and sequence numbers can only repeat a past flight.
        if epoch != self.record.read_epoch() || seq < self.next_receive_seq {
            return self.check_retransmission(header, fragment);
        }
        if seq - self.next_receive_seq > MAX_FUTURE_MESSAGES {
            trace!("Dropping message_seq {} too far ahead", seq);
            return Ok(());
        }
        trace!(
            "Fragment {:?} seq={} offset={} len={}",
            header.msg_type,
            seq,
            header.fragment_offset,
            fragment.len()
        );
        self.inbound
            .entry(seq)
            .or_insert_with(|| DtlsReassembler::new(header.msg_type, length))
            .contribute_fragment(
                header.msg_type,
                length,
                fragment,
                header.fragment_offset as usize,
            );
        Ok(())
    }

    fn check_retransmission(
        &mut self,
        header: &HandshakeHeader,
        fragment: &[u8],
    ) -> Result<(), Error> {
        let Some(reassembler) = self.previous_inbound.get_mut(&header.message_seq) else {
            trace!("Dropping stale message_seq {}", header.message_seq);
            return Ok(());
        };
        reassembler.contribute_fragment(
            header.msg_type,
            header.length as usize,
            fragment,
            header.fragment_offset as usize,
        );
        if !self.previous_inbound.values().all(|r| r.is_complete()) {
            return Ok(());
        }
        for reassembler in self.previous_inbound.values_mut() {
            reassembler.reset();
        }
        if self.flight.is_empty() {
            return Ok(());
        }
        self.resend_flight("peer retransmission")
    }

    /// The next complete message in sequence.
    pub fn next_message(&mut self) -> Option<HandshakeMessage> {
        let seq = self.next_receive_seq;
        if !self.inbound.get(&seq)?.is_complete() {
            return None;
        }
        let mut reassembler = self.inbound.remove(&seq)?;
        let message = HandshakeMessage {
            msg_type: reassembler.msg_type(),
            message_seq: seq,
            body: reassembler.body_if_complete()?.to_vec(),
        };
        reassembler.reset();
        self.delivered.insert(seq, reassembler);
        self.next_receive_seq = seq.wrapping_add(1);
        self.last_flight_ours = false;
        Some(message)
    }

    fn begin_flight(&mut self) {
        self.flight_no += 1;
        debug!("Begin flight {}", self.flight_no);
        self.flight.clear();
        self.previous_inbound = std::mem::take(&mut self.delivered);
        self.backoff.reset(&mut self.rng);
        self.flight_timeout = Timeout::Unarmed;
        self.sending = true;
    }

    fn write_message(&mut self, message: &HandshakeMessage, epoch: u16) -> Result<(), Error> {
        let max = self
            .record
            .max_fragment(epoch)
            .saturating_sub(DTLS_HANDSHAKE_HEADER_LEN)
            .max(1);
        let len = message.body.len();
        if len == 0 {
            return self
                .record
                .send_record(ContentType::Handshake, epoch, &message.dtls_fragment(0, 0));
        }
        let mut offset = 0;
        while offset < len {
            let n = max.min(len - offset);
            self.record.send_record(
                ContentType::Handshake,
                epoch,
                &message.dtls_fragment(offset, n),
            )?;
            offset += n;
        }
        Ok(())
    }

    fn resend_flight(&mut self, reason: &str) -> Result<(), Error> {
        debug!("Resending flight due to {}", reason);
        let flight = std::mem::take(&mut self.flight);
        let result = flight.iter().try_for_each(|item| match item {
            FlightItem::Message { message, epoch } => self.write_message(message, *epoch),
            FlightItem::ChangeCipherSpec { epoch } => {
                self.record
                    .send_record(ContentType::ChangeCipherSpec, *epoch, &[1])
            }
        });
        self.flight = flight;
        self.record.flush();
        result
    }

    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        self.last_now = Some(now);
        if self.connect_timeout == Timeout::Unarmed {
            debug!(
                "Connect timeout in: {:.03}s",
                self.handshake_timeout.as_secs_f32()
            );
            self.connect_timeout = Timeout::Armed(now + self.handshake_timeout);
        }
        if self.flight_timeout == Timeout::Unarmed {
            debug!("Flight timeout in: {:.03}s", self.backoff.rto().as_secs_f32());
            self.flight_timeout = Timeout::Armed(now + self.backoff.rto());
        }

        if self.connect_timeout.is_expired(now) {
            return Err(Error::Timeout("connect"));
        }
        if self.flight_timeout.is_expired(now) {
            if !self.backoff.can_retry() {
                return Err(Error::Timeout("handshake"));
            }
            self.backoff.attempt(&mut self.rng);
            debug!(
                "Re-arm flight timeout due to resend in {}",
                self.backoff.rto().as_secs_f32()
            );
            self.flight_timeout = Timeout::Armed(now + self.backoff.rto());
            self.resend_flight("flight timeout")?;
        }
        Ok(())
    }

    /// When `handle_timeout` wants to be called next.
    pub fn poll_timeout(&self) -> Instant {
        let now = self.last_now.unwrap_or_else(Instant::now);
        if self.connect_timeout == Timeout::Unarmed || self.flight_timeout == Timeout::Unarmed {
            return now;
        }
        match (self.connect_timeout.instant(), self.flight_timeout.instant()) {
            (Some(c), Some(f)) => c.min(f),
            (Some(c), None) => c,
            (None, Some(f)) => f,
            (None, None) => now + DISTANT_FUTURE,
        }
    }
}

impl HandshakeIo for DtlsReliableHandshake {
    fn is_datagram(&self) -> bool {
        true
    }

    fn send_message(&mut self, message: &mut HandshakeMessage) -> Result<(), Error> {
        if !self.sending {
            self.begin_flight();
        }
        message.message_seq = self.next_send_seq;
        self.next_send_seq = self
            .next_send_seq
            .checked_add(1)
            .ok_or_else(|| Error::InternalError("message_seq exhausted".into()))?;
        let epoch = self.record.write_epoch();
        self.write_message(message, epoch)?;
        self.flight.push(FlightItem::Message {
            message: message.clone(),
            epoch,
        });
        Ok(())
    }

    fn send_change_cipher_spec(&mut self) -> Result<(), Error> {
        if !self.sending {
            self.begin_flight();
        }
        let epoch = self.record.write_epoch();
        self.record
            .send_record(ContentType::ChangeCipherSpec, epoch, &[1])?;
        self.flight.push(FlightItem::ChangeCipherSpec { epoch });
        Ok(())
    }

    fn set_pending_cipher(&mut self, ciphers: CipherPair) {
        self.record.set_pending_cipher(ciphers.read, ciphers.write);
    }

    fn enable_pending_write(&mut self) -> Result<(), Error> {
        self.record.enable_pending_write()
    }

    fn enable_pending_read(&mut self) -> Result<(), Error> {
        self.record.enable_pending_read()
    }

    fn install_tls13_read(&mut self, _cipher: Box<dyn RecordCipher>) -> Result<(), Error> {
        Err(Error::InternalError("TLS 1.3 over datagrams".into()))
    }

    fn install_tls13_write(&mut self, _cipher: Box<dyn RecordCipher>) -> Result<(), Error> {
        Err(Error::InternalError("TLS 1.3 over datagrams".into()))
    }

    fn set_record_version(&mut self, version: ProtocolVersion) {
        self.record.set_read_version(version);
        self.record.set_write_version(version);
    }

    fn set_plaintext_limit(&mut self, limit: usize) {
        self.record.set_plaintext_limit(limit);
    }

    fn end_flight(&mut self) -> Result<(), Error> {
        self.record.flush();
        self.sending = false;
        self.last_flight_ours = true;
        trace!("Flight {} of {} items sent", self.flight_no, self.flight.len());
        Ok(())
    }

    fn handshake_complete(&mut self) {
        self.stop_timers();
        if !self.last_flight_ours {
            // The peer sent the final flight; nothing of ours to repeat.
            self.flight.clear();
        }
    }
}

impl std::fmt::Debug for DtlsReliableHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DtlsReliableHandshake")
            .field("record", &self.record)
            .field("next_send_seq", &self.next_send_seq)
            .field("next_receive_seq", &self.next_receive_seq)
            .field("flight_no", &self.flight_no)
            .field("flight_len", &self.flight.len())
            .field("flight_timeout", &self.flight_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[cfg(all(test, feature = "rust-crypto"))]
mod tests {
    use super::*;
    use crate::crypto::rust_crypto::default_provider;

    fn config() -> Config {
        Config::builder()
            .with_crypto_provider(default_provider())
            .mtu(200)
            .rng_seed(3)
            .build()
            .unwrap()
    }

    fn message(msg_type: MessageType, len: usize) -> HandshakeMessage {
        HandshakeMessage::new(msg_type, (0..len).map(|i| i as u8).collect()).unwrap()
    }

    /// Split datagrams into their handshake fragments.
    fn fragments(datagrams: &[Vec<u8>]) -> Vec<(HandshakeHeader, Vec<u8>)> {
        let mut receiver = DtlsRecordLayer::new(200);
        let mut out = Vec::new();
        for datagram in datagrams {
            let mut rest = &datagram[..];
            while !rest.is_empty() {
                let (record, tail) = receiver.decode_next(rest);
                rest = tail;
                let record = record.unwrap();
                let (body, header) = HandshakeHeader::parse_dtls(&record.fragment).unwrap();
                out.push((header, body.to_vec()));
            }
        }
        out
    }

    fn drain(reliable: &mut DtlsReliableHandshake) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| reliable.poll_datagram()).collect()
    }

    #[test]
    fn messages_are_numbered_and_fragmented() {
        let config = config();
        let mut reliable = DtlsReliableHandshake::new(&config, config.mtu());
        let mut first = message(MessageType::Certificate, 500);
        let mut second = message(MessageType::ServerHelloDone, 0);
        reliable.send_message(&mut first).unwrap();
        reliable.send_message(&mut second).unwrap();
        reliable.end_flight().unwrap();
        assert_eq!(first.message_seq, 0);
        assert_eq!(second.message_seq, 1);

        let datagrams = drain(&mut reliable);
        assert!(datagrams.len() > 2);
        assert!(datagrams.iter().all(|d| d.len() <= 200));

        // Feed every fragment to a receiver, last first.
        let mut peer = DtlsReliableHandshake::new(&config, config.mtu());
        for (header, body) in fragments(&datagrams).iter().rev() {
            peer.receive_fragment(0, header, body).unwrap();
        }
        assert_eq!(peer.next_message(), Some(first));
        assert_eq!(peer.next_message(), Some(second));
        assert_eq!(peer.next_message(), None);
    }

    #[test]
    fn flight_resent_on_timeout_until_retries_spent() {
        let config = config();
        let mut reliable = DtlsReliableHandshake::new(&config, config.mtu());
        reliable.start_connect_timer();
        reliable
            .send_message(&mut message(MessageType::ClientHello, 50))
            .unwrap();
        reliable.end_flight().unwrap();
        let original = drain(&mut reliable);

        let mut now = Instant::now();
        reliable.handle_timeout(now).unwrap();
        assert!(drain(&mut reliable).is_empty());

        let mut resends = 0;
        loop {
            now = reliable.poll_timeout();
            match reliable.handle_timeout(now) {
                Ok(()) => {
                    let again = drain(&mut reliable);
                    assert_eq!(fragments(&again).len(), fragments(&original).len());
                    resends += 1;
                }
                Err(e) => {
                    assert!(matches!(e, Error::Timeout(_)));
                    break;
                }
            }
        }
        assert_eq!(resends, config.flight_retries());
    }

    #[test]
    fn repeated_peer_flight_triggers_resend() {
        let config = config();
        let mut server = DtlsReliableHandshake::new(&config, config.mtu());
        let mut client = DtlsReliableHandshake::new(&config, config.mtu());

        client
            .send_message(&mut message(MessageType::ClientHello, 60))
            .unwrap();
        client.end_flight().unwrap();
        let hello = drain(&mut client);

        for (header, body) in fragments(&hello) {
            server.receive_fragment(0, &header, &body).unwrap();
        }
        assert!(server.next_message().is_some());
        server
            .send_message(&mut message(MessageType::ServerHello, 40))
            .unwrap();
        server.end_flight().unwrap();
        drain(&mut server);

        // The ClientHello again: the answer went missing.
        for (header, body) in fragments(&hello) {
            server.receive_fragment(0, &header, &body).unwrap();
        }
        assert!(server.next_message().is_none());
        let resent = fragments(&drain(&mut server));
        assert_eq!(resent.len(), 1);
        assert_eq!(resent[0].0.msg_type, MessageType::ServerHello);
    }

    #[test]
    fn far_future_and_stale_fragments_dropped() {
        let config = config();
        let mut reliable = DtlsReliableHandshake::new(&config, config.mtu());
        let mut far = message(MessageType::Finished, 12);
        far.message_seq = MAX_FUTURE_MESSAGES + 1;
        let dtls = far.dtls_encoding();
        let (body, header) = HandshakeHeader::parse_dtls(&dtls).unwrap();
        reliable.receive_fragment(0, &header, body).unwrap();
        assert!(reliable.inbound.is_empty());

        // Unknown epoch.
        let mut next = message(MessageType::Finished, 12);
        next.message_seq = 0;
        let dtls = next.dtls_encoding();
        let (body, header) = HandshakeHeader::parse_dtls(&dtls).unwrap();
        reliable.receive_fragment(1, &header, body).unwrap();
        assert!(reliable.next_message().is_none());
    }

    #[test]
    fn stateless_mode_follows_client_hello_seq() {
        let config = config();
        let mut reliable = DtlsReliableHandshake::new(&config, config.mtu());
        reliable.set_stateless(true);

        let mut hello = message(MessageType::ClientHello, 30);
        hello.message_seq = 1;
        let dtls = hello.dtls_encoding();
        let (body, header) = HandshakeHeader::parse_dtls(&dtls).unwrap();
        reliable.receive_fragment(0, &header, body).unwrap();
        assert_eq!(reliable.next_message(), Some(hello));

        let finished = message(MessageType::Finished, 12);
        let dtls = finished.dtls_encoding();
        let (body, header) = HandshakeHeader::parse_dtls(&dtls).unwrap();
        reliable.receive_fragment(0, &header, body).unwrap();
        assert!(reliable.next_message().is_none());
    }
}
