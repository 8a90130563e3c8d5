//! DTLS 1.0 and 1.2 over datagrams.
//!
//! [`DtlsClientProtocol`] and [`DtlsServerProtocol`] are sans-IO. Received
//! datagrams go in with `handle_packet`, time advances with
//! `handle_timeout`, and `poll_output` hands out what the application must
//! act on: events first, then received application data, then datagrams
//! to send, and finally the next instant `handle_timeout` wants to be
//! called. [`DtlsTransport`] runs either role over a blocking
//! [`DatagramTransport`].

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::handshake::client::ClientHandshake;
use crate::handshake::server::ServerHandshake;
use crate::handshake::{ConnectionState, Negotiated};
use crate::session::Session;
use crate::Error;

mod connection;
mod reassembler;
mod reliable;
mod transport;

use connection::DtlsConnection;
pub use transport::{DatagramTransport, DtlsTransport};

/// Output from [`DtlsClientProtocol::poll_output`] and
/// [`DtlsServerProtocol::poll_output`].
///
/// Slices borrow the buffer passed to `poll_output`.
#[derive(Debug, PartialEq, Eq)]
pub enum Output<'a> {
    /// A datagram to send to the peer.
    Packet(&'a [u8]),
    /// Nothing more to do until this instant or the next packet.
    Timeout(Instant),
    /// The handshake completed.
    Connected,
    /// DER of the peer's end-entity certificate.
    PeerCert(&'a [u8]),
    /// Application data received from the peer.
    ApplicationData(&'a [u8]),
}

macro_rules! forward_dtls {
    () => {
        /// Process one received datagram.
        pub fn handle_packet(&mut self, packet: &[u8]) -> Result<(), Error> {
            self.conn.handle_packet(packet)
        }

        /// Advance time. Call this at least once before polling, and again
        /// when the [`Output::Timeout`] instant is reached.
        pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
            self.conn.handle_timeout(now)
        }

        /// Poll until [`Output::Timeout`].
        ///
        /// Panics if `buf` is smaller than a datagram or the peer
        /// certificate.
        pub fn poll_output<'a>(&mut self, buf: &'a mut [u8]) -> Output<'a> {
            self.conn.poll_output(buf)
        }

        /// Send application data in one record. Data sent during the
        /// handshake goes out once it completes.
        pub fn send_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
            self.conn.send_application_data(data)
        }

        /// Send close_notify.
        pub fn close(&mut self) -> Result<(), Error> {
            self.conn.close()
        }

        pub fn is_connected(&self) -> bool {
            self.conn.is_connected()
        }

        pub fn is_closed(&self) -> bool {
            self.conn.is_closed()
        }

        pub fn state(&self) -> ConnectionState {
            self.conn.state()
        }

        pub fn negotiated(&self) -> &Negotiated {
            self.conn.negotiated()
        }

        pub fn session(&self) -> Option<Arc<Session>> {
            self.conn.session()
        }
    };
}

/// Client side of a DTLS association.
#[derive(Debug)]
pub struct DtlsClientProtocol {
    conn: DtlsConnection,
}

impl DtlsClientProtocol {
    /// The ClientHello goes out on the first `handle_timeout`.
    pub fn new(config: Arc<Config>, session: Option<Arc<Session>>) -> Result<Self, Error> {
        let mtu = config.mtu();
        Self::with_mtu(config, session, mtu)
    }

    pub(crate) fn with_mtu(
        config: Arc<Config>,
        session: Option<Arc<Session>>,
        mtu: usize,
    ) -> Result<Self, Error> {
        let handshake = ClientHandshake::new(config.clone(), true, session);
        let conn = DtlsConnection::new(config, Box::new(handshake), true, mtu)?;
        Ok(DtlsClientProtocol { conn })
    }

    forward_dtls!();
}

/// Server side of a DTLS association.
#[derive(Debug)]
pub struct DtlsServerProtocol {
    conn: DtlsConnection,
}

impl DtlsServerProtocol {
    /// With cookie exchange enabled, no state is kept for a client until
    /// it echoes a valid HelloVerifyRequest cookie.
    pub fn new(config: Arc<Config>) -> Result<Self, Error> {
        let mtu = config.mtu();
        Self::with_mtu(config, mtu)
    }

    pub(crate) fn with_mtu(config: Arc<Config>, mtu: usize) -> Result<Self, Error> {
        let handshake = ServerHandshake::new(config.clone(), true);
        let conn = DtlsConnection::new(config, Box::new(handshake), false, mtu)?;
        Ok(DtlsServerProtocol { conn })
    }

    forward_dtls!();
}

#[cfg(all(test, feature = "rust-crypto"))]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::crypto::rust_crypto::default_provider;
    use crate::types::{CipherSuite, ProtocolVersion};

    fn config(cookie_exchange: bool) -> Arc<Config> {
        Arc::new(
            Config::builder()
                .with_crypto_provider(default_provider())
                .dtls_versions(ProtocolVersion::DTLSV1_2, ProtocolVersion::DTLSV1_2)
                .cipher_suites(&[CipherSuite::DH_ANON_AES128_GCM_SHA256])
                .dtls_cookie_exchange(cookie_exchange)
                .rng_seed(7)
                .build()
                .unwrap(),
        )
    }

    #[derive(Default)]
    struct Drained {
        packets: Vec<Vec<u8>>,
        data: Vec<Vec<u8>>,
        connected: bool,
    }

    fn drain(poll: &mut dyn FnMut(&mut [u8]) -> Output<'_>) -> Drained {
        let mut out = Drained::default();
        let mut buf = vec![0; 2048];
        loop {
            match poll(&mut buf) {
                Output::Packet(p) => out.packets.push(p.to_vec()),
                Output::ApplicationData(d) => out.data.push(d.to_vec()),
                Output::Connected => out.connected = true,
                Output::PeerCert(_) => {}
                Output::Timeout(_) => return out,
            }
        }
    }

    struct Pair {
        client: DtlsClientProtocol,
        server: DtlsServerProtocol,
        now: Instant,
        client_packets: usize,
        server_packets: usize,
    }

    impl Pair {
        fn new(cookie_exchange: bool) -> Self {
            let config = config(cookie_exchange);
            Pair {
                client: DtlsClientProtocol::new(config.clone(), None).unwrap(),
                server: DtlsServerProtocol::new(config).unwrap(),
                now: Instant::now(),
                client_packets: 0,
                server_packets: 0,
            }
        }

        /// One exchange in each direction. `keep` filters server datagrams.
        fn step(&mut self, keep: &mut dyn FnMut(usize) -> bool) -> (bool, bool) {
            self.client.handle_timeout(self.now).unwrap();
            let out = drain(&mut |b| self.client.poll_output(b));
            for p in &out.packets {
                self.client_packets += 1;
                self.server.handle_packet(p).unwrap();
            }
            let client_connected = out.connected;

            self.server.handle_timeout(self.now).unwrap();
            let out = drain(&mut |b| self.server.poll_output(b));
            for p in &out.packets {
                self.server_packets += 1;
                if keep(self.server_packets) {
                    self.client.handle_packet(p).unwrap();
                }
            }
            (client_connected, out.connected)
        }

        fn run(&mut self, keep: &mut dyn FnMut(usize) -> bool) {
            let mut connected = (false, false);
            for _ in 0..20 {
                let (c, s) = self.step(keep);
                connected.0 |= c;
                connected.1 |= s;
                if self.client.is_connected() && self.server.is_connected() {
                    break;
                }
                self.now += Duration::from_secs(2);
            }
            // The client's Connected event may still be pending.
            let out = drain(&mut |b| self.client.poll_output(b));
            connected.0 |= out.connected;
            assert!(connected.0 && connected.1, "handshake did not complete");
        }
    }

    #[test]
    fn handshake_and_data() {
        let mut pair = Pair::new(false);
        pair.run(&mut |_| true);
        assert_eq!(pair.client.negotiated().version, Some(ProtocolVersion::DTLSV1_2));

        pair.client.send_application_data(b"ping").unwrap();
        let out = drain(&mut |b| pair.client.poll_output(b));
        for p in &out.packets {
            pair.server.handle_packet(p).unwrap();
        }
        let out = drain(&mut |b| pair.server.poll_output(b));
        assert_eq!(out.data, vec![b"ping".to_vec()]);
    }

    #[test]
    fn cookie_exchange_completes() {
        let mut pair = Pair::new(true);
        // The first server datagram is the HelloVerifyRequest.
        pair.client.handle_timeout(pair.now).unwrap();
        let hello = drain(&mut |b| pair.client.poll_output(b)).packets;
        assert_eq!(hello.len(), 1);
        pair.server.handle_packet(&hello[0]).unwrap();
        let reply = drain(&mut |b| pair.server.poll_output(b)).packets;
        assert_eq!(reply.len(), 1);
        // Record header, then the handshake header.
        assert_eq!(reply[0][13], 3);

        // A replayed datagram is dropped by the replay window.
        pair.server.handle_packet(&hello[0]).unwrap();
        assert!(drain(&mut |b| pair.server.poll_output(b)).packets.is_empty());

        // The retransmitted hello is a new record and gets the same cookie.
        pair.now += Duration::from_secs(2);
        pair.client.handle_timeout(pair.now).unwrap();
        let resent = drain(&mut |b| pair.client.poll_output(b)).packets;
        assert_eq!(resent.len(), 1);
        assert_ne!(resent[0], hello[0]);
        pair.server.handle_packet(&resent[0]).unwrap();
        let again = drain(&mut |b| pair.server.poll_output(b)).packets;
        assert_eq!(again.len(), 1);
        assert_eq!(again[0][25..], reply[0][25..]);

        pair.client.handle_packet(&reply[0]).unwrap();
        pair.run(&mut |_| true);
    }

    #[test]
    fn lost_server_flight_is_resent() {
        let mut pair = Pair::new(false);
        pair.run(&mut |n| n > 1);
        assert!(pair.client_packets > 2);
    }

    #[test]
    fn no_answer_times_out() {
        let config = config(false);
        let mut client = DtlsClientProtocol::new(config, None).unwrap();
        let mut now = Instant::now();
        let mut result = Ok(());
        for _ in 0..100 {
            result = client.handle_timeout(now);
            if result.is_err() {
                break;
            }
            drain(&mut |b| client.poll_output(b));
            now += Duration::from_secs(1);
        }
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert!(client.is_closed());
        assert!(matches!(client.handle_timeout(now), Err(Error::Closed)));
    }
}
