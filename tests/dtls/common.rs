//! Shared helpers for the DTLS integration tests.

#![allow(unused)]

use std::io;
use std::net::UdpSocket;
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use tlscore::certificate::generate_self_signed_certificate;
use tlscore::crypto::rust_crypto::default_provider;
use tlscore::{Config, ConfigBuilder, Credentials, DatagramTransport, Error, Output};
use tlscore::{DtlsClientProtocol, DtlsServerProtocol, ProtocolVersion};

static INIT: Once = Once::new();

pub fn init_log() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Handshake message types.
pub const CLIENT_HELLO: u8 = 1;
pub const SERVER_HELLO: u8 = 2;
pub const HELLO_VERIFY_REQUEST: u8 = 3;
pub const CERTIFICATE: u8 = 11;

pub fn builder() -> ConfigBuilder {
    Config::builder()
        .with_crypto_provider(default_provider())
        .dtls_versions(ProtocolVersion::DTLSV1_0, ProtocolVersion::DTLSV1_2)
        .rng_seed(42)
}

pub fn config(f: impl FnOnce(ConfigBuilder) -> ConfigBuilder) -> Arc<Config> {
    Arc::new(f(builder()).build().expect("config"))
}

pub fn credentials() -> Credentials {
    let cert = generate_self_signed_certificate().expect("generate certificate");
    Credentials::from_der(&default_provider(), vec![cert.certificate], &cert.private_key)
        .expect("load credentials")
}

#[derive(Debug, Default)]
pub struct Drained {
    pub packets: Vec<Vec<u8>>,
    pub data: Vec<Vec<u8>>,
    pub connected: bool,
    pub peer_cert: Option<Vec<u8>>,
}

pub fn drain(poll: &mut dyn FnMut(&mut [u8]) -> Output<'_>) -> Drained {
    let mut out = Drained::default();
    let mut buf = vec![0; 4096];
    loop {
        match poll(&mut buf) {
            Output::Packet(p) => out.packets.push(p.to_vec()),
            Output::ApplicationData(d) => out.data.push(d.to_vec()),
            Output::Connected => out.connected = true,
            Output::PeerCert(c) => out.peer_cert = Some(c.to_vec()),
            Output::Timeout(_) => return out,
        }
    }
}

/// Handshake message types of the plaintext handshake records in a
/// datagram.
pub fn handshake_types(datagram: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i + 13 <= datagram.len() {
        let epoch = u16::from_be_bytes([datagram[i + 3], datagram[i + 4]]);
        let len = u16::from_be_bytes([datagram[i + 11], datagram[i + 12]]) as usize;
        if datagram[i] == 22 && epoch == 0 && len > 0 {
            out.push(datagram[i + 13]);
        }
        i += 13 + len;
    }
    out
}

/// A client and server wired back to back, with a filter on each
/// direction.
pub struct Pair {
    pub client: DtlsClientProtocol,
    pub server: DtlsServerProtocol,
    pub now: Instant,
    pub client_sent: Vec<Vec<u8>>,
    pub server_sent: Vec<Vec<u8>>,
    pub client_events: Drained,
    pub server_events: Drained,
}

impl Pair {
    pub fn new(client: Arc<Config>, server: Arc<Config>) -> Self {
        Pair {
            client: DtlsClientProtocol::new(client, None).expect("client"),
            server: DtlsServerProtocol::new(server).expect("server"),
            now: Instant::now(),
            client_sent: Vec::new(),
            server_sent: Vec::new(),
            client_events: Drained::default(),
            server_events: Drained::default(),
        }
    }

    /// Run timers, then deliver what each side sent unless `lose` says
    /// otherwise. `lose` gets the sender (true for the server) and the
    /// index of the datagram among everything that side sent.
    pub fn step(&mut self, lose: &mut dyn FnMut(bool, usize) -> bool) -> Result<(), Error> {
        self.client.handle_timeout(self.now)?;
        let out = drain(&mut |b| self.client.poll_output(b));
        self.merge(false, &out);
        for p in out.packets {
            let index = self.client_sent.len();
            self.client_sent.push(p.clone());
            if !lose(false, index) {
                self.server.handle_packet(&p)?;
            }
        }

        self.server.handle_timeout(self.now)?;
        let out = drain(&mut |b| self.server.poll_output(b));
        self.merge(true, &out);
        for p in out.packets {
            let index = self.server_sent.len();
            self.server_sent.push(p.clone());
            if !lose(true, index) {
                self.client.handle_packet(&p)?;
            }
        }
        let out = drain(&mut |b| self.client.poll_output(b));
        self.merge(false, &out);
        for p in out.packets {
            let index = self.client_sent.len();
            self.client_sent.push(p.clone());
            if !lose(false, index) {
                self.server.handle_packet(&p)?;
            }
        }
        let out = drain(&mut |b| self.server.poll_output(b));
        self.merge(true, &out);
        for p in out.packets {
            let index = self.server_sent.len();
            self.server_sent.push(p.clone());
            if !lose(true, index) {
                self.client.handle_packet(&p)?;
            }
        }
        Ok(())
    }

    fn merge(&mut self, server: bool, out: &Drained) {
        let events = if server {
            &mut self.server_events
        } else {
            &mut self.client_events
        };
        events.connected |= out.connected;
        events.data.extend(out.data.iter().cloned());
        if out.peer_cert.is_some() {
            events.peer_cert = out.peer_cert.clone();
        }
    }

    /// Step, advancing time by two seconds between steps, until both
    /// sides are connected.
    pub fn run(&mut self, lose: &mut dyn FnMut(bool, usize) -> bool) -> Result<(), Error> {
        for _ in 0..15 {
            self.step(lose)?;
            if self.client_events.connected && self.server_events.connected {
                return Ok(());
            }
            self.now += Duration::from_secs(2);
        }
        panic!("handshake did not complete");
    }

    pub fn client_to_server(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.client.send_application_data(data).expect("send");
        self.server_events.data.clear();
        self.step(&mut |_, _| false).expect("step");
        std::mem::take(&mut self.server_events.data)
    }
}

/// A connected UDP socket as a datagram transport.
pub struct Udp {
    pub socket: UdpSocket,
    pub mtu: usize,
}

impl DatagramTransport for Udp {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.socket.send(datagram).map(|_| ())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        // A zero timeout means blocking to the socket.
        let timeout = timeout.max(Duration::from_millis(1));
        self.socket.set_read_timeout(Some(timeout))?;
        match self.socket.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn mtu(&self) -> usize {
        self.mtu
    }
}

/// Two UDP sockets connected to each other.
pub fn udp_pair(mtu: usize) -> (Udp, Udp) {
    let a = UdpSocket::bind("127.0.0.1:0").unwrap();
    let b = UdpSocket::bind("127.0.0.1:0").unwrap();
    a.connect(b.local_addr().unwrap()).unwrap();
    b.connect(a.local_addr().unwrap()).unwrap();
    (Udp { socket: a, mtu }, Udp { socket: b, mtu })
}
