use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{DtlsClientProtocol, DtlsServerProtocol, Output};
use crate::config::Config;
use crate::handshake::Negotiated;
use crate::session::Session;
use crate::Error;

/// A datagram service to run DTLS over, for example a connected UDP socket.
pub trait DatagramTransport {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()>;

    /// Wait up to `timeout` for one datagram. `Ok(None)` when none arrived.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>>;

    /// Largest datagram the transport carries.
    fn mtu(&self) -> usize;
}

#[derive(Debug)]
enum Role {
    Client(DtlsClientProtocol),
    Server(DtlsServerProtocol),
}

macro_rules! role {
    ($self:expr, $p:ident => $e:expr) => {
        match $self {
            Role::Client($p) => $e,
            Role::Server($p) => $e,
        }
    };
}

/// A blocking DTLS association over a [`DatagramTransport`].
///
/// `connect` and `accept` return once the handshake has completed.
#[derive(Debug)]
pub struct DtlsTransport<T> {
    role: Role,
    transport: T,
    received: VecDeque<Vec<u8>>,
    buf: Vec<u8>,
}

impl<T: DatagramTransport> DtlsTransport<T> {
    pub fn connect(
        config: Arc<Config>,
        transport: T,
        session: Option<Arc<Session>>,
    ) -> Result<Self, Error> {
        let mtu = transport.mtu().min(config.mtu());
        let client = DtlsClientProtocol::with_mtu(config, session, mtu)?;
        Self::handshake(Role::Client(client), transport)
    }

    pub fn accept(config: Arc<Config>, transport: T) -> Result<Self, Error> {
        let mtu = transport.mtu().min(config.mtu());
        let server = DtlsServerProtocol::with_mtu(config, mtu)?;
        Self::handshake(Role::Server(server), transport)
    }

    fn handshake(role: Role, transport: T) -> Result<Self, Error> {
        let mut dtls = DtlsTransport {
            role,
            transport,
            received: VecDeque::new(),
            // Large enough for a peer certificate as well as a datagram.
            buf: vec![0; 64 * 1024],
        };
        loop {
            let next = dtls.pump(Instant::now())?;
            if role!(&dtls.role, p => p.is_connected()) {
                return Ok(dtls);
            }
            dtls.wait(next)?;
        }
    }

    /// Drive timers and send what is pending. Returns the next deadline.
    fn pump(&mut self, now: Instant) -> Result<Instant, Error> {
        role!(&mut self.role, p => p.handle_timeout(now))?;
        loop {
            let output = role!(&mut self.role, p => p.poll_output(&mut self.buf));
            match output {
                Output::Packet(p) => self.transport.send(p)?,
                Output::ApplicationData(d) => self.received.push_back(d.to_vec()),
                Output::Connected => debug!("Connected"),
                Output::PeerCert(c) => trace!("Peer certificate of {} bytes", c.len()),
                Output::Timeout(t) => return Ok(t),
            }
        }
    }

    /// Receive until `deadline`, or the first datagram.
    fn wait(&mut self, deadline: Instant) -> Result<bool, Error> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        let mut packet = vec![0; self.buf.len()];
        match self.transport.receive(&mut packet, timeout)? {
            Some(n) => {
                role!(&mut self.role, p => p.handle_packet(&packet[..n]))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Send one record of application data.
    pub fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        role!(&mut self.role, p => p.send_application_data(data))?;
        self.pump(Instant::now())?;
        Ok(())
    }

    /// Wait up to `timeout` for application data. Returns its length, or
    /// `None` when nothing arrived in time.
    pub fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>, Error> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(data) = self.received.pop_front() {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                return Ok(Some(n));
            }
            if role!(&self.role, p => p.is_closed()) {
                return Err(Error::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let next = self.pump(now)?.min(deadline);
            if self.received.is_empty() {
                self.wait(next)?;
                self.pump(Instant::now())?;
            }
        }
    }

    /// Send close_notify.
    pub fn close(&mut self) -> Result<(), Error> {
        role!(&mut self.role, p => p.close())?;
        self.pump(Instant::now())?;
        Ok(())
    }

    pub fn negotiated(&self) -> &Negotiated {
        role!(&self.role, p => p.negotiated())
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        role!(&self.role, p => p.session())
    }

    pub fn get_ref(&self) -> &T {
        &self.transport
    }
}
