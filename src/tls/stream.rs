use std::io::{self, Read, Write};
use std::sync::Arc;

use super::connection::Connection;
use crate::config::Config;
use crate::handshake::client::ClientHandshake;
use crate::handshake::server::ServerHandshake;
use crate::handshake::Negotiated;
use crate::session::Session;
use crate::Error;

const READ_CHUNK: usize = 16 * 1024;

/// A blocking TLS connection over any `Read + Write` transport.
///
/// `connect` and `accept` return once the handshake has completed.
#[derive(Debug)]
pub struct TlsStream<S> {
    conn: Connection,
    stream: S,
}

impl<S: Read + Write> TlsStream<S> {
    pub fn connect(
        config: Arc<Config>,
        stream: S,
        session: Option<Arc<Session>>,
    ) -> Result<Self, Error> {
        let handshake = ClientHandshake::new(config, false, session);
        Self::handshake(Connection::new(Box::new(handshake), true), stream)
    }

    pub fn accept(config: Arc<Config>, stream: S) -> Result<Self, Error> {
        let handshake = ServerHandshake::new(config, false);
        Self::handshake(Connection::new(Box::new(handshake), false), stream)
    }

    fn handshake(mut conn: Connection, stream: S) -> Result<Self, Error> {
        conn.start()?;
        let mut tls = TlsStream { conn, stream };
        while tls.conn.is_handshaking() {
            tls.write_pending()?;
            if tls.read_some()? == 0 {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "transport closed during handshake",
                )));
            }
        }
        // The last flight, if it is ours.
        tls.write_pending()?;
        Ok(tls)
    }

    fn write_pending(&mut self) -> Result<(), Error> {
        let mut buf = [0; READ_CHUNK];
        loop {
            let n = self.conn.read_output(&mut buf);
            if n == 0 {
                break;
            }
            self.stream.write_all(&buf[..n])?;
        }
        self.stream.flush()?;
        Ok(())
    }

    /// Read once from the transport and process what arrived.
    fn read_some(&mut self) -> Result<usize, Error> {
        let mut buf = [0; READ_CHUNK];
        let n = self.stream.read(&mut buf)?;
        if n > 0 {
            let result = self.conn.offer_input(&buf[..n]);
            // Alerts and handshake replies go out even when input failed.
            self.write_pending()?;
            result?;
        }
        Ok(n)
    }

    pub fn negotiated(&self) -> &Negotiated {
        self.conn.negotiated()
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.conn.session()
    }

    /// Send close_notify.
    pub fn close(&mut self) -> Result<(), Error> {
        self.conn.close()?;
        self.write_pending()
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }
}

impl<S: Read + Write> Read for TlsStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.conn.available_input_bytes() > 0 {
                return Ok(self.conn.read_application_data(buf));
            }
            if self.conn.is_closed() {
                return Ok(0);
            }
            if self.read_some()? == 0 {
                // Transport EOF without close_notify.
                return Ok(0);
            }
        }
    }
}

impl<S: Read + Write> Write for TlsStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.conn.write_application_data(buf)?;
        self.write_pending()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_pending()?;
        Ok(())
    }
}
