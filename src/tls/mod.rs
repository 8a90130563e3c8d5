//! TLS over a byte stream.
//!
//! [`TlsClientProtocol`] and [`TlsServerProtocol`] are sans-IO: received
//! bytes go in through `offer_input`, bytes to send come out of
//! `read_output`, and application data is exchanged with
//! `write_application_data` / `read_application_data`. [`TlsStream`] runs
//! either role over a blocking `Read + Write` transport.

use std::sync::Arc;

use crate::config::Config;
use crate::handshake::client::ClientHandshake;
use crate::handshake::server::ServerHandshake;
use crate::handshake::{ConnectionState, Negotiated};
use crate::message::NewSessionTicket;
use crate::session::Session;
use crate::Error;

mod connection;
mod stream;

use connection::Connection;
pub use stream::TlsStream;

/// Client side of a TLS connection.
#[derive(Debug)]
pub struct TlsClientProtocol {
    conn: Connection,
}

impl TlsClientProtocol {
    /// Create a client and queue its ClientHello.
    ///
    /// `session` is offered for resumption when it is still resumable.
    pub fn new(config: Arc<Config>, session: Option<Arc<Session>>) -> Result<Self, Error> {
        let handshake = ClientHandshake::new(config, false, session);
        let mut conn = Connection::new(Box::new(handshake), true);
        conn.start()?;
        Ok(TlsClientProtocol { conn })
    }

    /// Feed bytes received from the peer.
    pub fn offer_input(&mut self, data: &[u8]) -> Result<(), Error> {
        self.conn.offer_input(data)
    }

    /// Take bytes to send to the peer. Returns how many were copied.
    pub fn read_output(&mut self, buf: &mut [u8]) -> usize {
        self.conn.read_output(buf)
    }

    pub fn available_output_bytes(&self) -> usize {
        self.conn.available_output_bytes()
    }

    /// Queue application data. Data written during the handshake is sent
    /// once it completes.
    pub fn write_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        self.conn.write_application_data(data)
    }

    pub fn read_application_data(&mut self, buf: &mut [u8]) -> usize {
        self.conn.read_application_data(buf)
    }

    pub fn available_input_bytes(&self) -> usize {
        self.conn.available_input_bytes()
    }

    /// Send close_notify.
    pub fn close(&mut self) -> Result<(), Error> {
        self.conn.close()
    }

    pub fn is_handshaking(&self) -> bool {
        self.conn.is_handshaking()
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

    /// The session established or resumed, for a later resumption offer.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.conn.session()
    }

    /// TLS 1.3 tickets sent by the server. They are kept for inspection
    /// and never used for resumption.
    pub fn received_tickets(&self) -> &[NewSessionTicket] {
        self.conn.received_tickets()
    }

    /// TLS 1.3 only.
    pub fn request_key_update(&mut self, update_requested: bool) -> Result<(), Error> {
        self.conn.request_key_update(update_requested)
    }
}

/// Server side of a TLS connection.
#[derive(Debug)]
pub struct TlsServerProtocol {
    conn: Connection,
}

impl TlsServerProtocol {
    pub fn new(config: Arc<Config>) -> Result<Self, Error> {
        let handshake = ServerHandshake::new(config, false);
        let mut conn = Connection::new(Box::new(handshake), false);
        conn.start()?;
        Ok(TlsServerProtocol { conn })
    }

    /// Feed bytes received from the peer.
    pub fn offer_input(&mut self, data: &[u8]) -> Result<(), Error> {
        self.conn.offer_input(data)
    }

    /// Take bytes to send to the peer. Returns how many were copied.
    pub fn read_output(&mut self, buf: &mut [u8]) -> usize {
        self.conn.read_output(buf)
    }

    pub fn available_output_bytes(&self) -> usize {
        self.conn.available_output_bytes()
    }

    pub fn write_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        self.conn.write_application_data(data)
    }

    pub fn read_application_data(&mut self, buf: &mut [u8]) -> usize {
        self.conn.read_application_data(buf)
    }

    pub fn available_input_bytes(&self) -> usize {
        self.conn.available_input_bytes()
    }

    pub fn close(&mut self) -> Result<(), Error> {
        self.conn.close()
    }

    pub fn is_handshaking(&self) -> bool {
        self.conn.is_handshaking()
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

    /// Send a TLS 1.3 NewSessionTicket after the handshake.
    pub fn send_new_session_ticket(&mut self, ticket: &NewSessionTicket) -> Result<(), Error> {
        self.conn.send_new_session_ticket(ticket)
    }

    /// TLS 1.3 only.
    pub fn request_key_update(&mut self, update_requested: bool) -> Result<(), Error> {
        self.conn.request_key_update(update_requested)
    }
}
