//! tlscore is a sans-IO protocol core for TLS 1.0 to 1.3 over streams and
//! DTLS 1.0 and 1.2 over datagrams.
//!
//! The crate never touches a socket or a clock by itself. Stream protocols
//! ([`TlsClientProtocol`], [`TlsServerProtocol`]) take received bytes with
//! `offer_input` and hand out bytes to send with `read_output`. Datagram
//! protocols ([`DtlsClientProtocol`], [`DtlsServerProtocol`]) take packets
//! and the current time, and are drained with `poll_output` until it
//! yields [`Output::Timeout`]. [`TlsStream`] and [`DtlsTransport`] are
//! small blocking drivers on top.
//!
//! Cryptography comes from a [`CryptoProvider`]. The `rust-crypto` feature
//! (default) provides one built on the RustCrypto crates.
//!
//! ```no_run
//! # #[cfg(feature = "rust-crypto")]
//! # fn main() -> Result<(), tlscore::Error> {
//! use std::net::TcpStream;
//! use std::sync::Arc;
//!
//! use tlscore::{Config, FingerprintVerifier, TlsStream};
//!
//! let config = Config::builder()
//!     .with_certificate_verifier(Arc::new(FingerprintVerifier::new(vec![])))
//!     .build()?;
//! let socket = TcpStream::connect("127.0.0.1:4433")?;
//! let mut tls = TlsStream::connect(Arc::new(config), socket, None)?;
//! std::io::Write::write_all(&mut tls, b"hello")?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "rust-crypto"))]
//! # fn main() {}
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]
// #![deny(missing_docs)]

#[macro_use]
extern crate log;

mod alert;
mod buffer;
mod codec;
mod config;
mod credentials;
mod error;
mod key_exchange;
mod record;
mod rng;
mod session;
mod timer;
mod transcript;
mod window;

pub(crate) mod handshake;

pub mod certificate;
pub mod crypto;
pub mod message;
pub mod types;

mod dtls;
mod tls;

pub use alert::{Alert, AlertDescription, AlertLevel};
pub use buffer::ByteQueue;
pub use config::{Config, ConfigBuilder};
pub use credentials::{CertificateVerifier, ClientAuth, Credentials, FingerprintVerifier};
pub use credentials::{InMemoryPskStore, PskCredentials, PskStore, VerifyContext};
pub use credentials::{InMemorySrpStore, SrpCredentials, SrpStore, SrpVerifier};
pub use crypto::CryptoProvider;
pub use dtls::{DatagramTransport, DtlsClientProtocol, DtlsServerProtocol, DtlsTransport, Output};
pub use error::Error;
pub use handshake::{ConnectionState, Negotiated};
pub use session::{InMemorySessionCache, Session, SessionCache};
pub use session::{SessionParameters, SessionParametersBuilder};
pub use tls::{TlsClientProtocol, TlsServerProtocol, TlsStream};
pub use types::{CipherSuite, NamedGroup, ProtocolVersion, SignatureScheme};
