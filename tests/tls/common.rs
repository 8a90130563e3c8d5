//! Shared helpers for the TLS integration tests.

#![allow(unused)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};

use tlscore::certificate::generate_self_signed_certificate;
use tlscore::crypto::rust_crypto::default_provider;
use tlscore::crypto::SecureRandom;
use tlscore::{Config, ConfigBuilder, CryptoProvider, Credentials, Error};
use tlscore::{TlsClientProtocol, TlsServerProtocol};

static INIT: Once = Once::new();

pub fn init_log() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Predictable randoms, so failures can be replayed.
#[derive(Debug)]
pub struct CountingRandom(AtomicU64);

impl SecureRandom for CountingRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<(), String> {
        for chunk in buf.chunks_mut(8) {
            // splitmix64
            let mut z = self
                .0
                .fetch_add(0x9E37_79B9_7F4A_7C15, Ordering::Relaxed)
                .wrapping_add(0x9E37_79B9_7F4A_7C15);
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            z ^= z >> 31;
            chunk.copy_from_slice(&z.to_be_bytes()[..chunk.len()]);
        }
        Ok(())
    }
}

static RANDOM: CountingRandom = CountingRandom(AtomicU64::new(1));

pub fn provider() -> CryptoProvider {
    CryptoProvider {
        secure_random: &RANDOM,
        ..default_provider()
    }
}

pub fn builder() -> ConfigBuilder {
    Config::builder().with_crypto_provider(provider())
}

pub fn config(f: impl FnOnce(ConfigBuilder) -> ConfigBuilder) -> Arc<Config> {
    Arc::new(f(builder()).build().expect("config"))
}

/// A fresh self-signed ECDSA P-256 identity.
pub fn credentials() -> Credentials {
    let cert = generate_self_signed_certificate().expect("generate certificate");
    Credentials::from_der(&provider(), vec![cert.certificate], &cert.private_key)
        .expect("load credentials")
}

pub fn drain(from: &mut dyn FnMut(&mut [u8]) -> usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0; 4096];
    loop {
        let n = from(&mut buf);
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n]);
    }
}

pub fn client_to_server(
    client: &mut TlsClientProtocol,
    server: &mut TlsServerProtocol,
) -> Result<(), Error> {
    let data = drain(&mut |b| client.read_output(b));
    if data.is_empty() {
        return Ok(());
    }
    server.offer_input(&data)
}

pub fn server_to_client(
    client: &mut TlsClientProtocol,
    server: &mut TlsServerProtocol,
) -> Result<(), Error> {
    let data = drain(&mut |b| server.read_output(b));
    if data.is_empty() {
        return Ok(());
    }
    client.offer_input(&data)
}

/// Shuttle bytes until both sides are connected or one fails.
pub fn handshake(
    client: &mut TlsClientProtocol,
    server: &mut TlsServerProtocol,
) -> Result<(), Error> {
    for _ in 0..10 {
        client_to_server(client, server)?;
        server_to_client(client, server)?;
        if client.is_connected() && server.is_connected() {
            // A TLS 1.3 client Finished may still be in flight.
            return client_to_server(client, server);
        }
    }
    panic!("handshake did not complete");
}

pub fn connect(client: Arc<Config>, server: Arc<Config>) -> (TlsClientProtocol, TlsServerProtocol) {
    let mut c = TlsClientProtocol::new(client, None).expect("client");
    let mut s = TlsServerProtocol::new(server).expect("server");
    handshake(&mut c, &mut s).expect("handshake");
    (c, s)
}

pub fn read_all(read: &mut dyn FnMut(&mut [u8]) -> usize) -> Vec<u8> {
    drain(read)
}

/// Content types and lengths of the records in `data`.
pub fn records(data: &[u8]) -> Vec<(u8, usize)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i + 5 <= data.len() {
        let len = u16::from_be_bytes([data[i + 3], data[i + 4]]) as usize;
        out.push((data[i], len));
        i += 5 + len;
    }
    out
}

/// Send `data` from client to server and return what the server read.
pub fn send_to_server(
    client: &mut TlsClientProtocol,
    server: &mut TlsServerProtocol,
    data: &[u8],
) -> Vec<u8> {
    client.write_application_data(data).expect("write");
    client_to_server(client, server).expect("deliver");
    read_all(&mut |b| server.read_application_data(b))
}

pub fn send_to_client(
    client: &mut TlsClientProtocol,
    server: &mut TlsServerProtocol,
    data: &[u8],
) -> Vec<u8> {
    server.write_application_data(data).expect("write");
    server_to_client(client, server).expect("deliver");
    read_all(&mut |b| client.read_application_data(b))
}
