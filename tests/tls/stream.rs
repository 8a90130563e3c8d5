//! Blocking `TlsStream` over TCP.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use tlscore::{CipherSuite, ProtocolVersion, TlsStream};

use crate::common::*;

#[test]
fn tls_stream_over_tcp() {
    init_log();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server_config = config(|b| b.with_credentials(credentials()));
    let server = thread::spawn(move || {
        let (socket, _) = listener.accept().unwrap();
        let mut tls = TlsStream::accept(server_config, socket).unwrap();
        let mut buf = [0; 64];
        let n = tls.read(&mut buf).unwrap();
        tls.write_all(&buf[..n]).unwrap();
        tls.close().unwrap();
        // Wait for the answering close_notify.
        let mut rest = Vec::new();
        tls.read_to_end(&mut rest).unwrap();
        tls.negotiated().version
    });

    let client_config = config(|b| b);
    let socket = TcpStream::connect(addr).unwrap();
    let mut tls = TlsStream::connect(client_config, socket, None).unwrap();
    tls.write_all(b"echo me").unwrap();

    let mut echoed = Vec::new();
    tls.read_to_end(&mut echoed).unwrap();
    assert_eq!(echoed, b"echo me");

    let version = server.join().unwrap();
    assert_eq!(version, Some(ProtocolVersion::TLSV1_3));
    assert_eq!(tls.negotiated().version, Some(ProtocolVersion::TLSV1_3));
}

#[test]
fn tls_stream_tls12_anonymous() {
    init_log();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let anon = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .cipher_suites(&[CipherSuite::DH_ANON_AES128_GCM_SHA256])
    });

    let server_config = anon.clone();
    let server = thread::spawn(move || {
        let (socket, _) = listener.accept().unwrap();
        let mut tls = TlsStream::accept(server_config, socket).unwrap();
        tls.write_all(b"greeting").unwrap();
        tls.close().unwrap();
        let mut rest = Vec::new();
        tls.read_to_end(&mut rest).unwrap();
    });

    let socket = TcpStream::connect(addr).unwrap();
    let mut tls = TlsStream::connect(anon, socket, None).unwrap();
    let mut received = Vec::new();
    tls.read_to_end(&mut received).unwrap();
    assert_eq!(received, b"greeting");
    server.join().unwrap();
}
