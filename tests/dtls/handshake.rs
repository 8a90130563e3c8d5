//! DTLS handshakes without loss.

use std::sync::Arc;

use tlscore::{CipherSuite, Error, InMemoryPskStore, ProtocolVersion, PskCredentials};

use crate::common::*;

#[test]
fn dtls12_with_cookie_exchange() {
    init_log();
    let creds = credentials();
    let server_cert = creds.chain()[0].clone();
    let server = config(|b| b.with_credentials(creds));
    let mut pair = Pair::new(config(|b| b), server);
    pair.run(&mut |_, _| false).unwrap();

    // ClientHello, HelloVerifyRequest, ClientHello with the cookie.
    assert_eq!(handshake_types(&pair.client_sent[0]), [CLIENT_HELLO]);
    assert_eq!(handshake_types(&pair.server_sent[0]), [HELLO_VERIFY_REQUEST]);
    assert_eq!(handshake_types(&pair.client_sent[1]), [CLIENT_HELLO]);
    assert_eq!(handshake_types(&pair.server_sent[1])[0], SERVER_HELLO);

    assert_eq!(pair.client.negotiated().version, Some(ProtocolVersion::DTLSV1_2));
    assert_eq!(pair.client_events.peer_cert.as_deref(), Some(&server_cert[..]));
    assert!(pair.server_events.peer_cert.is_none());

    assert_eq!(pair.client_to_server(b"datagram"), vec![b"datagram".to_vec()]);
}

#[test]
fn dtls_without_cookie_exchange() {
    init_log();
    let server = config(|b| b.with_credentials(credentials()).dtls_cookie_exchange(false));
    let mut pair = Pair::new(config(|b| b), server);
    pair.run(&mut |_, _| false).unwrap();
    assert_eq!(handshake_types(&pair.server_sent[0])[0], SERVER_HELLO);
}

#[test]
fn dtls10_negotiated() {
    init_log();
    let client = config(|b| b.dtls_versions(ProtocolVersion::DTLSV1_0, ProtocolVersion::DTLSV1_0));
    let server = config(|b| b.with_credentials(credentials()));
    let mut pair = Pair::new(client, server);
    pair.run(&mut |_, _| false).unwrap();
    assert_eq!(pair.server.negotiated().version, Some(ProtocolVersion::DTLSV1_0));
    assert_eq!(
        pair.client.negotiated().cipher_suite,
        Some(CipherSuite::ECDHE_ECDSA_AES128_CBC_SHA)
    );
    assert_eq!(pair.client_to_server(b"old"), vec![b"old".to_vec()]);
}

#[test]
fn small_mtu_fragments_the_certificate() {
    init_log();
    let client = config(|b| b.mtu(256));
    let server = config(|b| b.mtu(256).with_credentials(credentials()));
    let mut pair = Pair::new(client, server);
    pair.run(&mut |_, _| false).unwrap();

    assert!(pair.server_sent.iter().all(|d| d.len() <= 256));
    let certificate_fragments = pair
        .server_sent
        .iter()
        .flat_map(|d| handshake_types(d))
        .filter(|t| *t == CERTIFICATE)
        .count();
    assert!(certificate_fragments > 1);
}

#[test]
fn dtls_psk() {
    init_log();
    let store = InMemoryPskStore::new();
    store.insert(b"sensor", b"0123456789abcdef");
    let server = config(|b| {
        b.cipher_suites(&[CipherSuite::PSK_AES128_GCM_SHA256])
            .with_psk_store(Arc::new(store))
    });
    let client = config(|b| {
        b.cipher_suites(&[CipherSuite::PSK_AES128_GCM_SHA256])
            .with_psk(PskCredentials::new(b"sensor", b"0123456789abcdef"))
    });
    let mut pair = Pair::new(client, server);
    pair.run(&mut |_, _| false).unwrap();
    assert_eq!(pair.server.negotiated().psk_identity.as_deref(), Some(&b"sensor"[..]));
}

#[test]
fn close_notify_ends_the_association() {
    init_log();
    let server = config(|b| b.with_credentials(credentials()));
    let mut pair = Pair::new(config(|b| b), server);
    pair.run(&mut |_, _| false).unwrap();

    pair.client.close().unwrap();
    pair.step(&mut |_, _| false).unwrap();
    assert!(pair.server.is_closed());
    assert!(matches!(
        pair.server.send_application_data(b"x"),
        Err(Error::Closed)
    ));
}

#[test]
fn garbage_datagrams_are_dropped() {
    init_log();
    let server = config(|b| b.with_credentials(credentials()));
    let mut pair = Pair::new(config(|b| b), server);
    pair.run(&mut |_, _| false).unwrap();

    pair.server.handle_packet(&[0xff; 40]).unwrap();
    pair.server
        .handle_packet(&[23, 0xfe, 0xfd, 0, 1, 0, 0, 0, 0, 0, 99, 0, 4, 1, 2, 3, 4])
        .unwrap();
    assert!(pair.server.is_connected());
    assert_eq!(pair.client_to_server(b"still fine"), vec![b"still fine".to_vec()]);
}
