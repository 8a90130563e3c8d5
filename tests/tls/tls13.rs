//! TLS 1.3 handshakes, key update and tickets.

use tlscore::message::{Extensions, NewSessionTicket};
use tlscore::types::Random;
use tlscore::{ClientAuth, NamedGroup, ProtocolVersion, TlsClientProtocol, TlsServerProtocol};

use crate::common::*;

fn tls13_server() -> std::sync::Arc<tlscore::Config> {
    config(|b| {
        b.versions(ProtocolVersion::TLSV1_3, ProtocolVersion::TLSV1_3)
            .with_credentials(credentials())
    })
}

fn is_hello_retry_request(flight: &[u8]) -> bool {
    // Record header, handshake header, legacy_version, then the random.
    flight.len() > 43 && flight[11..43] == Random::HELLO_RETRY_REQUEST.as_bytes()[..]
}

#[test]
fn tls13_handshake() {
    init_log();
    let client_config = config(|b| b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_3));
    let mut client = TlsClientProtocol::new(client_config, None).unwrap();
    let mut server = TlsServerProtocol::new(tls13_server()).unwrap();

    client_to_server(&mut client, &mut server).unwrap();
    let flight = drain(&mut |b| server.read_output(b));
    assert!(!is_hello_retry_request(&flight));
    client.offer_input(&flight).unwrap();
    assert!(client.is_connected());
    client_to_server(&mut client, &mut server).unwrap();
    assert!(server.is_connected());

    assert_eq!(client.negotiated().version, Some(ProtocolVersion::TLSV1_3));
    assert!(client.negotiated().peer_certificate.is_some());
    assert_eq!(send_to_server(&mut client, &mut server, b"ping"), b"ping");
    assert_eq!(send_to_client(&mut client, &mut server, b"pong"), b"pong");
}

#[test]
fn tls13_hello_retry_request() {
    init_log();
    // The client's first key share is X25519, the server only takes P-256.
    let client_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_3, ProtocolVersion::TLSV1_3)
            .groups(&[NamedGroup::X25519, NamedGroup::Secp256r1])
    });
    let server_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_3, ProtocolVersion::TLSV1_3)
            .groups(&[NamedGroup::Secp256r1])
            .with_credentials(credentials())
    });
    let mut client = TlsClientProtocol::new(client_config, None).unwrap();
    let mut server = TlsServerProtocol::new(server_config).unwrap();

    client_to_server(&mut client, &mut server).unwrap();
    let flight = drain(&mut |b| server.read_output(b));
    assert!(is_hello_retry_request(&flight));
    client.offer_input(&flight).unwrap();

    handshake(&mut client, &mut server).unwrap();
    assert_eq!(client.negotiated().version, Some(ProtocolVersion::TLSV1_3));
    assert_eq!(send_to_server(&mut client, &mut server, b"after retry"), b"after retry");
}

#[test]
fn tls13_key_update() {
    init_log();
    let client_config = config(|b| b.versions(ProtocolVersion::TLSV1_3, ProtocolVersion::TLSV1_3));
    let (mut client, mut server) = connect(client_config, tls13_server());

    client.request_key_update(true).unwrap();
    client_to_server(&mut client, &mut server).unwrap();
    // The server answers the request with its own update.
    assert!(server.available_output_bytes() > 0);
    server_to_client(&mut client, &mut server).unwrap();

    for round in 0..3 {
        let message = format!("round {}", round);
        let message = message.as_bytes();
        assert_eq!(send_to_server(&mut client, &mut server, message), message);
        assert_eq!(send_to_client(&mut client, &mut server, message), message);
    }

    server.request_key_update(false).unwrap();
    server_to_client(&mut client, &mut server).unwrap();
    // Not requested, so no answer.
    assert_eq!(client.available_output_bytes(), 0);
    assert_eq!(send_to_client(&mut client, &mut server, b"rotated"), b"rotated");
}

#[test]
fn tls13_tickets_are_recorded() {
    init_log();
    let client_config = config(|b| b.versions(ProtocolVersion::TLSV1_3, ProtocolVersion::TLSV1_3));
    let (mut client, mut server) = connect(client_config, tls13_server());

    let ticket = NewSessionTicket {
        lifetime: 3600,
        age_add: 7,
        nonce: vec![0],
        ticket: b"opaque ticket".to_vec(),
        extensions: Extensions::new(),
    };
    server.send_new_session_ticket(&ticket).unwrap();
    server_to_client(&mut client, &mut server).unwrap();

    assert_eq!(client.received_tickets(), &[ticket][..]);
    assert!(client.is_connected());
}

#[test]
fn tls13_client_authentication() {
    init_log();
    let server_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_3, ProtocolVersion::TLSV1_3)
            .with_credentials(credentials())
            .client_auth(ClientAuth::Required)
    });
    let client_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_3, ProtocolVersion::TLSV1_3)
            .with_credentials(credentials())
    });
    let (_client, server) = connect(client_config, server_config);
    assert!(server.negotiated().peer_certificate.is_some());
}
