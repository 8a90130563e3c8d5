//! Loss, duplication and timeouts.

use std::time::Duration;

use tlscore::{DtlsClientProtocol, Error};

use crate::common::*;

#[test]
fn lost_first_server_flight_resends_client_hello() {
    init_log();
    let server = config(|b| b.with_credentials(credentials()).dtls_cookie_exchange(false));
    let mut pair = Pair::new(config(|b| b), server);
    pair.run(&mut |from_server, index| from_server && index == 0).unwrap();

    let hellos = pair
        .client_sent
        .iter()
        .filter(|d| handshake_types(d).first() == Some(&CLIENT_HELLO))
        .count();
    assert!(hellos >= 2, "ClientHello was not resent");
    assert_eq!(pair.client_to_server(b"recovered"), vec![b"recovered".to_vec()]);
}

#[test]
fn lost_hello_verify_request() {
    init_log();
    let server = config(|b| b.with_credentials(credentials()));
    let mut pair = Pair::new(config(|b| b), server);
    pair.run(&mut |from_server, index| from_server && index == 0).unwrap();
    assert_eq!(handshake_types(&pair.server_sent[1]), [HELLO_VERIFY_REQUEST]);
}

#[test]
fn lost_client_finished_flight() {
    init_log();
    let server = config(|b| b.with_credentials(credentials()).dtls_cookie_exchange(false));
    let mut pair = Pair::new(config(|b| b), server);
    // The client's second flight is its first datagram after the hello.
    pair.run(&mut |from_server, index| !from_server && index == 1).unwrap();
    assert_eq!(pair.client_to_server(b"ok"), vec![b"ok".to_vec()]);
}

#[test]
fn duplicated_datagrams_are_harmless() {
    init_log();
    let server = config(|b| b.with_credentials(credentials()));
    let mut pair = Pair::new(config(|b| b), server);
    pair.run(&mut |_, _| false).unwrap();

    // Replay everything each side sent.
    for d in pair.client_sent.clone() {
        pair.server.handle_packet(&d).unwrap();
    }
    for d in pair.server_sent.clone() {
        pair.client.handle_packet(&d).unwrap();
    }
    assert!(pair.client.is_connected() && pair.server.is_connected());
    // A replayed record must not be delivered twice.
    assert_eq!(pair.client_to_server(b"once"), vec![b"once".to_vec()]);
}

#[test]
fn unanswered_client_times_out() {
    init_log();
    let client = config(|b| b.flight_retries(3).handshake_timeout(Duration::from_secs(60)));
    let mut client = DtlsClientProtocol::new(client, None).unwrap();
    let mut now = std::time::Instant::now();

    let mut sent = 0;
    let mut result = Ok(());
    for _ in 0..200 {
        result = client.handle_timeout(now);
        if result.is_err() {
            break;
        }
        sent += drain(&mut |b| client.poll_output(b)).packets.len();
        now += Duration::from_millis(500);
    }
    assert!(matches!(result, Err(Error::Timeout(_))), "{:?}", result);
    // The hello and three retries.
    assert_eq!(sent, 4);
    assert!(client.is_closed());
}

#[test]
fn handshake_deadline() {
    init_log();
    let client = config(|b| b.flight_retries(100).handshake_timeout(Duration::from_secs(5)));
    let mut client = DtlsClientProtocol::new(client, None).unwrap();
    let start = std::time::Instant::now();
    client.handle_timeout(start).unwrap();
    drain(&mut |b| client.poll_output(b));
    let result = client.handle_timeout(start + Duration::from_secs(6));
    assert!(matches!(result, Err(Error::Timeout("connect"))), "{:?}", result);
}
