//! TLS 1.0 to 1.2 handshakes end to end.

use std::sync::Arc;

use tlscore::{CipherSuite, ClientAuth, Error, InMemoryPskStore, InMemorySessionCache};
use tlscore::{InMemorySrpStore, PskCredentials, ProtocolVersion, SrpCredentials};
use tlscore::{TlsClientProtocol, TlsServerProtocol};

use crate::common::*;

const HANDSHAKE: u8 = 22;
const CHANGE_CIPHER_SPEC: u8 = 20;

#[test]
fn tls12_ecdhe_ecdsa_full_handshake() {
    init_log();
    let server_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .with_credentials(credentials())
    });
    let client_config = config(|b| b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2));

    let (mut client, mut server) = connect(client_config, server_config);

    let negotiated = client.negotiated();
    assert_eq!(negotiated.version, Some(ProtocolVersion::TLSV1_2));
    assert!(matches!(
        negotiated.cipher_suite,
        Some(
            CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256
                | CipherSuite::ECDHE_ECDSA_AES256_GCM_SHA384
        )
    ));
    assert!(negotiated.extended_master_secret);
    assert!(!negotiated.resumed);
    assert!(negotiated.peer_certificate.is_some());

    assert_eq!(send_to_server(&mut client, &mut server, b"hello"), b"hello");
    assert_eq!(send_to_client(&mut client, &mut server, b"world"), b"world");

    // Larger than one record.
    let big: Vec<u8> = (0..40_000u32).map(|i| i as u8).collect();
    assert_eq!(send_to_client(&mut client, &mut server, &big), big);
}

#[test]
fn srp_cbc_over_older_versions() {
    init_log();
    let store = InMemorySrpStore::new();
    store
        .add_user(&provider(), b"alice", b"password123")
        .expect("add user");
    let store = Arc::new(store);

    for version in [ProtocolVersion::TLSV1_0, ProtocolVersion::TLSV1_1, ProtocolVersion::TLSV1_2] {
        let server_config = config(|b| {
            b.versions(ProtocolVersion::TLSV1_0, ProtocolVersion::TLSV1_2)
                .cipher_suites(&[CipherSuite::SRP_SHA_AES128_CBC_SHA])
                .with_srp_store(store.clone())
        });
        let client_config = config(|b| {
            b.versions(version, version)
                .cipher_suites(&[CipherSuite::SRP_SHA_AES128_CBC_SHA])
                .with_srp(SrpCredentials::new(b"alice", b"password123"))
        });

        let (mut client, mut server) = connect(client_config, server_config);
        assert_eq!(server.negotiated().version, Some(version));
        assert_eq!(server.negotiated().srp_identity.as_deref(), Some(&b"alice"[..]));
        // Spans several CBC records.
        let data = vec![0x5a; 20_000];
        assert_eq!(send_to_server(&mut client, &mut server, &data), data);
    }
}

#[test]
fn session_resumption_is_abbreviated() {
    init_log();
    let server_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .with_credentials(credentials())
            .with_session_cache(Arc::new(InMemorySessionCache::new(16)))
    });
    let client_config = config(|b| b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2));

    let (client, _server) = connect(client_config.clone(), server_config.clone());
    let session = client.session().expect("session");
    assert!(session.is_resumable());

    let mut client = TlsClientProtocol::new(client_config, Some(session)).unwrap();
    let mut server = TlsServerProtocol::new(server_config).unwrap();
    client_to_server(&mut client, &mut server).unwrap();

    // ServerHello, ChangeCipherSpec and Finished only.
    let flight = drain(&mut |b| server.read_output(b));
    let types: Vec<u8> = records(&flight).iter().map(|(t, _)| *t).collect();
    assert_eq!(types, [HANDSHAKE, CHANGE_CIPHER_SPEC, HANDSHAKE]);
    client.offer_input(&flight).unwrap();
    client_to_server(&mut client, &mut server).unwrap();

    assert!(client.is_connected() && server.is_connected());
    assert!(client.negotiated().resumed);
    assert!(server.negotiated().resumed);
    assert_eq!(send_to_server(&mut client, &mut server, b"again"), b"again");
}

fn resumption_configs(client_ems: bool) -> (Arc<tlscore::Config>, Arc<tlscore::Config>) {
    let server_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .with_credentials(credentials())
            .with_session_cache(Arc::new(InMemorySessionCache::new(16)))
    });
    let client_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .use_extended_master_secret(client_ems)
    });
    (client_config, server_config)
}

#[test]
fn resuming_ems_session_without_ems_fails() {
    init_log();
    let (client_config, server_config) = resumption_configs(true);
    let (client, _server) = connect(client_config, server_config.clone());
    assert!(client.negotiated().extended_master_secret);
    let session = client.session().expect("session");

    let (plain_config, _) = resumption_configs(false);
    let mut client = TlsClientProtocol::new(plain_config, Some(session)).unwrap();
    let mut server = TlsServerProtocol::new(server_config).unwrap();
    let err = client_to_server(&mut client, &mut server).unwrap_err();
    assert!(matches!(err, Error::HandshakeFailure(_)));
    assert!(server.is_closed());
}

#[test]
fn non_ems_session_offered_with_ems_gets_full_handshake() {
    init_log();
    let (plain_config, server_config) = resumption_configs(false);
    let (client, _server) = connect(plain_config, server_config.clone());
    assert!(!client.negotiated().extended_master_secret);
    let session = client.session().expect("session");

    let (client_config, _) = resumption_configs(true);
    let mut client = TlsClientProtocol::new(client_config, Some(session)).unwrap();
    let mut server = TlsServerProtocol::new(server_config).unwrap();
    handshake(&mut client, &mut server).unwrap();

    assert!(!client.negotiated().resumed);
    assert!(!server.negotiated().resumed);
    assert!(client.negotiated().extended_master_secret);
    assert!(server.negotiated().extended_master_secret);
}

/// Drop the extended_master_secret extension from a flight whose first
/// record holds only a ServerHello.
fn strip_extended_master_secret(flight: &[u8]) -> Vec<u8> {
    let mut out = flight.to_vec();
    let session_id_len = out[5 + 4 + 34] as usize;
    let ext_len_at = 5 + 4 + 34 + 1 + session_id_len + 3;
    let ext_len = u16::from_be_bytes([out[ext_len_at], out[ext_len_at + 1]]) as usize;
    let mut i = ext_len_at + 2;
    let end = i + ext_len;
    while i < end {
        let ty = u16::from_be_bytes([out[i], out[i + 1]]);
        let len = u16::from_be_bytes([out[i + 2], out[i + 3]]) as usize;
        if ty == 0x0017 {
            out.drain(i..i + 4 + len);
            let shrink = |b: &mut [u8]| {
                let n = u16::from_be_bytes([b[0], b[1]]) - 4 - len as u16;
                b.copy_from_slice(&n.to_be_bytes());
            };
            shrink(&mut out[3..5]);
            shrink(&mut out[7..9]);
            shrink(&mut out[ext_len_at..ext_len_at + 2]);
            return out;
        }
        i += 4 + len;
    }
    panic!("no extended_master_secret in ServerHello");
}

#[test]
fn resumed_server_hello_must_keep_ems() {
    init_log();
    let (client_config, server_config) = resumption_configs(true);
    let (client, _server) = connect(client_config.clone(), server_config.clone());
    let session = client.session().expect("session");

    let mut client = TlsClientProtocol::new(client_config, Some(session)).unwrap();
    let mut server = TlsServerProtocol::new(server_config).unwrap();
    client_to_server(&mut client, &mut server).unwrap();
    let flight = drain(&mut |b| server.read_output(b));
    assert_eq!(records(&flight)[0].0, HANDSHAKE);

    let err = client.offer_input(&strip_extended_master_secret(&flight)).unwrap_err();
    assert!(matches!(err, Error::HandshakeFailure(_)));
    assert!(client.is_closed());
}

#[test]
fn downgrade_sentinel_is_illegal_parameter() {
    init_log();
    let server_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_3)
            .with_credentials(credentials())
    });
    // Stands in for an attacker stripping TLS 1.3 from the hello.
    let stripped = config(|b| b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2));
    let capable = config(|b| b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_3));

    let mut stripped = TlsClientProtocol::new(stripped, None).unwrap();
    let mut server = TlsServerProtocol::new(server_config).unwrap();
    client_to_server(&mut stripped, &mut server).unwrap();
    let server_flight = drain(&mut |b| server.read_output(b));

    let mut client = TlsClientProtocol::new(capable, None).unwrap();
    drain(&mut |b| client.read_output(b));
    let result = client.offer_input(&server_flight);
    assert!(matches!(result, Err(Error::IllegalParameter(_))), "{:?}", result);
    assert!(client.is_closed());
}

#[test]
fn dh_anon_end_to_end() {
    init_log();
    let anon = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .cipher_suites(&[CipherSuite::DH_ANON_AES256_GCM_SHA384])
    });
    let (mut client, mut server) = connect(anon.clone(), anon);
    assert_eq!(
        client.negotiated().cipher_suite,
        Some(CipherSuite::DH_ANON_AES256_GCM_SHA384)
    );
    assert!(client.negotiated().peer_certificate.is_none());
    assert_eq!(send_to_server(&mut client, &mut server, b"anon"), b"anon");
}

#[test]
fn psk_end_to_end() {
    init_log();
    let store = InMemoryPskStore::new().with_identity_hint(b"hint");
    store.insert(b"device-1", b"0123456789abcdef");
    let server_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .cipher_suites(&[CipherSuite::PSK_AES128_GCM_SHA256])
            .with_psk_store(Arc::new(store))
    });
    let client_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .cipher_suites(&[CipherSuite::PSK_AES128_GCM_SHA256])
            .with_psk(PskCredentials::new(b"device-1", b"0123456789abcdef"))
    });

    let (mut client, mut server) = connect(client_config, server_config);
    assert_eq!(server.negotiated().psk_identity.as_deref(), Some(&b"device-1"[..]));
    assert_eq!(send_to_client(&mut client, &mut server, b"psk"), b"psk");
}

#[test]
fn psk_with_wrong_key_fails() {
    init_log();
    let store = InMemoryPskStore::new();
    store.insert(b"device-1", b"0123456789abcdef");
    let server_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .cipher_suites(&[CipherSuite::PSK_AES128_GCM_SHA256])
            .with_psk_store(Arc::new(store))
    });
    let client_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .cipher_suites(&[CipherSuite::PSK_AES128_GCM_SHA256])
            .with_psk(PskCredentials::new(b"device-1", b"not the right key"))
    });

    let mut client = TlsClientProtocol::new(client_config, None).unwrap();
    let mut server = TlsServerProtocol::new(server_config).unwrap();
    assert!(handshake(&mut client, &mut server).is_err());
    assert!(server.is_closed());
}

#[test]
fn client_authentication() {
    init_log();
    let server_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .with_credentials(credentials())
            .client_auth(ClientAuth::Required)
    });
    let client_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .with_credentials(credentials())
    });

    let (_client, server) = connect(client_config, server_config);
    let peer = server.negotiated().peer_certificate.as_ref().expect("client certificate");
    assert_eq!(peer.entries.len(), 1);
}

#[test]
fn required_client_certificate_missing() {
    init_log();
    let server_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .with_credentials(credentials())
            .client_auth(ClientAuth::Required)
    });
    let client_config = config(|b| b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2));

    let mut client = TlsClientProtocol::new(client_config, None).unwrap();
    let mut server = TlsServerProtocol::new(server_config).unwrap();
    assert!(handshake(&mut client, &mut server).is_err());
    assert!(server.is_closed());
    assert!(!client.is_connected());
}
