//! Alert propagation and connection teardown.

use tlscore::{AlertDescription, CipherSuite, Error, ProtocolVersion};
use tlscore::{TlsClientProtocol, TlsServerProtocol};

use crate::common::*;

#[test]
fn no_shared_suite_alerts_the_client() {
    init_log();
    let server_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .cipher_suites(&[CipherSuite::DH_ANON_AES128_GCM_SHA256])
    });
    let client_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .cipher_suites(&[CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256])
    });
    let mut client = TlsClientProtocol::new(client_config, None).unwrap();
    let mut server = TlsServerProtocol::new(server_config).unwrap();

    let result = client_to_server(&mut client, &mut server);
    assert!(matches!(result, Err(Error::HandshakeFailure(_))), "{:?}", result);

    let result = server_to_client(&mut client, &mut server);
    assert!(
        matches!(result, Err(Error::PeerAlert(AlertDescription::HandshakeFailure))),
        "{:?}",
        result
    );
    assert!(client.is_closed());
    // The client does not answer a fatal alert with another.
    assert_eq!(client.available_output_bytes(), 0);
}

#[test]
fn version_mismatch_is_protocol_version() {
    init_log();
    let server_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_3, ProtocolVersion::TLSV1_3)
            .with_credentials(credentials())
    });
    let client_config = config(|b| b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2));
    let mut client = TlsClientProtocol::new(client_config, None).unwrap();
    let mut server = TlsServerProtocol::new(server_config).unwrap();

    assert!(matches!(
        client_to_server(&mut client, &mut server),
        Err(Error::ProtocolVersion(_))
    ));
    assert!(matches!(
        server_to_client(&mut client, &mut server),
        Err(Error::PeerAlert(AlertDescription::ProtocolVersion))
    ));
}

#[test]
fn tampered_record_is_bad_record_mac() {
    init_log();
    let anon = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .cipher_suites(&[CipherSuite::DH_ANON_AES128_GCM_SHA256])
    });
    let (mut client, mut server) = connect(anon.clone(), anon);

    client.write_application_data(b"secret").unwrap();
    let mut record = drain(&mut |b| client.read_output(b));
    let last = record.len() - 1;
    record[last] ^= 1;
    assert!(matches!(server.offer_input(&record), Err(Error::BadRecordMac)));
    assert!(server.is_closed());
}

#[test]
fn close_notify_both_ways() {
    init_log();
    let anon = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .cipher_suites(&[CipherSuite::DH_ANON_AES128_GCM_SHA256])
    });
    let (mut client, mut server) = connect(anon.clone(), anon);

    server.write_application_data(b"last words").unwrap();
    server.close().unwrap();
    server_to_client(&mut client, &mut server).unwrap();

    // Data before close_notify is still delivered.
    assert_eq!(read_all(&mut |b| client.read_application_data(b)), b"last words");
    assert!(client.is_closed());
    assert!(matches!(client.write_application_data(b"x"), Err(Error::Closed)));
}
