//! Negotiated hello extensions.

use tlscore::message::MaxFragmentLength;
use tlscore::{ProtocolVersion, TlsClientProtocol, TlsServerProtocol};

use crate::common::*;

#[test]
fn ocsp_response_is_stapled() {
    init_log();
    for version in [ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_3] {
        let server_config = config(|b| {
            b.versions(version, version)
                .with_credentials(credentials())
                .ocsp_response(vec![0x30, 0x03, 0x0a, 0x01, 0x00])
        });
        let client_config = config(|b| b.versions(version, version).status_request(true));
        let (client, _server) = connect(client_config, server_config);
        assert_eq!(
            client.negotiated().ocsp_response.as_deref(),
            Some(&[0x30, 0x03, 0x0a, 0x01, 0x00][..]),
            "{:?}",
            version
        );
    }
}

#[test]
fn no_status_request_no_staple() {
    init_log();
    let server_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .with_credentials(credentials())
            .ocsp_response(vec![1, 2, 3])
    });
    let client_config = config(|b| b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2));
    let (client, _server) = connect(client_config, server_config);
    assert!(client.negotiated().ocsp_response.is_none());
}

#[test]
fn max_fragment_length_limits_records() {
    init_log();
    let server_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .with_credentials(credentials())
    });
    let client_config = config(|b| {
        b.versions(ProtocolVersion::TLSV1_2, ProtocolVersion::TLSV1_2)
            .max_fragment_length(MaxFragmentLength::Bytes512)
    });
    let (mut client, mut server) = connect(client_config, server_config);
    assert_eq!(
        server.negotiated().max_fragment_length,
        Some(MaxFragmentLength::Bytes512)
    );

    let data = vec![7; 3000];
    server.write_application_data(&data).unwrap();
    let out = drain(&mut |b| server.read_output(b));
    let lengths = records(&out);
    assert!(lengths.len() >= 6);
    // Plaintext limit plus the AEAD nonce and tag.
    assert!(lengths.iter().all(|(_, len)| *len <= 512 + 8 + 16), "{:?}", lengths);

    client.offer_input(&out).unwrap();
    assert_eq!(read_all(&mut |b| client.read_application_data(b)), data);
}

#[test]
fn server_name_reaches_the_server() {
    init_log();
    let server_config = config(|b| b.with_credentials(credentials()));
    let client_config = config(|b| b.server_name("tlscore.local"));
    let mut client = TlsClientProtocol::new(client_config, None).unwrap();
    let mut server = TlsServerProtocol::new(server_config).unwrap();
    handshake(&mut client, &mut server).unwrap();
    assert_eq!(server.negotiated().server_name.as_deref(), Some("tlscore.local"));
}
