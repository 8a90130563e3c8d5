//! Blocking `DtlsTransport` over UDP.

use std::thread;
use std::time::Duration;

use tlscore::{DtlsTransport, ProtocolVersion};

use crate::common::*;

#[test]
fn dtls_transport_echo() {
    init_log();
    let (client_udp, server_udp) = udp_pair(1200);

    let server_config = config(|b| b.with_credentials(credentials()));
    let server = thread::spawn(move || {
        let mut dtls = DtlsTransport::accept(server_config, server_udp).unwrap();
        let mut buf = [0; 1500];
        let n = dtls
            .receive(&mut buf, Duration::from_secs(10))
            .unwrap()
            .expect("a datagram");
        dtls.send(&buf[..n]).unwrap();
        // Serve the client's close_notify.
        let _ = dtls.receive(&mut buf, Duration::from_secs(2));
    });

    let mut dtls = DtlsTransport::connect(config(|b| b), client_udp, None).unwrap();
    assert_eq!(dtls.negotiated().version, Some(ProtocolVersion::DTLSV1_2));
    dtls.send(b"echo").unwrap();

    let mut buf = [0; 1500];
    let n = dtls
        .receive(&mut buf, Duration::from_secs(10))
        .unwrap()
        .expect("echo");
    assert_eq!(&buf[..n], b"echo");
    dtls.close().unwrap();
    server.join().unwrap();
}

#[test]
fn receive_times_out_quietly() {
    init_log();
    let (client_udp, server_udp) = udp_pair(1200);
    let server_config = config(|b| b.with_credentials(credentials()));
    let server = thread::spawn(move || {
        let mut dtls = DtlsTransport::accept(server_config, server_udp).unwrap();
        let mut buf = [0; 1500];
        // Keep answering retransmissions until the client is done.
        let _ = dtls.receive(&mut buf, Duration::from_secs(2));
    });

    let mut dtls = DtlsTransport::connect(config(|b| b), client_udp, None).unwrap();
    let mut buf = [0; 1500];
    let received = dtls.receive(&mut buf, Duration::from_millis(100)).unwrap();
    assert_eq!(received, None);
    server.join().unwrap();
}
