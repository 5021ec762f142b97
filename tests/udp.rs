//! End-to-end UDP ASSOCIATE tests
//!
//! Runs real UDP associations against the proxy: encapsulated requests
//! out, wrapped responses back, and teardown bound to the control
//! connection.

mod common;

use common::*;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

/// Run the UDP ASSOCIATE handshake and return the control stream plus the
/// relay endpoint from the reply.
async fn udp_associate(proxy: SocketAddr) -> (TcpStream, SocketAddr) {
    let mut control = TcpStream::connect(proxy).await.unwrap();
    no_auth_handshake(&mut control).await;

    control.write_all(&udp_associate_request()).await.unwrap();

    let mut reply = [0u8; 10];
    read_exact(&mut control, &mut reply).await;
    assert_eq!(reply[0], 0x05);
    assert_eq!(reply[1], 0x00);
    assert_eq!(reply[3], 0x01); // loopback control, so an IPv4 bound address

    let ip = std::net::Ipv4Addr::new(reply[4], reply[5], reply[6], reply[7]);
    let port = u16::from_be_bytes([reply[8], reply[9]]);
    assert_ne!(port, 0);

    (control, SocketAddr::new(ip.into(), port))
}

#[tokio::test]
async fn test_udp_associate_echo() {
    let proxy = start_proxy().await;
    let echo = start_udp_echo().await;
    let (_control, relay) = udp_associate(proxy).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(&udp_datagram_ipv4(echo, b"Hello UDP"), relay)
        .await
        .unwrap();

    let mut buf = [0u8; 1024];
    let (n, from) = timeout(READ_DEADLINE, client.recv_from(&mut buf))
        .await
        .expect("no reply from the relay")
        .unwrap();
    assert_eq!(from, relay);

    // RSV, RSV, FRAG, ATYP=IPv4, then the echo server's endpoint
    assert_eq!(&buf[..4], &[0x00, 0x00, 0x00, 0x01]);
    assert_eq!(&buf[4..8], &[127, 0, 0, 1]);
    assert_eq!(u16::from_be_bytes([buf[8], buf[9]]), echo.port());
    assert_eq!(&buf[10..n], b"Hello UDP");
}

#[tokio::test]
async fn test_udp_multiple_datagrams_reuse_association() {
    let proxy = start_proxy().await;
    let echo = start_udp_echo().await;
    let (_control, relay) = udp_associate(proxy).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut buf = [0u8; 1024];

    // Same destination each time, so the resolution cache stays hot
    for i in 0..5u8 {
        let payload = vec![i; 32];
        client
            .send_to(&udp_datagram_ipv4(echo, &payload), relay)
            .await
            .unwrap();

        let (n, _) = timeout(READ_DEADLINE, client.recv_from(&mut buf))
            .await
            .expect("no reply from the relay")
            .unwrap();
        assert_eq!(&buf[10..n], &payload[..]);
    }
}

#[tokio::test]
async fn test_udp_zero_payload_forwarded() {
    let proxy = start_proxy().await;
    let (_control, relay) = udp_associate(proxy).await;

    // Raw target so we can observe the exact forwarded datagram
    let target = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target_addr = target.local_addr().unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(&udp_datagram_ipv4(target_addr, b""), relay)
        .await
        .unwrap();

    let mut buf = [0u8; 64];
    let (n, from) = timeout(READ_DEADLINE, target.recv_from(&mut buf))
        .await
        .expect("zero-payload datagram was not forwarded")
        .unwrap();
    assert_eq!(n, 0);
    assert_eq!(from, relay);
}

#[tokio::test]
async fn test_udp_fragmented_datagram_dropped() {
    let proxy = start_proxy().await;
    let (_control, relay) = udp_associate(proxy).await;

    let target = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target_addr = target.local_addr().unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut datagram = udp_datagram_ipv4(target_addr, b"fragment");
    datagram[2] = 0x01;
    client.send_to(&datagram, relay).await.unwrap();

    let mut buf = [0u8; 64];
    let received = timeout(Duration::from_millis(300), target.recv_from(&mut buf)).await;
    assert!(received.is_err(), "fragmented datagram must be dropped");
}

#[tokio::test]
async fn test_udp_malformed_datagram_dropped() {
    let proxy = start_proxy().await;
    let (_control, relay) = udp_associate(proxy).await;

    let target = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target_addr = target.local_addr().unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    // Nonzero reserved bytes
    let mut datagram = udp_datagram_ipv4(target_addr, b"bad rsv");
    datagram[0] = 0xFF;
    client.send_to(&datagram, relay).await.unwrap();

    // Shorter than any valid header
    client.send_to(&[0x00, 0x00, 0x00], relay).await.unwrap();

    let mut buf = [0u8; 64];
    let received = timeout(Duration::from_millis(300), target.recv_from(&mut buf)).await;
    assert!(received.is_err(), "malformed datagrams must be dropped");

    // The association still works for a valid datagram afterwards
    client
        .send_to(&udp_datagram_ipv4(target_addr, b"ok"), relay)
        .await
        .unwrap();
    let (n, _) = timeout(READ_DEADLINE, target.recv_from(&mut buf))
        .await
        .expect("valid datagram after malformed ones was not forwarded")
        .unwrap();
    assert_eq!(&buf[..n], b"ok");
}

#[tokio::test]
async fn test_udp_association_torn_down_with_control() {
    let proxy = start_proxy().await;
    let (control, relay) = udp_associate(proxy).await;

    let target = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target_addr = target.local_addr().unwrap();

    // Closing the control connection ends the association
    drop(control);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let _ = client
        .send_to(&udp_datagram_ipv4(target_addr, b"late"), relay)
        .await;

    let mut buf = [0u8; 64];
    let received = timeout(Duration::from_millis(300), target.recv_from(&mut buf)).await;
    assert!(
        received.is_err(),
        "datagram must not be forwarded after the control connection closed"
    );
}

#[tokio::test]
async fn test_udp_domain_destination() {
    let proxy = start_proxy().await;
    let echo = start_udp_echo().await;
    let (_control, relay) = udp_associate(proxy).await;

    // Destination as a numeric domain name; resolved by direct parse
    let host = b"127.0.0.1";
    let mut datagram = vec![0x00, 0x00, 0x00, 0x03, host.len() as u8];
    datagram.extend_from_slice(host);
    datagram.extend_from_slice(&echo.port().to_be_bytes());
    datagram.extend_from_slice(b"named");

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(&datagram, relay).await.unwrap();

    let mut buf = [0u8; 1024];
    let (n, _) = timeout(READ_DEADLINE, client.recv_from(&mut buf))
        .await
        .expect("no reply for domain-addressed datagram")
        .unwrap();
    assert_eq!(&buf[10..n], b"named");
}
