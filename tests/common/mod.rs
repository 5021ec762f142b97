//! Shared fixtures for Soxide integration tests

#![allow(dead_code)]

use soxide::{Server, ServerConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;

/// Deadline for every test read; anything slower is a failure.
pub const READ_DEADLINE: Duration = Duration::from_secs(2);

/// Start a proxy server on a loopback ephemeral port.
pub async fn start_proxy() -> SocketAddr {
    let config = ServerConfig {
        bind_ip: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    };
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    server.start();
    addr
}

/// Start a TCP echo server; every accepted connection echoes until EOF.
pub async fn start_tcp_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => break,
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    addr
}

/// Start a UDP echo server that answers each datagram to its sender.
pub async fn start_udp_echo() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 65535];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((n, from)) => {
                    let _ = socket.send_to(&buf[..n], from).await;
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Bind a TCP port and immediately release it, yielding a port that
/// refuses connections.
pub async fn closed_tcp_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Build a greeting frame offering the given methods.
pub fn greeting(methods: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x05, methods.len() as u8];
    frame.extend_from_slice(methods);
    frame
}

/// Build a CONNECT request for an IPv4 target.
pub fn connect_request_ipv4(ip: [u8; 4], port: u16) -> Vec<u8> {
    let mut request = vec![0x05, 0x01, 0x00, 0x01];
    request.extend_from_slice(&ip);
    request.extend_from_slice(&port.to_be_bytes());
    request
}

/// Build a CONNECT request for a domain target.
pub fn connect_request_domain(domain: &str, port: u16) -> Vec<u8> {
    let mut request = vec![0x05, 0x01, 0x00, 0x03, domain.len() as u8];
    request.extend_from_slice(domain.as_bytes());
    request.extend_from_slice(&port.to_be_bytes());
    request
}

/// Build a UDP ASSOCIATE request with the customary all-zero address.
pub fn udp_associate_request() -> Vec<u8> {
    vec![0x05, 0x03, 0x00, 0x01, 0, 0, 0, 0, 0, 0]
}

/// Build an encapsulated UDP datagram addressed to an IPv4 destination.
pub fn udp_datagram_ipv4(dest: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let ip = match dest.ip() {
        std::net::IpAddr::V4(ip) => ip,
        other => panic!("expected IPv4 destination, got {other}"),
    };
    let mut datagram = vec![0x00, 0x00, 0x00, 0x01];
    datagram.extend_from_slice(&ip.octets());
    datagram.extend_from_slice(&dest.port().to_be_bytes());
    datagram.extend_from_slice(payload);
    datagram
}

/// Run the NO_AUTH greeting exchange and assert the server selects it.
pub async fn no_auth_handshake(stream: &mut TcpStream) {
    stream.write_all(&greeting(&[0x00])).await.unwrap();

    let mut selection = [0u8; 2];
    read_exact(stream, &mut selection).await;
    assert_eq!(selection, [0x05, 0x00]);
}

/// `read_exact` with the test deadline applied.
pub async fn read_exact(stream: &mut TcpStream, buf: &mut [u8]) {
    timeout(READ_DEADLINE, stream.read_exact(buf))
        .await
        .expect("read timed out")
        .expect("read failed");
}
