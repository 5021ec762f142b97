//! Per-connection session driver
//!
//! Sequences the SOCKS5 control connection through handshake, request,
//! and dispatch to the TCP or UDP relay. Every read and write up to the
//! reply is bounded by the handshake timeout; expiry or a framing error
//! before the request has been read closes the connection silently, while
//! failures after the request always emit exactly one error reply before
//! closing.

use crate::config::ServerConfig;
use crate::error::{ReplyCode, SocksError};
use crate::server::tcp_relay;
use crate::server::udp_relay::UdpAssociation;
use crate::socks::codec;
use crate::socks::consts::*;
use crate::socks::types::{SocksCommand, TargetAddr};
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Drive one accepted control connection to completion.
pub async fn handle_session(
    mut stream: TcpStream,
    config: Arc<ServerConfig>,
) -> Result<(), SocksError> {
    let deadline = config.handshake_timeout();

    // Greeting: VER, NMETHODS, METHODS...
    let mut version = [0u8; 1];
    timed(deadline, stream.read_exact(&mut version)).await?;
    if version[0] != SOCKS_VERSION {
        // No version to echo, close without a reply
        return Err(SocksError::InvalidVersion(version[0]));
    }

    let mut nmethods = [0u8; 1];
    timed(deadline, stream.read_exact(&mut nmethods)).await?;
    let mut methods = vec![0u8; nmethods[0] as usize];
    timed(deadline, stream.read_exact(&mut methods)).await?;

    if !methods.contains(&AUTH_METHOD_NONE) {
        let selection = codec::encode_method_selection(AUTH_METHOD_NOT_ACCEPTABLE);
        let _ = timed(deadline, stream.write_all(&selection)).await;
        return Err(SocksError::NoAcceptableAuth);
    }
    let selection = codec::encode_method_selection(AUTH_METHOD_NONE);
    timed(deadline, stream.write_all(&selection)).await?;

    // Request: VER, CMD, RSV, ATYP, DST.ADDR, DST.PORT
    let mut prefix = [0u8; 4];
    timed(deadline, stream.read_exact(&mut prefix)).await?;
    let (cmd, atyp) = codec::decode_request_prefix(&prefix)?;

    let target = match read_address(&mut stream, atyp, deadline).await {
        Ok(target) => target,
        Err(SocksError::UnsupportedAddressType(atyp)) => {
            send_reply(&mut stream, ReplyCode::AddressTypeNotSupported, None, deadline).await?;
            return Err(SocksError::UnsupportedAddressType(atyp));
        }
        Err(e) => return Err(e),
    };

    match SocksCommand::from_byte(cmd) {
        Some(SocksCommand::Connect) => {
            debug!("CONNECT request for {}", target);
            handle_connect(stream, target, &config).await
        }
        Some(SocksCommand::UdpAssociate) => {
            debug!("UDP ASSOCIATE request");
            handle_udp_associate(stream, &config).await
        }
        _ => {
            send_reply(&mut stream, ReplyCode::CommandNotSupported, None, deadline).await?;
            Err(SocksError::UnsupportedCommand(cmd))
        }
    }
}

/// Connect to the resolved target, confirm to the client, and relay.
async fn handle_connect(
    mut stream: TcpStream,
    target: TargetAddr,
    config: &ServerConfig,
) -> Result<(), SocksError> {
    let deadline = config.handshake_timeout();

    let resolved = match tokio::time::timeout(deadline, target.resolve()).await {
        Ok(Ok(endpoint)) => endpoint,
        _ => {
            send_reply(&mut stream, ReplyCode::HostUnreachable, None, deadline).await?;
            return Err(SocksError::ConnectionFailed);
        }
    };

    let target_stream = match tokio::time::timeout(deadline, TcpStream::connect(resolved)).await {
        Ok(Ok(target_stream)) => target_stream,
        _ => {
            send_reply(&mut stream, ReplyCode::ConnectionRefused, None, deadline).await?;
            return Err(SocksError::ConnectionFailed);
        }
    };

    let bound = target_stream.local_addr().ok();
    send_reply(&mut stream, ReplyCode::Succeeded, bound, deadline).await?;
    info!("tunnel established to {}", resolved);

    tcp_relay::relay(stream, target_stream, config.idle_timeout()).await;
    Ok(())
}

/// Bind a UDP relay socket, confirm its endpoint to the client, and run the
/// association until the control connection goes away.
async fn handle_udp_associate(
    mut stream: TcpStream,
    config: &ServerConfig,
) -> Result<(), SocksError> {
    let deadline = config.handshake_timeout();

    let (local_ip, client_ip) = match (stream.local_addr(), stream.peer_addr()) {
        (Ok(local), Ok(peer)) => (local.ip(), peer.ip()),
        _ => {
            send_reply(&mut stream, ReplyCode::GeneralFailure, None, deadline).await?;
            return Err(SocksError::ConnectionFailed);
        }
    };

    let association = match UdpAssociation::bind(local_ip, client_ip).await {
        Ok(association) => association,
        Err(e) => {
            send_reply(&mut stream, ReplyCode::GeneralFailure, None, deadline).await?;
            return Err(SocksError::Io(e));
        }
    };

    let bound = association.local_addr().ok();
    send_reply(&mut stream, ReplyCode::Succeeded, bound, deadline).await?;
    info!("UDP association for {} bound on {:?}", client_ip, bound);

    association.run(&mut stream).await;
    Ok(())
}

/// Read the address and port fields of a request frame.
async fn read_address(
    stream: &mut TcpStream,
    atyp: u8,
    deadline: Duration,
) -> Result<TargetAddr, SocksError> {
    match atyp {
        ATYP_IPV4 => {
            let mut octets = [0u8; 4];
            timed(deadline, stream.read_exact(&mut octets)).await?;
            let port = read_port(stream, deadline).await?;
            Ok(TargetAddr::ipv4(octets.into(), port))
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            timed(deadline, stream.read_exact(&mut len)).await?;
            if len[0] == 0 {
                return Err(SocksError::InvalidFormat(
                    "zero-length domain".to_string(),
                ));
            }
            let mut domain = vec![0u8; len[0] as usize];
            timed(deadline, stream.read_exact(&mut domain)).await?;
            let domain = String::from_utf8(domain)
                .map_err(|_| SocksError::InvalidFormat("domain is not UTF-8".to_string()))?;
            let port = read_port(stream, deadline).await?;
            Ok(TargetAddr::domain(domain, port))
        }
        ATYP_IPV6 => {
            let mut octets = [0u8; 16];
            timed(deadline, stream.read_exact(&mut octets)).await?;
            let port = read_port(stream, deadline).await?;
            Ok(TargetAddr::ipv6(octets.into(), port))
        }
        other => Err(SocksError::UnsupportedAddressType(other)),
    }
}

async fn read_port(stream: &mut TcpStream, deadline: Duration) -> Result<u16, SocksError> {
    let mut port = [0u8; 2];
    timed(deadline, stream.read_exact(&mut port)).await?;
    Ok(u16::from_be_bytes(port))
}

/// Send a reply frame within the handshake deadline. Error replies carry
/// the fixed `0.0.0.0:0` placeholder.
async fn send_reply(
    stream: &mut TcpStream,
    code: ReplyCode,
    bound: Option<SocketAddr>,
    deadline: Duration,
) -> Result<(), SocksError> {
    let bound =
        bound.unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));
    let reply = codec::encode_reply(code, bound);
    timed(deadline, stream.write_all(&reply)).await?;
    Ok(())
}

/// Bound an I/O operation by the handshake deadline.
async fn timed<T>(
    deadline: Duration,
    operation: impl Future<Output = io::Result<T>>,
) -> Result<T, SocksError> {
    match tokio::time::timeout(deadline, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(SocksError::Io(e)),
        Err(_) => Err(SocksError::Timeout),
    }
}
