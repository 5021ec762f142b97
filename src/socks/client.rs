//! SOCKS5 client helper
//!
//! Drives the client side of the unauthenticated CONNECT handshake so that
//! arbitrary code can tunnel a TCP stream through a SOCKS5 proxy. Only the
//! NO_AUTH method and the CONNECT command are supported.

use super::consts::*;
use super::types::TargetAddr;
use crate::error::{ReplyCode, SocksError};
use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Connect to `proxy` and tunnel to `target_host:target_port` through it.
///
/// On success the returned stream carries opaque TCP data to and from the
/// target.
pub async fn connect(
    proxy: SocketAddr,
    target_host: &str,
    target_port: u16,
) -> Result<TcpStream, SocksError> {
    let mut stream = TcpStream::connect(proxy).await?;
    handshake(&mut stream, target_host, target_port).await?;
    Ok(stream)
}

/// Run the CONNECT handshake on an already-established proxy connection.
///
/// `target_host` is encoded as an IPv4/IPv6 address when it parses as an
/// IP literal and as a domain name otherwise; domain names longer than 255
/// bytes cannot be encoded and fail with [`SocksError::InvalidFormat`].
pub async fn handshake<S>(
    stream: &mut S,
    target_host: &str,
    target_port: u16,
) -> Result<(), SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Validate the target before touching the wire
    let target = encode_target(target_host, target_port)?;

    // Greeting: we offer NO_AUTH only
    stream
        .write_all(&[SOCKS_VERSION, 1, AUTH_METHOD_NONE])
        .await?;

    let mut selection = [0u8; 2];
    stream.read_exact(&mut selection).await?;
    if selection[0] != SOCKS_VERSION {
        return Err(SocksError::InvalidVersion(selection[0]));
    }
    if selection[1] != AUTH_METHOD_NONE {
        return Err(SocksError::NoAcceptableAuth);
    }

    let mut request = vec![SOCKS_VERSION, CMD_CONNECT, RESERVED];
    request.extend_from_slice(&target.to_bytes());
    stream.write_all(&request).await?;

    // Reply: VER, REP, RSV, ATYP followed by the bound address
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    if header[0] != SOCKS_VERSION {
        return Err(SocksError::InvalidVersion(header[0]));
    }
    if header[1] != u8::from(ReplyCode::Succeeded) {
        debug!(
            "proxy refused request: {:?}",
            ReplyCode::try_from(header[1]).ok()
        );
        return Err(SocksError::ConnectionFailed);
    }

    drain_bound_address(stream, header[3]).await?;
    Ok(())
}

/// Pick the wire encoding for the target host.
fn encode_target(target_host: &str, target_port: u16) -> Result<TargetAddr, SocksError> {
    if let Ok(ip) = target_host.parse::<IpAddr>() {
        return Ok(TargetAddr::Ip(SocketAddr::new(ip, target_port)));
    }
    if target_host.is_empty() || target_host.len() > MAX_DOMAIN_LEN {
        return Err(SocksError::InvalidFormat(format!(
            "domain length {} out of range",
            target_host.len()
        )));
    }
    Ok(TargetAddr::domain(target_host.to_string(), target_port))
}

/// Consume the BND.ADDR and BND.PORT fields so the stream is positioned at
/// the start of tunneled data.
async fn drain_bound_address<S>(stream: &mut S, atyp: u8) -> Result<(), SocksError>
where
    S: AsyncRead + Unpin,
{
    match atyp {
        ATYP_IPV4 => {
            let mut rest = [0u8; 6];
            stream.read_exact(&mut rest).await?;
        }
        ATYP_IPV6 => {
            let mut rest = [0u8; 18];
            stream.read_exact(&mut rest).await?;
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let mut rest = vec![0u8; len[0] as usize + 2];
            stream.read_exact(&mut rest).await?;
        }
        other => return Err(SocksError::UnsupportedAddressType(other)),
    }
    Ok(())
}
