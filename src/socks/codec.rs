//! SOCKS5 wire codec
//!
//! Pure encode/decode for the protocol frames: greeting, method selection,
//! request prefix, addresses, replies, and the UDP encapsulation header.
//! No I/O happens here; the session driver and relays feed byte slices in
//! and write the produced buffers out.

use super::consts::*;
use super::types::TargetAddr;
use crate::error::{ReplyCode, SocksError};
use bytes::{BufMut, BytesMut};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

/// Decoded UDP encapsulation header.
///
/// ```text
/// +----+------+------+----------+----------+----------+
/// |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
/// +----+------+------+----------+----------+----------+
/// | 2  |  1   |  1   | Variable |    2     | Variable |
/// +----+------+------+----------+----------+----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpHeader {
    /// Fragment number (0 for standalone datagrams)
    pub frag: u8,
    /// Destination carried in the header
    pub dest: TargetAddr,
    /// Total header length; the payload starts at this offset
    pub header_len: usize,
}

impl UdpHeader {
    /// Whether this datagram is part of a fragment sequence
    pub fn is_fragmented(&self) -> bool {
        self.frag != 0
    }
}

/// Decode a client greeting (VER, NMETHODS, METHODS...) into the offered
/// method list.
pub fn decode_greeting(buf: &[u8]) -> Result<Vec<u8>, SocksError> {
    if buf.len() < 2 {
        return Err(SocksError::InvalidFormat("truncated greeting".to_string()));
    }
    if buf[0] != SOCKS_VERSION {
        return Err(SocksError::InvalidVersion(buf[0]));
    }
    let nmethods = buf[1] as usize;
    if buf.len() < 2 + nmethods {
        return Err(SocksError::InvalidFormat(
            "greeting shorter than method count".to_string(),
        ));
    }
    Ok(buf[2..2 + nmethods].to_vec())
}

/// Encode the server's method selection frame.
pub fn encode_method_selection(method: u8) -> [u8; 2] {
    [SOCKS_VERSION, method]
}

/// Decode the fixed request prefix (VER, CMD, RSV, ATYP).
///
/// Only the version byte is validated here; command and address type are
/// dispatched by the caller so it can choose the right reply code.
pub fn decode_request_prefix(header: &[u8; 4]) -> Result<(u8, u8), SocksError> {
    if header[0] != SOCKS_VERSION {
        return Err(SocksError::InvalidVersion(header[0]));
    }
    Ok((header[1], header[3]))
}

/// Decode an address payload (address bytes plus big-endian port) for the
/// given address type. Returns the target and the number of bytes consumed.
pub fn decode_address(atyp: u8, buf: &[u8]) -> Result<(TargetAddr, usize), SocksError> {
    match atyp {
        ATYP_IPV4 => {
            if buf.len() < 6 {
                return Err(SocksError::InvalidFormat(
                    "truncated IPv4 address".to_string(),
                ));
            }
            let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
            let port = u16::from_be_bytes([buf[4], buf[5]]);
            Ok((TargetAddr::ipv4(ip, port), 6))
        }

        ATYP_DOMAIN => {
            if buf.is_empty() {
                return Err(SocksError::InvalidFormat(
                    "missing domain length".to_string(),
                ));
            }
            let len = buf[0] as usize;
            if len == 0 {
                return Err(SocksError::InvalidFormat(
                    "zero-length domain".to_string(),
                ));
            }
            if buf.len() < 1 + len + 2 {
                return Err(SocksError::InvalidFormat(
                    "truncated domain address".to_string(),
                ));
            }
            let domain = String::from_utf8(buf[1..1 + len].to_vec())
                .map_err(|_| SocksError::InvalidFormat("domain is not UTF-8".to_string()))?;
            let port = u16::from_be_bytes([buf[1 + len], buf[2 + len]]);
            Ok((TargetAddr::domain(domain, port), 1 + len + 2))
        }

        ATYP_IPV6 => {
            if buf.len() < 18 {
                return Err(SocksError::InvalidFormat(
                    "truncated IPv6 address".to_string(),
                ));
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[..16]);
            let port = u16::from_be_bytes([buf[16], buf[17]]);
            Ok((TargetAddr::ipv6(Ipv6Addr::from(octets), port), 18))
        }

        other => Err(SocksError::UnsupportedAddressType(other)),
    }
}

/// Encode a reply frame (VER, REP, RSV, ATYP, BND.ADDR, BND.PORT).
///
/// The produced frame is 10 bytes for IPv4 bound addresses and 22 bytes
/// for IPv6; the server never emits a domain-typed reply.
pub fn encode_reply(code: ReplyCode, bound: SocketAddr) -> Vec<u8> {
    let mut reply = vec![SOCKS_VERSION, u8::from(code), RESERVED];
    reply.extend_from_slice(&TargetAddr::from(bound).to_bytes());
    reply
}

/// Decode the encapsulation header from the front of a relayed datagram.
///
/// Rejects datagrams shorter than the minimum header, nonzero reserved
/// bytes, unknown address types, and headers that extend past the end of
/// the datagram. Fragmented headers decode successfully so the caller can
/// apply its drop policy.
pub fn decode_udp_header(datagram: &[u8]) -> Result<UdpHeader, SocksError> {
    if datagram.len() < MIN_UDP_HEADER_LEN {
        return Err(SocksError::InvalidFormat(
            "datagram shorter than minimum header".to_string(),
        ));
    }
    if datagram[0] != 0x00 || datagram[1] != 0x00 {
        return Err(SocksError::InvalidFormat(
            "nonzero reserved bytes".to_string(),
        ));
    }
    let frag = datagram[2];
    let (dest, consumed) = decode_address(datagram[3], &datagram[4..])?;
    Ok(UdpHeader {
        frag,
        dest,
        header_len: 4 + consumed,
    })
}

/// Encode an encapsulation header describing `source`, for datagrams
/// relayed back to the client. 10 bytes for IPv4 sources, 22 for IPv6.
pub fn encode_udp_header(source: SocketAddr) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(MAX_UDP_HEADER_LEN);
    buf.put_u16(0); // RSV
    buf.put_u8(0); // FRAG
    buf.extend_from_slice(&TargetAddr::from(source).to_bytes());
    buf.to_vec()
}
