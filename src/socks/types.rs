//! Core SOCKS5 types
//!
//! Command and target address types shared by the server and the client
//! helper.

use super::consts::*;
use anyhow::{Context, Result};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// SOCKS5 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    /// TCP CONNECT - establish a TCP connection to the target
    Connect,
    /// TCP BIND - wait for an incoming connection (not implemented)
    Bind,
    /// UDP ASSOCIATE - establish a UDP relay
    UdpAssociate,
}

impl SocksCommand {
    /// Parse a command byte into a [`SocksCommand`]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            CMD_CONNECT => Some(SocksCommand::Connect),
            CMD_BIND => Some(SocksCommand::Bind),
            CMD_UDP_ASSOCIATE => Some(SocksCommand::UdpAssociate),
            _ => None,
        }
    }

    /// Convert to the wire command byte
    pub fn to_byte(self) -> u8 {
        match self {
            SocksCommand::Connect => CMD_CONNECT,
            SocksCommand::Bind => CMD_BIND,
            SocksCommand::UdpAssociate => CMD_UDP_ASSOCIATE,
        }
    }
}

impl fmt::Display for SocksCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksCommand::Connect => write!(f, "CONNECT"),
            SocksCommand::Bind => write!(f, "BIND"),
            SocksCommand::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// Target address carried in a SOCKS5 request or UDP encapsulation header.
///
/// Either an IP endpoint (v4 or v6) or an unresolved domain name with a
/// port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl TargetAddr {
    /// Create a target from an IPv4 address and port
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create a target from an IPv6 address and port
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create a target from a domain name and port
    pub fn domain(domain: String, port: u16) -> Self {
        TargetAddr::Domain(domain, port)
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ip(addr) => addr.port(),
            TargetAddr::Domain(_, port) => *port,
        }
    }

    /// Get the wire address-type byte for this target
    pub fn addr_type(&self) -> u8 {
        match self {
            TargetAddr::Ip(SocketAddr::V4(_)) => ATYP_IPV4,
            TargetAddr::Ip(SocketAddr::V6(_)) => ATYP_IPV6,
            TargetAddr::Domain(_, _) => ATYP_DOMAIN,
        }
    }

    /// Resolve the target to a socket address.
    ///
    /// IP targets return immediately. Domain targets that are numeric IP
    /// literals are parsed directly without touching DNS; everything else
    /// goes through the system resolver, first result wins.
    pub async fn resolve(&self) -> Result<SocketAddr> {
        match self {
            TargetAddr::Ip(addr) => Ok(*addr),
            TargetAddr::Domain(domain, port) => {
                if let Ok(ip) = domain.parse::<IpAddr>() {
                    return Ok(SocketAddr::new(ip, *port));
                }
                let resolved = tokio::net::lookup_host((domain.as_str(), *port))
                    .await
                    .with_context(|| format!("failed to resolve domain: {}", domain))?
                    .next()
                    .with_context(|| format!("no addresses found for domain: {}", domain))?;
                Ok(resolved)
            }
        }
    }

    /// Serialize as ATYP + address payload + port, big-endian port.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        match self {
            TargetAddr::Ip(SocketAddr::V4(addr)) => {
                bytes.push(ATYP_IPV4);
                bytes.extend_from_slice(&addr.ip().octets());
                bytes.extend_from_slice(&addr.port().to_be_bytes());
            }
            TargetAddr::Ip(SocketAddr::V6(addr)) => {
                bytes.push(ATYP_IPV6);
                bytes.extend_from_slice(&addr.ip().octets());
                bytes.extend_from_slice(&addr.port().to_be_bytes());
            }
            TargetAddr::Domain(domain, port) => {
                debug_assert!(domain.len() <= MAX_DOMAIN_LEN);
                bytes.push(ATYP_DOMAIN);
                bytes.push(domain.len() as u8);
                bytes.extend_from_slice(domain.as_bytes());
                bytes.extend_from_slice(&port.to_be_bytes());
            }
        }

        bytes
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{}", addr),
            TargetAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for TargetAddr {
    fn from(addr: SocketAddr) -> Self {
        TargetAddr::Ip(addr)
    }
}
