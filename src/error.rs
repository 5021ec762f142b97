//! Error types for Soxide
//!
//! Defines the protocol-level error taxonomy and the SOCKS5 reply codes.

use std::io;
use thiserror::Error;

/// Errors produced while speaking the SOCKS5 protocol.
///
/// Covers both the server side (session driver, relays) and the client
/// helper. Transport-level failures are wrapped as [`SocksError::Io`];
/// handshake deadline expiry surfaces as [`SocksError::Timeout`].
#[derive(Error, Debug)]
pub enum SocksError {
    /// The peer spoke a protocol version other than 0x05
    #[error("unsupported SOCKS version: {0}")]
    InvalidVersion(u8),

    /// None of the offered authentication methods is acceptable
    #[error("no acceptable authentication method")]
    NoAcceptableAuth,

    /// Authentication sub-negotiation failed
    #[error("authentication failed")]
    AuthFailed,

    /// Request carried a command other than CONNECT or UDP ASSOCIATE
    #[error("unsupported command: {0:#04x}")]
    UnsupportedCommand(u8),

    /// Request or reply carried an unknown address type byte
    #[error("unsupported address type: {0:#04x}")]
    UnsupportedAddressType(u8),

    /// A frame was structurally invalid
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    /// The proxy could not reach the requested target
    #[error("target connection failed")]
    ConnectionFailed,

    /// A handshake or request operation exceeded its deadline
    #[error("operation timed out")]
    Timeout,

    /// Underlying transport error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Reply codes for the SOCKS5 protocol (RFC 1928 §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    /// Request succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl From<ReplyCode> for u8 {
    fn from(code: ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ReplyCode {
    type Error = SocksError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ReplyCode::Succeeded),
            0x01 => Ok(ReplyCode::GeneralFailure),
            0x02 => Ok(ReplyCode::ConnectionNotAllowed),
            0x03 => Ok(ReplyCode::NetworkUnreachable),
            0x04 => Ok(ReplyCode::HostUnreachable),
            0x05 => Ok(ReplyCode::ConnectionRefused),
            0x06 => Ok(ReplyCode::TtlExpired),
            0x07 => Ok(ReplyCode::CommandNotSupported),
            0x08 => Ok(ReplyCode::AddressTypeNotSupported),
            other => Err(SocksError::InvalidFormat(format!(
                "unknown reply code: {other:#04x}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_code_round_trip() {
        for byte in 0x00u8..=0x08 {
            let code = ReplyCode::try_from(byte).unwrap();
            assert_eq!(u8::from(code), byte);
        }
    }

    #[test]
    fn test_reply_code_from_u8_invalid() {
        assert!(ReplyCode::try_from(0x09).is_err());
        assert!(ReplyCode::try_from(0xFF).is_err());
    }

    #[test]
    fn test_socks_error_display() {
        let err = SocksError::InvalidVersion(4);
        assert_eq!(format!("{}", err), "unsupported SOCKS version: 4");

        let err = SocksError::NoAcceptableAuth;
        assert_eq!(format!("{}", err), "no acceptable authentication method");

        let err = SocksError::UnsupportedCommand(0x02);
        assert_eq!(format!("{}", err), "unsupported command: 0x02");

        let err = SocksError::UnsupportedAddressType(0x05);
        assert_eq!(format!("{}", err), "unsupported address type: 0x05");

        let err = SocksError::InvalidFormat("bad frame".to_string());
        assert_eq!(format!("{}", err), "invalid message format: bad frame");

        let err = SocksError::ConnectionFailed;
        assert_eq!(format!("{}", err), "target connection failed");

        let err = SocksError::Timeout;
        assert_eq!(format!("{}", err), "operation timed out");
    }

    #[test]
    fn test_socks_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        let err: SocksError = io_err.into();
        assert!(matches!(err, SocksError::Io(_)));
    }
}
