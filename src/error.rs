//! Error types for Socksd
//!
//! This module defines the error taxonomy shared by all protocol handlers and
//! the mapping from errors to version-specific reply status bytes.

use std::io;
use thiserror::Error;

use crate::socks::consts::*;

/// Errors produced while negotiating or serving a SOCKS session
#[derive(Error, Debug)]
pub enum SocksError {
    /// Client sent an unknown protocol version byte
    #[error("unsupported SOCKS version: {0}")]
    VersionMismatch(u8),

    /// Request frame was truncated or structurally invalid
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Client requested a command this server does not implement
    #[error("unsupported command: {0}")]
    UnsupportedCommand(u8),

    /// SOCKS5 greeting offered no acceptable authentication method
    #[error("no acceptable authentication method")]
    NoAcceptableMethod,

    /// SOCKS5 address type byte outside {IPv4, domain, IPv6}
    #[error("address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    /// Domain name lookup failed
    #[error("failed to resolve address: {0}")]
    Resolution(String),

    /// Outbound TCP connection to the target failed
    #[error("failed to connect to target: {0}")]
    Connect(#[source] io::Error),

    /// IO error on an established stream or socket
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SocksError {
    /// Map this error to a SOCKS4 reply status byte.
    ///
    /// SOCKS4 only distinguishes granted from rejected, so every failure
    /// collapses to `0x5B`.
    pub fn socks4_reply_code(&self) -> u8 {
        SOCKS4_REPLY_REJECTED
    }

    /// Map this error to a SOCKS5 reply status byte.
    pub fn socks5_reply_code(&self) -> u8 {
        match self {
            SocksError::UnsupportedCommand(_) => SOCKS5_REPLY_COMMAND_NOT_SUPPORTED,
            SocksError::AddressTypeNotSupported(_) => SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED,
            SocksError::Resolution(_) => SOCKS5_REPLY_HOST_UNREACHABLE,
            SocksError::Connect(e) => io_error_to_socks5_reply(e),
            _ => SOCKS5_REPLY_GENERAL_FAILURE,
        }
    }
}

/// Map an IO error from an outbound connect attempt to a SOCKS5 reply code
pub fn io_error_to_socks5_reply(error: &io::Error) -> u8 {
    match error.kind() {
        io::ErrorKind::ConnectionRefused => SOCKS5_REPLY_CONNECTION_REFUSED,
        io::ErrorKind::TimedOut => SOCKS5_REPLY_HOST_UNREACHABLE,
        io::ErrorKind::AddrNotAvailable => SOCKS5_REPLY_HOST_UNREACHABLE,
        io::ErrorKind::PermissionDenied => SOCKS5_REPLY_CONNECTION_NOT_ALLOWED,
        _ => SOCKS5_REPLY_GENERAL_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socks4_reply_code_always_rejected() {
        let errors = [
            SocksError::VersionMismatch(6),
            SocksError::MalformedRequest("truncated".to_string()),
            SocksError::UnsupportedCommand(2),
            SocksError::Resolution("nowhere.invalid".to_string()),
            SocksError::Connect(io::Error::from(io::ErrorKind::ConnectionRefused)),
        ];
        for err in errors {
            assert_eq!(err.socks4_reply_code(), SOCKS4_REPLY_REJECTED);
        }
    }

    #[test]
    fn test_socks5_reply_code_command_not_supported() {
        let err = SocksError::UnsupportedCommand(SOCKS5_CMD_TCP_BIND);
        assert_eq!(err.socks5_reply_code(), SOCKS5_REPLY_COMMAND_NOT_SUPPORTED);
    }

    #[test]
    fn test_socks5_reply_code_address_type() {
        let err = SocksError::AddressTypeNotSupported(0x99);
        assert_eq!(
            err.socks5_reply_code(),
            SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED
        );
    }

    #[test]
    fn test_socks5_reply_code_resolution_failure() {
        let err = SocksError::Resolution("example.invalid".to_string());
        assert_eq!(err.socks5_reply_code(), SOCKS5_REPLY_HOST_UNREACHABLE);
    }

    #[test]
    fn test_socks5_reply_code_connect_failures() {
        let cases = [
            (
                io::ErrorKind::ConnectionRefused,
                SOCKS5_REPLY_CONNECTION_REFUSED,
            ),
            (io::ErrorKind::TimedOut, SOCKS5_REPLY_HOST_UNREACHABLE),
            (
                io::ErrorKind::AddrNotAvailable,
                SOCKS5_REPLY_HOST_UNREACHABLE,
            ),
            (
                io::ErrorKind::PermissionDenied,
                SOCKS5_REPLY_CONNECTION_NOT_ALLOWED,
            ),
            (io::ErrorKind::NotFound, SOCKS5_REPLY_GENERAL_FAILURE),
        ];
        for (kind, expected) in cases {
            let err = SocksError::Connect(io::Error::from(kind));
            assert_eq!(err.socks5_reply_code(), expected);
        }
    }

    #[test]
    fn test_socks5_reply_code_malformed_is_general_failure() {
        let err = SocksError::MalformedRequest("bad".to_string());
        assert_eq!(err.socks5_reply_code(), SOCKS5_REPLY_GENERAL_FAILURE);
    }

    #[test]
    fn test_display() {
        let err = SocksError::VersionMismatch(6);
        assert_eq!(format!("{}", err), "unsupported SOCKS version: 6");

        let err = SocksError::NoAcceptableMethod;
        assert_eq!(format!("{}", err), "no acceptable authentication method");

        let err = SocksError::UnsupportedCommand(2);
        assert_eq!(format!("{}", err), "unsupported command: 2");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        let err: SocksError = io_err.into();
        assert!(matches!(err, SocksError::Io(_)));
    }
}
