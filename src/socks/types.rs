//! Core types for the SOCKS protocol handlers
//!
//! Defines the request command and the target address descriptor shared by
//! the SOCKS4 and SOCKS5 code paths.

use crate::error::SocksError;
use crate::socks::consts::*;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// SOCKS request command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    /// TCP CONNECT - establish a TCP relay to the target
    Connect,
    /// TCP BIND - wait for an inbound connection (not implemented)
    Bind,
    /// UDP ASSOCIATE - establish a UDP relay channel
    UdpAssociate,
}

impl SocksCommand {
    /// Parse a SOCKS5 command byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => Some(SocksCommand::Connect),
            SOCKS5_CMD_TCP_BIND => Some(SocksCommand::Bind),
            SOCKS5_CMD_UDP_ASSOCIATE => Some(SocksCommand::UdpAssociate),
            _ => None,
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

/// Target address requested by a client
///
/// Either an IP literal carried verbatim on the wire, or a domain name that
/// must be resolved before any socket operation. Domain names are never
/// handed to raw sockets directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    /// IPv4 or IPv6 literal with port
    Ip(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl TargetAddr {
    /// Create a target from an IPv4 literal
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create a target from an IPv6 literal
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create a target from a domain name
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

    /// Resolve the address to a connectable [`SocketAddr`].
    ///
    /// IP literals return immediately; domain names go through the system
    /// resolver. Resolution runs on the blocking pool underneath
    /// [`tokio::net::lookup_host`], so a slow lookup never stalls other
    /// sessions.
    pub async fn resolve(&self) -> Result<SocketAddr, SocksError> {
        match self {
            TargetAddr::Ip(addr) => Ok(*addr),
            TargetAddr::Domain(domain, port) => {
                tokio::net::lookup_host((domain.as_str(), *port))
                    .await
                    .ok()
                    .and_then(|mut addrs| addrs.next())
                    .ok_or_else(|| SocksError::Resolution(format!("{}:{}", domain, port)))
            }
        }
    }

    /// Serialize as SOCKS5 address bytes: ATYP + address + big-endian port
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        match self {
            TargetAddr::Ip(SocketAddr::V4(addr)) => {
                bytes.push(SOCKS5_ADDR_TYPE_IPV4);
                bytes.extend_from_slice(&addr.ip().octets());
            }
            TargetAddr::Ip(SocketAddr::V6(addr)) => {
                bytes.push(SOCKS5_ADDR_TYPE_IPV6);
                bytes.extend_from_slice(&addr.ip().octets());
            }
            TargetAddr::Domain(domain, _) => {
                bytes.push(SOCKS5_ADDR_TYPE_DOMAIN);
                bytes.push(domain.len() as u8);
                bytes.extend_from_slice(domain.as_bytes());
            }
        }
        bytes.extend_from_slice(&self.port().to_be_bytes());

        bytes
    }
}

impl From<SocketAddr> for TargetAddr {
    fn from(addr: SocketAddr) -> Self {
        TargetAddr::Ip(addr)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_from_byte() {
        assert_eq!(SocksCommand::from_byte(1), Some(SocksCommand::Connect));
        assert_eq!(SocksCommand::from_byte(2), Some(SocksCommand::Bind));
        assert_eq!(SocksCommand::from_byte(3), Some(SocksCommand::UdpAssociate));
        assert_eq!(SocksCommand::from_byte(0), None);
        assert_eq!(SocksCommand::from_byte(0x99), None);
    }

    #[test]
    fn test_command_display() {
        assert_eq!(SocksCommand::Connect.to_string(), "CONNECT");
        assert_eq!(SocksCommand::Bind.to_string(), "BIND");
        assert_eq!(SocksCommand::UdpAssociate.to_string(), "UDP ASSOCIATE");
    }

    #[test]
    fn test_target_addr_display() {
        let addr = TargetAddr::ipv4(Ipv4Addr::new(127, 0, 0, 1), 80);
        assert_eq!(addr.to_string(), "127.0.0.1:80");

        let addr = TargetAddr::ipv6(Ipv6Addr::LOCALHOST, 443);
        assert_eq!(addr.to_string(), "[::1]:443");

        let addr = TargetAddr::domain("example.com".to_string(), 8080);
        assert_eq!(addr.to_string(), "example.com:8080");
    }

    #[test]
    fn test_target_addr_port() {
        assert_eq!(TargetAddr::ipv4(Ipv4Addr::LOCALHOST, 1080).port(), 1080);
        assert_eq!(TargetAddr::domain("a.example".to_string(), 53).port(), 53);
    }

    #[test]
    fn test_to_bytes_ipv4() {
        let addr = TargetAddr::ipv4(Ipv4Addr::new(10, 0, 0, 1), 80);
        let bytes = addr.to_bytes();
        assert_eq!(bytes[0], SOCKS5_ADDR_TYPE_IPV4);
        assert_eq!(&bytes[1..5], &[10, 0, 0, 1]);
        assert_eq!(&bytes[5..7], &80u16.to_be_bytes());
    }

    #[test]
    fn test_to_bytes_domain() {
        let addr = TargetAddr::domain("test.com".to_string(), 443);
        let bytes = addr.to_bytes();
        assert_eq!(bytes[0], SOCKS5_ADDR_TYPE_DOMAIN);
        assert_eq!(bytes[1], 8);
        assert_eq!(&bytes[2..10], b"test.com");
        assert_eq!(&bytes[10..12], &443u16.to_be_bytes());
    }

    #[test]
    fn test_to_bytes_ipv6() {
        let addr = TargetAddr::ipv6(Ipv6Addr::LOCALHOST, 53);
        let bytes = addr.to_bytes();
        assert_eq!(bytes[0], SOCKS5_ADDR_TYPE_IPV6);
        assert_eq!(bytes.len(), 1 + 16 + 2);
    }

    #[test]
    fn test_from_socket_addr() {
        let sa: SocketAddr = "10.1.2.3:4567".parse().unwrap();
        assert_eq!(TargetAddr::from(sa), TargetAddr::Ip(sa));
    }

    #[tokio::test]
    async fn test_resolve_ip_passthrough() {
        let addr = TargetAddr::ipv4(Ipv4Addr::new(192, 0, 2, 1), 80);
        let resolved = addr.resolve().await.unwrap();
        assert_eq!(resolved, "192.0.2.1:80".parse().unwrap());
    }

    #[tokio::test]
    async fn test_resolve_localhost() {
        let addr = TargetAddr::domain("localhost".to_string(), 80);
        let resolved = addr.resolve().await.unwrap();
        assert!(resolved.ip().is_loopback());
        assert_eq!(resolved.port(), 80);
    }

    #[tokio::test]
    async fn test_resolve_failure() {
        let addr = TargetAddr::domain("does-not-exist-4242.invalid".to_string(), 80);
        let result = addr.resolve().await;
        assert!(matches!(result, Err(SocksError::Resolution(_))));
    }
}
