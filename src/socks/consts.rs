//! SOCKS protocol constants
//!
//! Defines the wire-level constants for SOCKS4/4a and SOCKS5.

/// SOCKS4 protocol version
pub const SOCKS4_VERSION: u8 = 0x04;

/// SOCKS5 protocol version
pub const SOCKS5_VERSION: u8 = 0x05;

// SOCKS4 commands
/// TCP CONNECT command
pub const SOCKS4_CMD_CONNECT: u8 = 0x01;
/// TCP BIND command (not implemented)
pub const SOCKS4_CMD_BIND: u8 = 0x02;

// SOCKS4 reply codes (sent with reply version byte 0x00)
/// Request granted
pub const SOCKS4_REPLY_GRANTED: u8 = 0x5A;
/// Request rejected or failed
pub const SOCKS4_REPLY_REJECTED: u8 = 0x5B;
/// Request rejected: identd not reachable
pub const SOCKS4_REPLY_NO_IDENTD: u8 = 0x5C;
/// Request rejected: identd user-id mismatch
pub const SOCKS4_REPLY_IDENTD_MISMATCH: u8 = 0x5D;

// SOCKS5 authentication methods
/// No authentication required
pub const SOCKS5_AUTH_METHOD_NONE: u8 = 0x00;
/// No acceptable methods
pub const SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE: u8 = 0xFF;

// SOCKS5 commands
/// TCP CONNECT command
pub const SOCKS5_CMD_TCP_CONNECT: u8 = 0x01;
/// TCP BIND command (not implemented)
pub const SOCKS5_CMD_TCP_BIND: u8 = 0x02;
/// UDP ASSOCIATE command
pub const SOCKS5_CMD_UDP_ASSOCIATE: u8 = 0x03;

// SOCKS5 address types
/// IPv4 address
pub const SOCKS5_ADDR_TYPE_IPV4: u8 = 0x01;
/// Domain name
pub const SOCKS5_ADDR_TYPE_DOMAIN: u8 = 0x03;
/// IPv6 address
pub const SOCKS5_ADDR_TYPE_IPV6: u8 = 0x04;

// SOCKS5 reply codes
/// Succeeded
pub const SOCKS5_REPLY_SUCCEEDED: u8 = 0x00;
/// General SOCKS server failure
pub const SOCKS5_REPLY_GENERAL_FAILURE: u8 = 0x01;
/// Connection not allowed by ruleset
pub const SOCKS5_REPLY_CONNECTION_NOT_ALLOWED: u8 = 0x02;
/// Network unreachable
pub const SOCKS5_REPLY_NETWORK_UNREACHABLE: u8 = 0x03;
/// Host unreachable
pub const SOCKS5_REPLY_HOST_UNREACHABLE: u8 = 0x04;
/// Connection refused
pub const SOCKS5_REPLY_CONNECTION_REFUSED: u8 = 0x05;
/// TTL expired
pub const SOCKS5_REPLY_TTL_EXPIRED: u8 = 0x06;
/// Command not supported
pub const SOCKS5_REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;
/// Address type not supported
pub const SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED: u8 = 0x08;

/// Reserved byte value (always 0x00)
pub const SOCKS5_RESERVED: u8 = 0x00;

// Limits
/// Maximum domain name length on the wire
pub const MAX_DOMAIN_LEN: usize = 255;
/// Maximum length accepted for the SOCKS4 user-id field
pub const MAX_USERID_LEN: usize = 512;
/// Maximum UDP datagram size
pub const MAX_UDP_PACKET: usize = 65535;
