//! SOCKS protocol implementation
//!
//! Version-specific framing is a tagged dispatch on the single version byte
//! read by the server: the SOCKS4/4a and SOCKS5 branches share the target
//! address type and the relays, nothing else.

pub mod consts;
pub mod tcp_relay;
pub mod types;
pub mod udp;
pub mod v4;
pub mod v5;

pub use tcp_relay::relay_tcp;
pub use types::{SocksCommand, TargetAddr};
