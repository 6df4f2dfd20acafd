//! UDP ASSOCIATE support for SOCKS5
//!
//! Splits into the pure datagram header codec and the relay that owns the
//! per-association ephemeral socket.

mod packet;
mod relay;

pub use packet::{encode_udp_packet, parse_udp_packet, UdpPacket};
pub use relay::handle_udp_associate;
