//! SOCKS5 UDP datagram encapsulation codec
//!
//! Pure encode/decode for the per-datagram header, no I/O.
//!
//! # UDP Request/Response Format
//!
//! ```text
//! +----+------+------+----------+----------+----------+
//! |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
//! +----+------+------+----------+----------+----------+
//! | 2  |  1   |  1   | Variable |    2     | Variable |
//! +----+------+------+----------+----------+----------+
//! ```

use crate::error::SocksError;
use crate::socks::consts::*;
use crate::socks::types::TargetAddr;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::{Ipv4Addr, Ipv6Addr};

/// A decoded SOCKS5 UDP datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpPacket {
    /// Fragment number; this server only relays standalone datagrams
    pub frag: u8,
    /// Destination (client to relay) or source (relay to client) address
    pub addr: TargetAddr,
    /// Raw payload
    pub data: Bytes,
}

impl UdpPacket {
    /// Create an unfragmented packet
    pub fn new(addr: TargetAddr, data: Bytes) -> Self {
        UdpPacket {
            frag: 0,
            addr,
            data,
        }
    }

    /// Whether this packet is part of a fragmented datagram
    pub fn is_fragmented(&self) -> bool {
        self.frag != 0
    }
}

/// Parse a SOCKS5-encapsulated UDP datagram
pub fn parse_udp_packet(data: &[u8]) -> Result<UdpPacket, SocksError> {
    if data.len() < 4 {
        return Err(SocksError::MalformedRequest(format!(
            "udp datagram too short: {} bytes",
            data.len()
        )));
    }

    let mut buf = data;

    let rsv = buf.get_u16();
    if rsv != 0 {
        return Err(SocksError::MalformedRequest(format!(
            "nonzero reserved field: {:#06x}",
            rsv
        )));
    }

    let frag = buf.get_u8();
    let atyp = buf.get_u8();

    let (addr, remaining) = parse_address_from_buf(atyp, buf)?;

    Ok(UdpPacket {
        frag,
        addr,
        data: Bytes::copy_from_slice(remaining),
    })
}

/// Parse the ATYP-tagged address from the front of the buffer
fn parse_address_from_buf(atyp: u8, mut buf: &[u8]) -> Result<(TargetAddr, &[u8]), SocksError> {
    let short = || SocksError::MalformedRequest("truncated udp address".to_string());

    match atyp {
        SOCKS5_ADDR_TYPE_IPV4 => {
            if buf.len() < 6 {
                return Err(short());
            }
            let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
            buf = &buf[4..];
            let port = buf.get_u16();
            Ok((TargetAddr::ipv4(ip, port), buf))
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            if buf.is_empty() {
                return Err(short());
            }
            let len = buf[0] as usize;
            buf = &buf[1..];
            if len == 0 {
                return Err(SocksError::MalformedRequest(
                    "empty domain name".to_string(),
                ));
            }
            if buf.len() < len + 2 {
                return Err(short());
            }
            let domain = String::from_utf8(buf[..len].to_vec())
                .map_err(|_| SocksError::MalformedRequest("invalid domain name".to_string()))?;
            buf = &buf[len..];
            let port = buf.get_u16();
            Ok((TargetAddr::domain(domain, port), buf))
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            if buf.len() < 18 {
                return Err(short());
            }
            let mut ip_bytes = [0u8; 16];
            ip_bytes.copy_from_slice(&buf[..16]);
            buf = &buf[16..];
            let port = buf.get_u16();
            Ok((TargetAddr::ipv6(Ipv6Addr::from(ip_bytes), port), buf))
        }

        other => Err(SocksError::AddressTypeNotSupported(other)),
    }
}

/// Encode a SOCKS5 UDP datagram (reserved and fragment fields zero)
pub fn encode_udp_packet(packet: &UdpPacket) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + packet.data.len());

    buf.put_u16(0);
    buf.put_u8(packet.frag);
    buf.extend_from_slice(&packet.addr.to_bytes());
    buf.extend_from_slice(&packet.data);

    buf.to_vec()
}
