//! SOCKS5 request parser and reply builder
//!
//! # Request Format
//!
//! ```text
//! +----+-----+-------+------+----------+----------+
//! |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
//! +----+-----+-------+------+----------+----------+
//! | 1  |  1  | X'00' |  1   | Variable |    2     |
//! +----+-----+-------+------+----------+----------+
//! ```
//!
//! The reply has the same shape with the status byte in place of CMD and the
//! bound address in place of the destination.

use crate::error::SocksError;
use crate::socks::consts::*;
use crate::socks::types::{SocksCommand, TargetAddr};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Parse a SOCKS5 request from the stream.
///
/// Unlike the greeting, the request frame carries its own version byte.
pub async fn parse_request<S>(stream: &mut S) -> Result<(SocksCommand, TargetAddr), SocksError>
where
    S: AsyncRead + Unpin,
{
    // VER CMD RSV ATYP
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            SocksError::MalformedRequest("truncated request header".to_string())
        } else {
            SocksError::Io(e)
        }
    })?;

    let version = header[0];
    let cmd_byte = header[1];
    let reserved = header[2];
    let addr_type = header[3];

    if version != SOCKS5_VERSION {
        return Err(SocksError::VersionMismatch(version));
    }
    if reserved != SOCKS5_RESERVED {
        return Err(SocksError::MalformedRequest(format!(
            "nonzero reserved byte: {:#04x}",
            reserved
        )));
    }

    let command =
        SocksCommand::from_byte(cmd_byte).ok_or(SocksError::UnsupportedCommand(cmd_byte))?;

    let target = parse_address(stream, addr_type).await?;

    Ok((command, target))
}

/// Parse the address portion of a SOCKS5 request
async fn parse_address<S>(stream: &mut S, addr_type: u8) -> Result<TargetAddr, SocksError>
where
    S: AsyncRead + Unpin,
{
    let truncated = |e: std::io::Error| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            SocksError::MalformedRequest("truncated address".to_string())
        } else {
            SocksError::Io(e)
        }
    };

    match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await.map_err(truncated)?;
            let port = stream.read_u16().await.map_err(truncated)?;
            Ok(TargetAddr::ipv4(Ipv4Addr::from(addr), port))
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            let domain_len = stream.read_u8().await.map_err(truncated)? as usize;
            if domain_len == 0 {
                return Err(SocksError::MalformedRequest(
                    "empty domain name".to_string(),
                ));
            }

            let mut domain_buf = vec![0u8; domain_len];
            stream.read_exact(&mut domain_buf).await.map_err(truncated)?;
            let domain = String::from_utf8(domain_buf)
                .map_err(|_| SocksError::MalformedRequest("invalid domain name".to_string()))?;

            let port = stream.read_u16().await.map_err(truncated)?;
            Ok(TargetAddr::domain(domain, port))
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await.map_err(truncated)?;
            let port = stream.read_u16().await.map_err(truncated)?;
            Ok(TargetAddr::ipv6(Ipv6Addr::from(addr), port))
        }

        other => Err(SocksError::AddressTypeNotSupported(other)),
    }
}

/// Encode a SOCKS5 reply frame.
///
/// When the real bound endpoint is not tracked the address defaults to
/// `0.0.0.0:0`, which clients accept for failure replies.
pub fn encode_reply(status: u8, bind_addr: Option<SocketAddr>) -> Vec<u8> {
    let bind_addr =
        bind_addr.unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));

    let mut reply = vec![SOCKS5_VERSION, status, SOCKS5_RESERVED];
    reply.extend_from_slice(&TargetAddr::from(bind_addr).to_bytes());
    reply
}

/// Build and send a SOCKS5 reply
pub async fn build_reply<S>(
    stream: &mut S,
    status: u8,
    bind_addr: Option<SocketAddr>,
) -> Result<(), SocksError>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&encode_reply(status, bind_addr)).await?;
    stream.flush().await?;
    Ok(())
}
