//! SOCKS4 and SOCKS4a protocol handler
//!
//! Parses the SOCKS4 request (the version byte is consumed by the
//! dispatcher), applies the SOCKS4a domain-substitution rule, and serves the
//! CONNECT command.
//!
//! # SOCKS4 Request Format
//!
//! ```text
//! +----+----+----+----+----+----+----+----+----+----+....+----+
//! | VN | CD | DSTPORT |      DSTIP        | USERID       |NULL|
//! +----+----+----+----+----+----+----+----+----+----+....+----+
//!    1    1      2              4           variable       1
//! ```
//!
//! SOCKS4a appends a NUL-terminated domain name after the user-id when the
//! destination IP is `0.0.0.x` with `x` nonzero.

use crate::config::SocksConfig;
use crate::error::SocksError;
use crate::socks::consts::*;
use crate::socks::tcp_relay::{connect_target, relay_tcp};
use crate::socks::types::TargetAddr;
use anyhow::{Context, Result};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

/// A parsed SOCKS4/4a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks4Request {
    /// Raw command byte (CONNECT or BIND)
    pub command: u8,
    /// Requested target, with the 4a domain substituted when present
    pub target: TargetAddr,
    /// NUL-terminated user-id field (used by identd schemes, ignored here)
    pub userid: String,
}

impl Socks4Request {
    /// Whether the request used the SOCKS4a domain extension
    pub fn is_socks4a(&self) -> bool {
        matches!(self.target, TargetAddr::Domain(_, _))
    }
}

/// Read a NUL-terminated field, rejecting fields longer than `limit`.
///
/// A stream that ends before the terminator is a truncated frame.
async fn read_nul_terminated<S>(stream: &mut S, limit: usize) -> Result<Vec<u8>, SocksError>
where
    S: AsyncRead + Unpin,
{
    let mut field = Vec::new();
    loop {
        let byte = stream.read_u8().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                SocksError::MalformedRequest("missing NUL terminator".to_string())
            } else {
                SocksError::Io(e)
            }
        })?;
        if byte == 0 {
            return Ok(field);
        }
        if field.len() >= limit {
            return Err(SocksError::MalformedRequest(format!(
                "field exceeds {} bytes",
                limit
            )));
        }
        field.push(byte);
    }
}

/// Parse a SOCKS4/4a request from the stream.
///
/// The version byte has already been consumed by the dispatcher. If the
/// destination IP matches the 4a convention (`0.0.0.1`-`0.0.0.255`), the
/// trailing domain name replaces the literal address as the target.
pub async fn parse_request<S>(stream: &mut S) -> Result<Socks4Request, SocksError>
where
    S: AsyncRead + Unpin,
{
    // CD DSTPORT(2) DSTIP(4)
    let mut header = [0u8; 7];
    stream.read_exact(&mut header).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            SocksError::MalformedRequest("truncated request header".to_string())
        } else {
            SocksError::Io(e)
        }
    })?;

    let command = header[0];
    let port = u16::from_be_bytes([header[1], header[2]]);
    let ip = [header[3], header[4], header[5], header[6]];

    let userid_bytes = read_nul_terminated(stream, MAX_USERID_LEN).await?;
    let userid = String::from_utf8_lossy(&userid_bytes).into_owned();

    // SOCKS4a: destination 0.0.0.x with x nonzero means a domain name follows
    let target = if ip[0] == 0 && ip[1] == 0 && ip[2] == 0 && ip[3] != 0 {
        let domain_bytes = read_nul_terminated(stream, MAX_DOMAIN_LEN).await?;
        if domain_bytes.is_empty() {
            return Err(SocksError::MalformedRequest(
                "empty domain name".to_string(),
            ));
        }
        let domain = String::from_utf8(domain_bytes)
            .map_err(|_| SocksError::MalformedRequest("invalid domain name".to_string()))?;
        TargetAddr::domain(domain, port)
    } else {
        TargetAddr::ipv4(Ipv4Addr::from(ip), port)
    };

    Ok(Socks4Request {
        command,
        target,
        userid,
    })
}

/// Send a SOCKS4 reply.
///
/// The reply version byte is always `0x00`. This server does not implement
/// BIND, so the address and port fields are zero-filled.
pub async fn send_reply<S>(stream: &mut S, status: u8) -> Result<(), SocksError>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&encode_reply(status)).await?;
    stream.flush().await?;
    Ok(())
}

/// Encode a SOCKS4 reply frame
pub fn encode_reply(status: u8) -> [u8; 8] {
    [0x00, status, 0, 0, 0, 0, 0, 0]
}

/// Handle a SOCKS4/4a session after the version byte has been consumed.
///
/// Only CONNECT is served; every failure is reported with reply status
/// `0x5B` before the connection closes.
pub async fn handle_tcp<S>(
    mut stream: S,
    client_addr: SocketAddr,
    config: &SocksConfig,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let request = match parse_request(&mut stream).await {
        Ok(request) => request,
        Err(err) => {
            let _ = send_reply(&mut stream, err.socks4_reply_code()).await;
            return Err(err).context("failed to parse socks4 request");
        }
    };

    if request.command != SOCKS4_CMD_CONNECT {
        info!(
            "socks4 request from client {} rejected: command {} not implemented",
            client_addr, request.command
        );
        send_reply(&mut stream, SOCKS4_REPLY_REJECTED).await?;
        return Err(SocksError::UnsupportedCommand(request.command).into());
    }

    info!(
        "socks{} connect request from client {} to tcp://{} accepted",
        if request.is_socks4a() { "4a" } else { "4" },
        client_addr,
        request.target
    );

    let target_stream = match connect_target(&request.target, config).await {
        Ok(target_stream) => target_stream,
        Err(err) => {
            let _ = send_reply(&mut stream, err.socks4_reply_code()).await;
            return Err(err).with_context(|| format!("failed to reach {}", request.target));
        }
    };

    send_reply(&mut stream, SOCKS4_REPLY_GRANTED).await?;

    debug!("tcp://{} connected", request.target);
    relay_tcp(stream, target_stream).await?;
    debug!("tcp://{} disconnected", request.target);

    Ok(())
}
