//! SOCKS5 protocol handler
//!
//! Drives the SOCKS5 handshake after the dispatcher has consumed the version
//! byte: method negotiation, request parsing, then CONNECT or UDP ASSOCIATE.

mod auth;
mod command;

pub use auth::negotiate;
pub use command::{build_reply, encode_reply, parse_request};

use crate::config::SocksConfig;
use crate::error::SocksError;
use crate::socks::consts::*;
use crate::socks::tcp_relay::{connect_target, relay_tcp};
use crate::socks::types::SocksCommand;
use crate::socks::udp::handle_udp_associate;
use anyhow::{Context, Result};
use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

/// Handle a SOCKS5 session after the version byte has been consumed.
///
/// `local_ip` is the server-side address of the control connection; the
/// ephemeral UDP socket for UDP ASSOCIATE binds on it so the reply names an
/// address the client can actually reach.
///
/// A connection carries exactly one request. Once a relay finishes the
/// handler returns and the connection closes; a client that tries to pipeline
/// further requests is violating the protocol and gets disconnected.
pub async fn handle_tcp<S>(
    mut stream: S,
    client_addr: SocketAddr,
    local_ip: IpAddr,
    config: &SocksConfig,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    if let Err(err) = negotiate(&mut stream).await {
        info!(
            "socks5 request from client {} rejected: {}",
            client_addr, err
        );
        return Err(err).context("method negotiation failed");
    }

    let (command, target) = match parse_request(&mut stream).await {
        Ok(parsed) => parsed,
        Err(err) => {
            // No reply frame is defined for a bad version byte or a dead stream
            if !matches!(err, SocksError::VersionMismatch(_) | SocksError::Io(_)) {
                let _ = build_reply(&mut stream, err.socks5_reply_code(), None).await;
            }
            return Err(err).context("failed to parse socks5 request");
        }
    };

    match command {
        SocksCommand::Connect => {
            info!(
                "socks5 connect request from client {} to tcp://{} accepted",
                client_addr, target
            );

            let target_stream = match connect_target(&target, config).await {
                Ok(target_stream) => target_stream,
                Err(err) => {
                    let _ = build_reply(&mut stream, err.socks5_reply_code(), None).await;
                    return Err(err).with_context(|| format!("failed to reach {}", target));
                }
            };

            let bound = target_stream.local_addr().ok();
            build_reply(&mut stream, SOCKS5_REPLY_SUCCEEDED, bound).await?;

            debug!("tcp://{} connected", target);
            relay_tcp(stream, target_stream).await?;
            debug!("tcp://{} disconnected", target);
            Ok(())
        }

        SocksCommand::UdpAssociate if config.allow_udp => {
            info!(
                "socks5 udp associate request from client {} to udp://{} accepted",
                client_addr, target
            );
            handle_udp_associate(stream, client_addr, local_ip).await
        }

        SocksCommand::UdpAssociate | SocksCommand::Bind => {
            info!(
                "socks5 {} request from client {} rejected: not implemented",
                command, client_addr
            );
            build_reply(&mut stream, SOCKS5_REPLY_COMMAND_NOT_SUPPORTED, None).await?;
            Err(SocksError::UnsupportedCommand(match command {
                SocksCommand::Bind => SOCKS5_CMD_TCP_BIND,
                _ => SOCKS5_CMD_UDP_ASSOCIATE,
            })
            .into())
        }
    }
}
