//! TCP relay for the CONNECT command
//!
//! Establishes the outbound connection and pumps bytes in both directions
//! until both sides have finished.

use crate::config::SocksConfig;
use crate::error::SocksError;
use crate::socks::types::TargetAddr;
use anyhow::Result;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// Resolve the target and open a TCP connection to it.
///
/// Called before the success reply is sent, so a refused or unreachable
/// target can still be reported with the proper status code.
pub async fn connect_target(
    target: &TargetAddr,
    config: &SocksConfig,
) -> Result<TcpStream, SocksError> {
    let addr = target.resolve().await?;
    let timeout = Duration::from_secs(config.connect_timeout);

    debug!("connecting to target {}", addr);

    let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(SocksError::Connect(e)),
        Err(_) => {
            return Err(SocksError::Connect(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {} timed out", addr),
            )))
        }
    };

    if let Err(e) = stream.set_nodelay(true) {
        debug!("failed to set TCP_NODELAY for {}: {}", addr, e);
    }
    Ok(stream)
}

/// Relay data bidirectionally between two streams.
///
/// Each direction runs until it sees EOF or an error on its source, then
/// half-closes its destination so the opposite direction can flush and
/// observe EOF on its own. The relay finishes only once both directions are
/// done. Peer resets mid-relay are a normal way for a session to end, not a
/// failure worth surfacing.
pub async fn relay_tcp<A, B>(mut client: A, mut target: B) -> Result<(u64, u64)>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::io::copy_bidirectional(&mut client, &mut target).await {
        Ok((to_target, to_client)) => {
            debug!(
                "relay finished: {} bytes to target, {} bytes to client",
                to_target, to_client
            );
            Ok((to_target, to_client))
        }
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
            ) =>
        {
            debug!("relay ended by peer: {}", e);
            Ok((0, 0))
        }
        Err(e) => Err(e.into()),
    }
}
