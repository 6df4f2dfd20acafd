//! SOCKS server: listener setup, accept loop, and per-connection dispatch
//!
//! Each accepted connection is served by its own task. The protocol version
//! is decided by the first byte on the wire: 0x04 routes to the SOCKS4/4a
//! handler, 0x05 to the SOCKS5 handler, anything else closes the connection.

use crate::config::SocksConfig;
use crate::error::SocksError;
use crate::socks::{v4, v5};
use anyhow::{Context, Result};
use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::socks::consts::{SOCKS4_VERSION, SOCKS5_VERSION};

/// Create a TCP listener bound to `addr`.
///
/// Built through socket2 so SO_REUSEADDR is set before bind; a restart
/// immediately after shutdown must not fail on a lingering socket.
pub fn create_listener(addr: SocketAddr) -> Result<TcpListener> {
    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::STREAM, None)
        .with_context(|| format!("Failed to create socket for {}", addr))?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("Failed to bind to {}", addr))?;
    socket.listen(1024)?;

    TcpListener::from_std(socket.into()).context("Failed to register listener with the runtime")
}

/// Run the accept loop until the shutdown signal fires.
///
/// Accept errors are logged and the loop continues; a transient failure
/// (fd exhaustion, aborted handshake) must not take the server down.
pub async fn run_server(
    listener: TcpListener,
    config: SocksConfig,
    mut shutdown_rx: broadcast::Receiver<bool>,
) -> Result<()> {
    let local_addr = listener.local_addr()?;
    info!("Serving SOCKS on {}", local_addr);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, client_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                };

                let config = config.clone();
                tokio::spawn(async move {
                    debug!("client {} connected", client_addr);
                    if let Err(e) = handle_connection(stream, client_addr, &config).await {
                        debug!("client {} session ended with error: {:#}", client_addr, e);
                    }
                    debug!("client {} disconnected", client_addr);
                });
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    Ok(())
}

/// Serve one client connection: read the version byte and dispatch.
async fn handle_connection(
    mut stream: TcpStream,
    client_addr: SocketAddr,
    config: &SocksConfig,
) -> Result<()> {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("failed to set TCP_NODELAY for {}: {}", client_addr, e);
    }
    let local_addr = stream.local_addr()?;

    let version = stream.read_u8().await.context("connection closed before version byte")?;

    match version {
        SOCKS4_VERSION => v4::handle_tcp(stream, client_addr, config).await,
        SOCKS5_VERSION => v5::handle_tcp(stream, client_addr, local_addr.ip(), config).await,
        other => Err(SocksError::VersionMismatch(other).into()),
    }
}
