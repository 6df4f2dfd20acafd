//! Test utilities for socksd integration tests
//!
//! This module provides common test utilities used across integration tests.

use socksd::config::SocksConfig;
use socksd::server::{create_listener, run_server};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// A running socksd server bound to an ephemeral loopback port.
///
/// The server stops when the guard is dropped.
pub struct TestServer {
    /// Address the server is listening on
    pub addr: SocketAddr,
    shutdown_tx: broadcast::Sender<bool>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Spawn a socksd server with the given configuration
pub fn spawn_server(config: SocksConfig) -> TestServer {
    let listener = create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(run_server(listener, config, shutdown_rx));

    TestServer { addr, shutdown_tx }
}

/// Spawn a socksd server with default configuration
pub fn spawn_default_server() -> TestServer {
    spawn_server(SocksConfig::default())
}

/// Spawn a TCP echo server on an ephemeral loopback port
pub async fn spawn_tcp_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    addr
}

/// Connect to the server and complete the SOCKS5 no-auth handshake
pub async fn socks5_handshake(server: &TestServer) -> TcpStream {
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    stream.write_all(&[0x05, 0x01, 0x00]).await.unwrap();

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00]);

    stream
}
