//! # Socksd - SOCKS4/4a/5 Proxy Server
//!
//! Socksd is a standalone SOCKS proxy server speaking SOCKS4, SOCKS4a and
//! SOCKS5 on a single listening port. The protocol version is detected from
//! the first byte of each connection.
//!
//! ## Features
//!
//! - **Single-Port Multi-Version**: SOCKS4, SOCKS4a and SOCKS5 on one listener
//! - **CONNECT Relaying**: Bidirectional TCP relay with half-close support
//! - **Full UDP ASSOCIATE Support**: Per-association UDP relay for SOCKS5
//! - **Server-Side Resolution**: SOCKS4a and SOCKS5 domain targets resolved
//!   on the server
//!
//! ## Usage
//!
//! ```rust,ignore
//! use socksd::{create_listener, run_server, Config};
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let listener = create_listener(config.server.bind_addr())?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_server(listener, config.socks, shutdown_rx).await
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod server;
pub mod socks;

// Re-export commonly used items
pub use config::{load_config, Config, ServerConfig, SocksConfig};
pub use error::SocksError;
pub use server::{create_listener, run_server};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
