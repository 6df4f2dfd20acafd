//! Configuration for Socksd
//!
//! Configuration comes from an optional TOML file, with the bind address and
//! port overridable on the command line.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

fn default_port() -> u16 {
    1080
}

fn default_allow_udp() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    10
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Protocol behavior settings
    #[serde(default)]
    pub socks: SocksConfig,
}

/// Listener settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address; all interfaces when unset
    #[serde(default)]
    pub bind: Option<IpAddr>,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: None,
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// The socket address to listen on
    pub fn bind_addr(&self) -> SocketAddr {
        let ip = self
            .bind
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(ip, self.port)
    }
}

/// Protocol behavior settings
#[derive(Debug, Clone, Deserialize)]
pub struct SocksConfig {
    /// Serve the UDP ASSOCIATE command
    #[serde(default = "default_allow_udp")]
    pub allow_udp: bool,

    /// Timeout in seconds for outbound CONNECT attempts
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for SocksConfig {
    fn default() -> Self {
        SocksConfig {
            allow_udp: default_allow_udp(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("port number must be between 1 and 65535");
        }
        if self.socks.connect_timeout == 0 {
            bail!("connect_timeout must be at least 1 second");
        }
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse configuration")
}
