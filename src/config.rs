//! Server configuration
//!
//! Configuration types and TOML parsing. The binary fills the bind address
//! and port from the command line; timeouts come from an optional config
//! file or the defaults below.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

fn default_bind_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1080
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    300
}

/// Configuration for a [`Server`](crate::server::Server).
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the listener binds to
    #[serde(default = "default_bind_ip")]
    pub bind_ip: String,

    /// Port the listener binds to (0 picks an ephemeral port)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-operation deadline for handshake and request I/O, in seconds
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Idle deadline per relay read and write, in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_ip: default_bind_ip(),
            port: default_port(),
            handshake_timeout_secs: default_handshake_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl ServerConfig {
    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.bind_ip.parse::<IpAddr>().is_err() {
            return Err(format!("invalid bind address: {}", self.bind_ip));
        }
        if self.handshake_timeout_secs == 0 {
            return Err("handshake timeout must be nonzero".to_string());
        }
        if self.idle_timeout_secs == 0 {
            return Err("idle timeout must be nonzero".to_string());
        }
        Ok(())
    }

    /// Handshake deadline as a [`Duration`]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Relay idle deadline as a [`Duration`]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Load configuration from a TOML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServerConfig> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read config file: {:?}", path.as_ref()))?;
    parse_config(&content)
}

/// Parse configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<ServerConfig> {
    toml::from_str(content).with_context(|| "failed to parse configuration")
}
