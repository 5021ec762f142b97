//! # Soxide - Asynchronous SOCKS5 Proxy
//!
//! Soxide is a SOCKS5 proxy server (RFC 1928, unauthenticated profile)
//! supporting the TCP CONNECT and UDP ASSOCIATE commands, plus a small
//! client helper for tunneling TCP streams through any SOCKS5 proxy.
//!
//! ## Features
//!
//! - **TCP CONNECT**: bidirectional relay with per-direction idle timeouts
//! - **UDP ASSOCIATE**: full datagram relay with SOCKS5 encapsulation,
//!   client endpoint learning, and teardown bound to the control connection
//! - **Client helper**: drives the unauthenticated CONNECT handshake so any
//!   code can tunnel a stream through a proxy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use soxide::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig {
//!         bind_ip: "127.0.0.1".to_string(),
//!         port: 1080,
//!         ..Default::default()
//!     };
//!
//!     let server = Server::bind(config).await?;
//!     server.start();
//!
//!     tokio::signal::ctrl_c().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! One session task is spawned per accepted control connection. The session
//! driver walks the handshake and request state machine, then hands the
//! connection to the TCP relay or the UDP association:
//!
//! ```text
//! client ──TCP──> listener ──> session driver ──┬──> TCP relay ──> target
//!                                               └──> UDP association <──UDP──> targets
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod server;
pub mod socks;

// Re-export commonly used items
pub use config::{load_config, parse_config, ServerConfig};
pub use error::{ReplyCode, SocksError};
pub use server::Server;

/// Version of the Soxide library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
