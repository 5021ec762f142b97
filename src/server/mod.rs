//! SOCKS5 proxy server
//!
//! The listener accepts control connections and spawns one session task
//! per connection; sessions, relays, and the UDP association live in the
//! submodules.

mod session;
mod tcp_relay;
mod udp_relay;

use crate::config::ServerConfig;
use anyhow::{Context, Result};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// A bound SOCKS5 proxy server.
///
/// Constructed with [`Server::bind`], which fails if the listening socket
/// cannot be bound, and driven by [`Server::start`], which spawns the
/// accept loop and returns immediately.
pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
}

impl Server {
    /// Bind the listening socket described by `config`.
    pub async fn bind(config: ServerConfig) -> Result<Server> {
        config.validate().map_err(|e| anyhow::anyhow!(e))?;

        let addr = format!("{}:{}", config.bind_ip, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        Ok(Server {
            listener,
            config: Arc::new(config),
        })
    }

    /// The address the listener is bound to. Useful when binding port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawn the accept loop onto the runtime and return immediately.
    ///
    /// The loop runs until the runtime shuts down; accept errors are logged
    /// and do not stop it.
    pub fn start(self) {
        info!(
            "SOCKS5 server listening on {}",
            self.local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "<unknown>".to_string())
        );

        tokio::spawn(async move {
            loop {
                match self.listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!("accepted connection from {}", peer);
                        let config = self.config.clone();
                        tokio::spawn(async move {
                            if let Err(e) = session::handle_session(stream, config).await {
                                debug!("session from {} ended: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("accept failed: {}", e);
                    }
                }
            }
        });
    }
}
