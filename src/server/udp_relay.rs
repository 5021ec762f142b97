//! UDP association relay
//!
//! Owns the ephemeral UDP socket created for a UDP ASSOCIATE request and
//! pumps datagrams between the client and its targets. Datagrams from the
//! client carry the SOCKS5 encapsulation header naming the destination;
//! datagrams from targets are wrapped in a header naming their source and
//! sent back to the client's learned endpoint. The association lives
//! exactly as long as the TCP control connection: any readability or error
//! on the control stream ends the relay.

use crate::socks::codec;
use crate::socks::consts::MAX_DATAGRAM_SIZE;
use crate::socks::types::TargetAddr;
use std::io;
use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// One UDP association, bound 1:1 to a control TCP connection.
///
/// The client's IP is fixed at request time from the control connection's
/// peer address; its UDP source port is learned from the first datagram
/// arriving from that IP. Learning happens on IP match alone, before any
/// structural validation of the datagram.
pub struct UdpAssociation {
    socket: UdpSocket,
    client_ip: IpAddr,
    client_port: u16,
    last_client: Option<SocketAddr>,
    cache: Option<CachedTarget>,
}

/// Single-slot resolution cache; any key miss replaces the entry. Keys are
/// compared exactly, without address normalization.
struct CachedTarget {
    dest: TargetAddr,
    resolved: SocketAddr,
}

impl UdpAssociation {
    /// Bind the relay socket on `local_ip` (the control connection's local
    /// address, so the family matches) with an ephemeral port.
    pub async fn bind(local_ip: IpAddr, client_ip: IpAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::new(local_ip, 0)).await?;
        Ok(UdpAssociation {
            socket,
            client_ip,
            client_port: 0,
            last_client: None,
            cache: None,
        })
    }

    /// The bound endpoint, reported to the client in the SUCCEEDED reply.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Run the relay until the control stream reports readability, EOF, or
    /// an error. Datagrams are processed strictly one at a time.
    pub async fn run<S>(mut self, control: &mut S)
    where
        S: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut keepalive = [0u8; 1];

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((0, _)) => continue,
                        Ok((n, sender)) => self.process_datagram(&buf[..n], sender).await,
                        Err(e) => {
                            debug!("UDP receive error: {}", e);
                            continue;
                        }
                    }
                }
                result = control.read(&mut keepalive) => {
                    match result {
                        Ok(0) => debug!("control connection closed, ending UDP association"),
                        Ok(_) => warn!("unexpected data on control connection, ending UDP association"),
                        Err(e) => debug!("control connection error: {}", e),
                    }
                    break;
                }
            }
        }
    }

    async fn process_datagram(&mut self, datagram: &[u8], sender: SocketAddr) {
        if self.classify(sender) {
            self.forward_to_target(datagram, sender).await;
        } else {
            self.forward_to_client(datagram, sender).await;
        }
    }

    /// Decide whether `sender` is the client side of the association,
    /// learning the client's port from the first datagram that matches its
    /// IP.
    fn classify(&mut self, sender: SocketAddr) -> bool {
        if sender.ip() != self.client_ip {
            return false;
        }
        if self.client_port == 0 {
            self.client_port = sender.port();
            return true;
        }
        sender.port() == self.client_port
    }

    /// Client-side path: strip the encapsulation header and forward the
    /// payload to the resolved destination.
    async fn forward_to_target(&mut self, datagram: &[u8], sender: SocketAddr) {
        self.last_client = Some(sender);

        let header = match codec::decode_udp_header(datagram) {
            Ok(header) => header,
            Err(e) => {
                debug!("dropping malformed datagram from {}: {}", sender, e);
                return;
            }
        };
        if header.is_fragmented() {
            debug!("dropping fragmented datagram from {}", sender);
            return;
        }

        let target = match self.resolve_cached(header.dest).await {
            Some(target) => target,
            None => return,
        };

        if let Err(e) = self
            .socket
            .send_to(&datagram[header.header_len..], target)
            .await
        {
            debug!("UDP send to {} failed: {}", target, e);
        }
    }

    /// Target-side path: prepend a header describing the sender and
    /// deliver to the client's learned endpoint.
    async fn forward_to_client(&mut self, datagram: &[u8], sender: SocketAddr) {
        // No client datagram seen yet, so there is nowhere to deliver
        if self.client_port == 0 {
            return;
        }
        let client = match self.last_client {
            Some(endpoint) => endpoint,
            None => return,
        };

        let mut packet = codec::encode_udp_header(sender);
        packet.extend_from_slice(datagram);

        if let Err(e) = self.socket.send_to(&packet, client).await {
            debug!("UDP send to client {} failed: {}", client, e);
        }
    }

    /// Look up `dest` in the single-slot cache, resolving and replacing the
    /// entry on a miss. A resolution failure invalidates the slot and drops
    /// the datagram.
    async fn resolve_cached(&mut self, dest: TargetAddr) -> Option<SocketAddr> {
        if let Some(cached) = &self.cache {
            if cached.dest == dest {
                return Some(cached.resolved);
            }
        }

        match dest.resolve().await {
            Ok(resolved) => {
                self.cache = Some(CachedTarget { dest, resolved });
                Some(resolved)
            }
            Err(e) => {
                debug!("dropping datagram for unresolvable target: {}", e);
                self.cache = None;
                None
            }
        }
    }
}
