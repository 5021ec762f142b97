//! SOCKS5 protocol implementation
//!
//! Wire codec, protocol constants, shared types, and the client-side
//! handshake helper. Everything here is transport-agnostic; the server
//! module wires these pieces to real sockets.

pub mod client;
pub mod codec;
pub mod consts;
pub mod types;

pub use consts::*;
pub use types::{SocksCommand, TargetAddr};
