//! WebSocket Connection Handling
//!
//! - `protocol`: the directed replies the server sends besides snapshots.
//! - `sink`: the socket-backed implementation of `poker_core::ClientSink`.
//! - `connection`: the per-connection lifecycle, from upgrade to cleanup.

mod connection;
pub mod protocol;
mod sink;

pub use connection::ws_handler;
pub use sink::WsSink;
