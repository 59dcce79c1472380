//! Planning Poker API Library Crate
//!
//! This library contains the WebSocket service around `poker-core`: the
//! configuration, application state, routing, and the per-connection handler.
//! The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod error;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
