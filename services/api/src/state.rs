//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the session store
//! and configuration shared by every connection handler.

use crate::config::Config;
use poker_core::SessionStore;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Builds a state around a fresh, empty session store.
    pub fn new(config: Config) -> Self {
        Self {
            store: Arc::new(SessionStore::new()),
            config: Arc::new(config),
        }
    }
}
