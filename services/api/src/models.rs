//! Request and Response Models
//!
//! Plain data carried by the HTTP side of the service: the query string a
//! client presents when it opens a connection, and the JSON body returned
//! when that request is refused.

use serde::{Deserialize, Serialize};

/// Query parameters of the WebSocket upgrade request.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ConnectParams {
    /// The session to join. Required.
    pub session: Option<String>,
    /// Display name. Required.
    pub name: Option<String>,
    /// Identity to resume; a fresh one is generated when absent.
    pub id: Option<String>,
    /// Only the literal `true` grants admin; any other value is a voter.
    pub admin: Option<String>,
}

/// The identifying details of a connection that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectRequest {
    pub session_id: String,
    pub name: String,
    pub participant_id: Option<String>,
    pub is_admin: bool,
}

impl ConnectParams {
    /// Checks the required parameters; empty strings count as missing.
    pub fn validate(self) -> Option<ConnectRequest> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        Some(ConnectRequest {
            session_id: non_empty(self.session)?,
            name: non_empty(self.name)?,
            participant_id: non_empty(self.id),
            is_admin: self.admin.as_deref() == Some("true"),
        })
    }
}

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub message: String,
}
