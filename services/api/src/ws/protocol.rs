//! Defines the directed messages the server sends to a single client.
//!
//! Session snapshots are the other outbound message; they are produced by
//! `poker_core::Session` and carry no `type` field.

use serde::Serialize;

/// Messages sent from the server to one client only.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Confirms a `changeName` to the client that requested it.
    NameChangeConfirmation { new_name: String },
    /// Confirms a `changeRole` to the client that requested it.
    RoleChangeConfirmation { new_role: bool },
    /// Reply to a client `ping`.
    Pong,
}
