//! Typed decoding of the commands clients send over an established connection.

use crate::participant::Ballot;
use serde::Deserialize;

/// A command sent by a client, identified by its `type` field.
///
/// Required fields are validated while decoding, so a command that reaches a
/// session is always well-formed. Unknown extra fields are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    /// Cast (or replace) the sender's vote.
    Vote { vote: Ballot },
    /// Expose every current vote. Admin only.
    Reveal,
    /// Hide votes and clear them for the next round. Admin only.
    Reset,
    /// Drop another participant from the session. Admin only.
    Remove { target_id: String },
    /// Drop every inactive participant. Admin only.
    Cleanup,
    ChangeName { new_name: String },
    /// `true` makes the sender an admin.
    ChangeRole { new_role: bool },
    /// Client keepalive; answered directly and never broadcast.
    Ping,
}

/// Why an inbound payload could not be turned into a [`Command`].
#[derive(Debug, thiserror::Error)]
#[error("invalid command payload: {0}")]
pub struct CommandError(#[from] serde_json::Error);

impl Command {
    /// Decodes a single text frame into a command.
    pub fn decode(text: &str) -> Result<Self, CommandError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Whether handling this command should be followed by a session-wide publish.
    pub fn triggers_broadcast(&self) -> bool {
        !matches!(self, Command::Ping)
    }
}
