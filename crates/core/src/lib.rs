//! Planning Poker Core
//!
//! The transport-agnostic engine behind the voting service: participants and
//! their votes, the typed command decoder, per-session state with its
//! broadcast protocol, and the process-wide session registry.

pub mod command;
pub mod participant;
pub mod session;
pub mod sink;
pub mod store;

pub use command::{Command, CommandError};
pub use participant::{Ballot, Participant, Vote};
pub use session::{Outcome, Rejection, Session, SessionError, SessionSnapshot};
pub use sink::{ClientSink, ConnectionId, SinkError};
pub use store::SessionStore;
