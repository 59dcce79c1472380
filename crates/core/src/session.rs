//! Voting Session State
//!
//! A `Session` holds the participants of one voting room, the reveal flag and
//! the live connections that receive its snapshots. All of it sits behind a
//! single async mutex: every mutator holds the lock for both the precondition
//! check and the write, and `publish` holds it while fanning out, so no client
//! ever sees half of a mutation.

use crate::participant::{Ballot, Participant, Vote};
use crate::sink::{ClientSink, ConnectionId, SinkError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Why a command was not applied.
///
/// Rejections are never reported to the client; the next snapshot is the
/// only feedback it gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("participant is not part of the session")]
    UnknownParticipant,
    #[error("participant is not an admin")]
    NotAdmin,
    #[error("admins do not vote")]
    AdminCannotVote,
}

/// Result of a session mutator.
pub type Outcome = Result<(), Rejection>;

/// Errors raised while pushing session state to clients.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to serialize session snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to deliver session snapshot: {0}")]
    Delivery(#[from] SinkError),
}

/// The serialized view of a session sent to clients. Connections are never part of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub participants: HashMap<String, Participant>,
    pub revealed: bool,
}

struct Connection {
    participant_id: String,
    sink: Arc<dyn ClientSink>,
}

#[derive(Default)]
struct SessionState {
    participants: HashMap<String, Participant>,
    revealed: bool,
    connections: HashMap<ConnectionId, Connection>,
}

impl SessionState {
    fn participant_mut(&mut self, participant_id: &str) -> Result<&mut Participant, Rejection> {
        self.participants
            .get_mut(participant_id)
            .ok_or(Rejection::UnknownParticipant)
    }

    fn require_admin(&self, participant_id: &str) -> Outcome {
        match self.participants.get(participant_id) {
            Some(p) if p.is_admin => Ok(()),
            Some(_) => Err(Rejection::NotAdmin),
            None => Err(Rejection::UnknownParticipant),
        }
    }

    fn join(&mut self, participant_id: &str, name: &str, is_admin: bool) {
        match self.participants.get_mut(participant_id) {
            Some(existing) => {
                existing.name = name.to_string();
                existing.is_admin = is_admin;
                existing.is_active = true;
            }
            None => {
                self.participants.insert(
                    participant_id.to_string(),
                    Participant::new(participant_id.to_string(), name.to_string(), is_admin),
                );
            }
        }
    }

    fn register(&mut self, conn: ConnectionId, participant_id: &str, sink: Arc<dyn ClientSink>) {
        self.connections.insert(
            conn,
            Connection {
                participant_id: participant_id.to_string(),
                sink,
            },
        );
    }

    fn snapshot(&self, id: &str) -> SessionSnapshot {
        SessionSnapshot {
            id: id.to_string(),
            participants: self.participants.clone(),
            revealed: self.revealed,
        }
    }
}

/// One voting room.
pub struct Session {
    id: String,
    state: Mutex<SessionState>,
}

impl Session {
    /// Creates an empty, unrevealed session.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Adds a participant, or refreshes the name and role of a returning one.
    ///
    /// Re-joining with a known identity never duplicates the participant and
    /// keeps its current vote.
    pub async fn join(&self, participant_id: &str, name: &str, is_admin: bool) {
        self.state.lock().await.join(participant_id, name, is_admin);
    }

    /// Routes future snapshots for `participant_id` to `sink`.
    pub async fn register_connection(
        &self,
        conn: ConnectionId,
        participant_id: &str,
        sink: Arc<dyn ClientSink>,
    ) {
        self.state.lock().await.register(conn, participant_id, sink);
    }

    /// Joins and registers the connection in one critical section, so no
    /// snapshot can show a connection without its participant.
    pub async fn admit(
        &self,
        conn: ConnectionId,
        participant_id: &str,
        name: &str,
        is_admin: bool,
        sink: Arc<dyn ClientSink>,
    ) {
        let mut state = self.state.lock().await;
        state.join(participant_id, name, is_admin);
        state.register(conn, participant_id, sink);
        info!(session = %self.id, participant = %participant_id, connection = %conn, is_admin, "Participant admitted");
    }

    pub async fn vote(&self, participant_id: &str, ballot: Ballot) -> Outcome {
        let mut state = self.state.lock().await;
        let participant = state.participant_mut(participant_id)?;
        if participant.is_admin {
            return Err(Rejection::AdminCannotVote);
        }
        participant.vote = Vote::from(ballot);
        Ok(())
    }

    pub async fn reveal(&self, participant_id: &str) -> Outcome {
        let mut state = self.state.lock().await;
        state.require_admin(participant_id)?;
        state.revealed = true;
        Ok(())
    }

    /// Hides the votes again and clears every participant's vote.
    pub async fn reset(&self, participant_id: &str) -> Outcome {
        let mut state = self.state.lock().await;
        state.require_admin(participant_id)?;
        state.revealed = false;
        for participant in state.participants.values_mut() {
            participant.vote = Vote::NoVote;
        }
        Ok(())
    }

    /// Removes `target_id` whatever its role. Removing an unknown target is a no-op.
    pub async fn remove(&self, admin_id: &str, target_id: &str) -> Outcome {
        let mut state = self.state.lock().await;
        state.require_admin(admin_id)?;
        if state.participants.remove(target_id).is_some() {
            info!(session = %self.id, admin = %admin_id, target = %target_id, "Participant removed");
        }
        Ok(())
    }

    /// Removes every participant that is no longer connected.
    pub async fn cleanup(&self, participant_id: &str) -> Outcome {
        let mut state = self.state.lock().await;
        state.require_admin(participant_id)?;
        let before = state.participants.len();
        state.participants.retain(|_, p| p.is_active);
        info!(session = %self.id, removed = before - state.participants.len(), "Inactive participants cleaned up");
        Ok(())
    }

    pub async fn change_name(&self, participant_id: &str, new_name: &str) -> Outcome {
        let mut state = self.state.lock().await;
        state.participant_mut(participant_id)?.name = new_name.to_string();
        Ok(())
    }

    pub async fn change_role(&self, participant_id: &str, is_admin: bool) -> Outcome {
        let mut state = self.state.lock().await;
        state.participant_mut(participant_id)?.is_admin = is_admin;
        info!(session = %self.id, participant = %participant_id, is_admin, "Participant role changed");
        Ok(())
    }

    /// Forgets the connection and marks its participant inactive.
    ///
    /// The participant stays in the session until an admin runs `cleanup`. It
    /// is left active while another live connection still speaks for it.
    pub async fn disconnect(&self, conn: ConnectionId, participant_id: &str) {
        let mut state = self.state.lock().await;
        state.connections.remove(&conn);
        let still_connected = state
            .connections
            .values()
            .any(|c| c.participant_id == participant_id);
        if still_connected {
            debug!(session = %self.id, participant = %participant_id, "Participant still has a live connection");
            return;
        }
        if let Some(participant) = state.participants.get_mut(participant_id) {
            participant.is_active = false;
        }
    }

    /// A consistent copy of the session as clients see it.
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.snapshot(&self.id)
    }

    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    /// Whether `conn` is still registered, i.e. has not been pruned by a
    /// failed write or forgotten by `disconnect`.
    pub async fn has_connection(&self, conn: ConnectionId) -> bool {
        self.state.lock().await.connections.contains_key(&conn)
    }

    /// Sends the current snapshot to a single client.
    pub async fn send_snapshot(&self, sink: &dyn ClientSink) -> Result<(), SessionError> {
        let state = self.state.lock().await;
        let payload = serde_json::to_string(&state.snapshot(&self.id))?;
        sink.send_text(payload).await?;
        Ok(())
    }

    /// Sends the current snapshot to every registered connection.
    ///
    /// A connection whose write fails is dropped from the session and closed;
    /// delivery to the others continues. Returns the number of connections
    /// that received the snapshot.
    pub async fn publish(&self) -> Result<usize, SessionError> {
        // The lock is held across the writes: every connection receives the
        // same sequence of snapshots, at the cost of a slow client delaying
        // mutators on this session.
        let mut state = self.state.lock().await;
        let payload = serde_json::to_string(&state.snapshot(&self.id))?;

        let mut failed = Vec::new();
        for (conn_id, conn) in &state.connections {
            if let Err(e) = conn.sink.send_text(payload.clone()).await {
                warn!(
                    session = %self.id,
                    connection = %conn_id,
                    participant = %conn.participant_id,
                    error = %e,
                    "Dropping connection after failed write"
                );
                failed.push(*conn_id);
            }
        }
        for conn_id in failed {
            if let Some(conn) = state.connections.remove(&conn_id) {
                conn.sink.close().await;
            }
        }
        Ok(state.connections.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MockClientSink;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Records every frame it is given; fails once closed.
    #[derive(Default)]
    struct RecordingSink {
        frames: StdMutex<Vec<String>>,
        closed: AtomicBool,
    }

    impl RecordingSink {
        fn frames(&self) -> Vec<Value> {
            self.frames
                .lock()
                .unwrap()
                .iter()
                .map(|f| serde_json::from_str(f).unwrap())
                .collect()
        }

        fn last(&self) -> Value {
            self.frames().pop().expect("no frame received")
        }
    }

    #[async_trait]
    impl ClientSink for RecordingSink {
        async fn send_text(&self, text: String) -> Result<(), SinkError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(SinkError::Closed);
            }
            self.frames.lock().unwrap().push(text);
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    async fn session_with_admin_and_voter() -> Session {
        let session = Session::new("S1");
        session.join("a", "Alice", true).await;
        session.join("b", "Bob", false).await;
        session
    }

    #[tokio::test]
    async fn test_rejoin_with_same_identity_never_duplicates() {
        let session = Session::new("S1");
        session.join("b", "Bob", false).await;
        session.vote("b", Ballot::Card(3.0)).await.unwrap();
        session.join("b", "Robert", true).await;
        session.join("b", "Bobby", false).await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.participants.len(), 1);
        let bob = &snapshot.participants["b"];
        assert_eq!(bob.name, "Bobby");
        assert!(!bob.is_admin);
        assert!(bob.is_active);
        assert_eq!(bob.vote, Vote::Card(3.0));
    }

    #[tokio::test]
    async fn test_admin_votes_are_never_recorded() {
        let session = session_with_admin_and_voter().await;

        for ballot in [Ballot::Card(0.0), Ballot::Card(13.0), Ballot::Abstain] {
            assert_eq!(
                session.vote("a", ballot).await,
                Err(Rejection::AdminCannotVote)
            );
        }
        assert_eq!(session.snapshot().await.participants["a"].vote, Vote::NoVote);
    }

    #[tokio::test]
    async fn test_voter_can_vote_and_abstain() {
        let session = session_with_admin_and_voter().await;

        session.vote("b", Ballot::Card(8.0)).await.unwrap();
        assert_eq!(session.snapshot().await.participants["b"].vote, Vote::Card(8.0));

        session.vote("b", Ballot::Abstain).await.unwrap();
        assert_eq!(session.snapshot().await.participants["b"].vote, Vote::Abstain);

        assert_eq!(
            session.vote("ghost", Ballot::Card(1.0)).await,
            Err(Rejection::UnknownParticipant)
        );
    }

    #[tokio::test]
    async fn test_reveal_and_reset_require_admin() {
        let session = session_with_admin_and_voter().await;
        session.vote("b", Ballot::Card(5.0)).await.unwrap();

        assert_eq!(session.reveal("b").await, Err(Rejection::NotAdmin));
        assert!(!session.snapshot().await.revealed);

        session.reveal("a").await.unwrap();
        assert_eq!(session.reset("b").await, Err(Rejection::NotAdmin));
        let snapshot = session.snapshot().await;
        assert!(snapshot.revealed);
        assert_eq!(snapshot.participants["b"].vote, Vote::Card(5.0));
    }

    #[tokio::test]
    async fn test_reset_clears_every_vote_and_hides() {
        let session = session_with_admin_and_voter().await;
        session.join("c", "Carol", false).await;
        session.vote("b", Ballot::Card(5.0)).await.unwrap();
        session.vote("c", Ballot::Abstain).await.unwrap();
        session.reveal("a").await.unwrap();

        session.reset("a").await.unwrap();

        let snapshot = session.snapshot().await;
        assert!(!snapshot.revealed);
        assert!(snapshot.participants.values().all(|p| p.vote == Vote::NoVote));
    }

    #[tokio::test]
    async fn test_remove_by_non_admin_is_a_no_op() {
        let session = session_with_admin_and_voter().await;
        session.join("c", "Carol", false).await;

        assert_eq!(session.remove("b", "c").await, Err(Rejection::NotAdmin));
        assert_eq!(session.remove("ghost", "c").await, Err(Rejection::UnknownParticipant));
        assert!(session.snapshot().await.participants.contains_key("c"));

        // Admins can remove anyone, including other admins.
        session.join("d", "Dana", true).await;
        session.remove("a", "d").await.unwrap();
        session.remove("a", "c").await.unwrap();
        session.remove("a", "missing").await.unwrap();
        let snapshot = session.snapshot().await;
        assert!(!snapshot.participants.contains_key("c"));
        assert!(!snapshot.participants.contains_key("d"));
        assert_eq!(snapshot.participants.len(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_marks_inactive_and_cleanup_removes() {
        let session = session_with_admin_and_voter().await;
        let conn = ConnectionId::new();
        session
            .register_connection(conn, "b", Arc::new(RecordingSink::default()))
            .await;

        session.disconnect(conn, "b").await;
        let snapshot = session.snapshot().await;
        assert!(!snapshot.participants["b"].is_active);
        assert_eq!(session.connection_count().await, 0);

        assert_eq!(session.cleanup("b").await, Err(Rejection::NotAdmin));
        assert!(session.snapshot().await.participants.contains_key("b"));

        session.cleanup("a").await.unwrap();
        let snapshot = session.snapshot().await;
        assert!(!snapshot.participants.contains_key("b"));
        assert!(snapshot.participants.contains_key("a"));
    }

    #[tokio::test]
    async fn test_disconnect_keeps_participant_active_with_another_connection() {
        let session = Session::new("S1");
        let first = ConnectionId::new();
        let second = ConnectionId::new();
        session
            .admit(first, "b", "Bob", false, Arc::new(RecordingSink::default()))
            .await;
        session
            .admit(second, "b", "Bob", false, Arc::new(RecordingSink::default()))
            .await;

        session.disconnect(first, "b").await;
        assert!(session.snapshot().await.participants["b"].is_active);

        session.disconnect(second, "b").await;
        assert!(!session.snapshot().await.participants["b"].is_active);
    }

    #[tokio::test]
    async fn test_rejoin_reactivates_participant() {
        let session = Session::new("S1");
        let conn = ConnectionId::new();
        session
            .admit(conn, "b", "Bob", false, Arc::new(RecordingSink::default()))
            .await;
        session.disconnect(conn, "b").await;

        session
            .admit(ConnectionId::new(), "b", "Bob", false, Arc::new(RecordingSink::default()))
            .await;
        assert!(session.snapshot().await.participants["b"].is_active);
    }

    #[tokio::test]
    async fn test_name_and_role_changes_require_known_participant() {
        let session = session_with_admin_and_voter().await;

        assert_eq!(
            session.change_name("ghost", "Casper").await,
            Err(Rejection::UnknownParticipant)
        );
        assert_eq!(
            session.change_role("ghost", true).await,
            Err(Rejection::UnknownParticipant)
        );

        session.change_name("b", "Bobby").await.unwrap();
        session.change_role("b", true).await.unwrap();
        let snapshot = session.snapshot().await;
        let bob = &snapshot.participants["b"];
        assert_eq!(bob.name, "Bobby");
        assert!(bob.is_admin);
    }

    #[tokio::test]
    async fn test_voting_round_scenario() {
        let session = Session::new("S1");
        let alice = Arc::new(RecordingSink::default());
        let bob = Arc::new(RecordingSink::default());
        session
            .admit(ConnectionId::new(), "A", "Alice", true, alice.clone())
            .await;
        session
            .admit(ConnectionId::new(), "B", "Bob", false, bob.clone())
            .await;

        session.vote("B", Ballot::Card(5.0)).await.unwrap();
        assert_eq!(session.publish().await.unwrap(), 2);
        let state = alice.last();
        assert_eq!(state["revealed"], json!(false));
        assert_eq!(state["participants"]["B"]["vote"], json!(5));

        session.reveal("A").await.unwrap();
        session.publish().await.unwrap();
        let state = bob.last();
        assert_eq!(state["revealed"], json!(true));
        assert_eq!(state["participants"]["B"]["vote"], json!(5));

        session.reset("A").await.unwrap();
        session.publish().await.unwrap();
        for sink in [&alice, &bob] {
            let state = sink.last();
            assert_eq!(state["id"], json!("S1"));
            assert_eq!(state["revealed"], json!(false));
            assert_eq!(state["participants"]["B"]["vote"], json!(null));
            assert!(state.get("connections").is_none());
        }
    }

    #[tokio::test]
    async fn test_failing_connection_is_pruned_without_blocking_others() {
        let session = session_with_admin_and_voter().await;
        let healthy_a = Arc::new(RecordingSink::default());
        let healthy_b = Arc::new(RecordingSink::default());

        let mut broken = MockClientSink::new();
        broken
            .expect_send_text()
            .times(1)
            .returning(|_| Err(SinkError::Transport("broken pipe".into())));
        broken.expect_close().times(1).returning(|| ());

        let (conn_a, conn_broken, conn_b) =
            (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());
        session.register_connection(conn_a, "a", healthy_a.clone()).await;
        session
            .register_connection(conn_broken, "b", Arc::new(broken))
            .await;
        session.register_connection(conn_b, "b", healthy_b.clone()).await;

        assert_eq!(session.publish().await.unwrap(), 2);
        assert_eq!(healthy_a.frames().len(), 1);
        assert_eq!(healthy_b.frames().len(), 1);
        assert_eq!(session.connection_count().await, 2);
        assert!(!session.has_connection(conn_broken).await);
        assert!(session.has_connection(conn_a).await);
        assert!(session.has_connection(conn_b).await);

        // The broken sink is gone and is not written to again.
        assert_eq!(session.publish().await.unwrap(), 2);
        assert_eq!(healthy_a.frames().len(), 2);
        assert_eq!(healthy_b.frames().len(), 2);
    }

    #[tokio::test]
    async fn test_send_snapshot_reports_delivery_failure() {
        let session = session_with_admin_and_voter().await;
        let sink = RecordingSink::default();
        session.send_snapshot(&sink).await.unwrap();
        assert_eq!(sink.last()["participants"]["a"]["name"], json!("Alice"));

        sink.close().await;
        assert!(matches!(
            session.send_snapshot(&sink).await,
            Err(SessionError::Delivery(SinkError::Closed))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_mutations_publish_whole_snapshots_in_one_order() {
        let session = Arc::new(session_with_admin_and_voter().await);
        let sinks: Vec<Arc<RecordingSink>> =
            (0..3).map(|_| Arc::new(RecordingSink::default())).collect();
        for sink in &sinks {
            session
                .register_connection(ConnectionId::new(), "a", sink.clone())
                .await;
        }
        session.vote("b", Ballot::Card(5.0)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    session.reveal("a").await.unwrap();
                } else {
                    session.reset("a").await.unwrap();
                }
                session.publish().await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let reference = sinks[0].frames();
        assert_eq!(reference.len(), 20);
        for sink in &sinks[1..] {
            assert_eq!(sink.frames(), reference);
        }

        // Once any reset has landed, the old vote can never reappear.
        let mut seen_reset = false;
        for frame in &reference {
            let vote = &frame["participants"]["b"]["vote"];
            if vote.is_null() {
                seen_reset = true;
            } else {
                assert!(!seen_reset, "stale vote published after reset");
                assert_eq!(vote, &json!(5));
            }
        }
    }
}
