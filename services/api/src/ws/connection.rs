//! Manages the WebSocket connection lifecycle of one participant.
//!
//! Connecting: the upgrade request is validated and the participant admitted.
//! Active: frames are decoded into commands, dispatched to the session, and
//! followed by a session-wide publish (except `ping`).
//! Closed: the participant is disconnected, the session is told, and the
//! socket is released. This runs once, whatever ended the connection.

use super::{protocol::ServerMessage, sink::WsSink};
use crate::{
    error::ApiError,
    models::{ConnectParams, ConnectRequest},
    state::AppState,
};
use anyhow::{Context, Result};
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{Stream, StreamExt};
use poker_core::{ClientSink, Command, ConnectionId, Session};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Axum handler that validates the connection parameters and upgrades to a WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let request = params
        .validate()
        .ok_or_else(|| ApiError::BadRequest("Missing session ID or name".to_string()))?;

    let limit = state.config.max_message_bytes;
    Ok(ws
        .max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| handle_socket(socket, state, request)))
}

#[instrument(name = "ws_connection", skip_all, fields(session = %request.session_id, participant))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, request: ConnectRequest) {
    let participant_id = request
        .participant_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    tracing::Span::current().record("participant", participant_id.as_str());

    let conn_id = ConnectionId::new();
    let (socket_tx, socket_rx) = socket.split();
    let sink = Arc::new(WsSink::new(socket_tx));
    let session = state.store.get_or_create(&request.session_id).await;

    session
        .admit(
            conn_id,
            &participant_id,
            &request.name,
            request.is_admin,
            sink.clone(),
        )
        .await;
    info!(connection = %conn_id, name = %request.name, "New WebSocket connection");

    serve(&session, conn_id, &participant_id, sink.as_ref(), socket_rx).await;
}

/// Drives an admitted connection through Active and then Closed.
///
/// Whatever ends the Active state (end of stream, close frame, read error,
/// failed reply, or pruning by a broadcast), the Closed steps run once.
async fn serve<S>(
    session: &Session,
    conn_id: ConnectionId,
    participant_id: &str,
    sink: &dyn ClientSink,
    inbound: S,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    if let Err(e) = run_connection(session, conn_id, participant_id, sink, inbound).await {
        warn!(error = ?e, "WebSocket connection ended with error");
    }

    session.disconnect(conn_id, participant_id).await;
    broadcast(session).await;
    sink.close().await;
    info!(connection = %conn_id, "WebSocket connection closed");
}

/// The Active state: reads one frame at a time until the connection ends.
async fn run_connection<S>(
    session: &Session,
    conn_id: ConnectionId,
    participant_id: &str,
    sink: &dyn ClientSink,
    mut inbound: S,
) -> Result<()>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    session
        .send_snapshot(sink)
        .await
        .context("Failed to send initial session state")?;
    broadcast(session).await;

    loop {
        // A failed write during any broadcast prunes this connection.
        if !session.has_connection(conn_id).await {
            info!("Connection dropped by broadcast after failed write.");
            break;
        }

        let Some(msg_result) = inbound.next().await else {
            break;
        };
        let text = match msg_result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                info!("Client sent close frame.");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Ok(Message::Binary(data)) => {
                warn!(len = data.len(), "Ignoring non-text message");
                continue;
            }
            Err(e) => return Err(e).context("Error receiving from client WebSocket"),
        };

        let command = match Command::decode(text.as_str()) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable message");
                continue;
            }
        };
        debug!(?command, "Received command");

        let triggers_broadcast = command.triggers_broadcast();
        dispatch(session, participant_id, sink, command).await?;
        if triggers_broadcast {
            broadcast(session).await;
        }
    }
    Ok(())
}

/// Applies one command on behalf of `participant_id`.
///
/// Rejected commands are silent for the client; an error is returned only
/// when a direct reply could not be written, which ends the connection.
async fn dispatch(
    session: &Session,
    participant_id: &str,
    sink: &dyn ClientSink,
    command: Command,
) -> Result<()> {
    let outcome = match command {
        Command::Ping => {
            return send_msg(sink, ServerMessage::Pong)
                .await
                .context("Failed to send pong");
        }
        Command::Vote { vote } => session.vote(participant_id, vote).await,
        Command::Reveal => session.reveal(participant_id).await,
        Command::Reset => session.reset(participant_id).await,
        Command::Remove { target_id } => session.remove(participant_id, &target_id).await,
        Command::Cleanup => session.cleanup(participant_id).await,
        Command::ChangeName { new_name } => {
            let outcome = session.change_name(participant_id, &new_name).await;
            if outcome.is_ok() {
                send_msg(sink, ServerMessage::NameChangeConfirmation { new_name })
                    .await
                    .context("Failed to send name change confirmation")?;
            }
            outcome
        }
        Command::ChangeRole { new_role } => {
            let outcome = session.change_role(participant_id, new_role).await;
            if outcome.is_ok() {
                send_msg(sink, ServerMessage::RoleChangeConfirmation { new_role })
                    .await
                    .context("Failed to send role change confirmation")?;
            }
            outcome
        }
    };

    if let Err(rejection) = outcome {
        debug!(%rejection, "Command rejected");
    }
    Ok(())
}

async fn broadcast(session: &Session) {
    match session.publish().await {
        Ok(delivered) => debug!(delivered, "Session state broadcast"),
        Err(e) => error!(error = %e, "Failed to broadcast session state"),
    }
}

/// A helper function to serialize and send a `ServerMessage` to one client.
async fn send_msg(sink: &dyn ClientSink, msg: ServerMessage) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    sink.send_text(serialized).await?;
    Ok(())
}
