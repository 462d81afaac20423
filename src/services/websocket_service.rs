//! WebSocket session lifecycle and client message dispatch.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        events::{CreateRoomEvent, ErrorEvent, JoinRoomEvent, RoomOptionEvent},
        room::CreateRoomRequest,
        ws::{
            ClientMessage, ClientMessageError, EVENT_CREATE_ROOM, EVENT_ERROR, EVENT_JOIN_ROOM,
            EVENT_UPDATE_ROOM_OPTION, ServerMessage,
        },
    },
    error::ServiceError,
    services::{chat_service, presence_service, room_service, round_service},
    state::SharedState,
};

/// Connection metadata supplied by the client when opening the socket.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    /// Stable id of the client, reused across reconnects.
    pub player_id: String,
    /// Room to join right away.
    pub game_id: Option<String>,
    /// Raw `create-room` header; when present a room is created and joined.
    pub create_room: Option<String>,
}

/// Handle the full lifecycle for an individual game client connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket, params: ConnectionParams) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let payload = match serde_json::to_string(&message) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(event = %message.event, error = %err, "failed to serialize message (not retrying)");
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    let socket_id = Uuid::new_v4().to_string();
    let player_id = params.player_id.clone();
    state
        .connections()
        .register(&socket_id, &player_id, outbound_tx.clone());
    info!(player_id = %player_id, socket_id = %socket_id, "client connected");

    if let Err((event, err)) = bootstrap(&state, &socket_id, &params).await {
        send_error(&state, &socket_id, event, &err);
    }

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match ClientMessage::from_json_str(text.as_str()) {
                Ok(message) => {
                    let event = message.event_name();
                    if let Err(err) = handle_client_message(&state, &socket_id, &player_id, message).await {
                        warn!(player_id = %player_id, event, error = %err, "client action failed");
                        send_error(&state, &socket_id, event, &err);
                    }
                }
                Err(err) => {
                    warn!(player_id = %player_id, error = %err, "failed to parse or validate client message");
                    let event = match &err {
                        ClientMessageError::Invalid { event, .. } => *event,
                        ClientMessageError::Malformed(_) => EVENT_ERROR,
                    };
                    send_error(&state, &socket_id, event, &ServiceError::InvalidInput(err.to_string()));
                }
            },
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "client closed");
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(player_id = %player_id, error = %err, "websocket error");
                break;
            }
        }
    }

    if let Err(err) = release_player(&state, &player_id, &socket_id).await {
        warn!(player_id = %player_id, error = %err, "failed to release player on disconnect");
    }
    state.connections().unregister(&socket_id);
    info!(player_id = %player_id, socket_id = %socket_id, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Create and/or join the room named by the connection headers.
async fn bootstrap(
    state: &SharedState,
    socket_id: &str,
    params: &ConnectionParams,
) -> Result<(), (&'static str, ServiceError)> {
    let mut game_id = params.game_id.clone();

    if let Some(raw) = params.create_room.as_deref() {
        let request = CreateRoomRequest::from_header(raw).map_err(|err| (EVENT_CREATE_ROOM, err))?;
        let created = create_room(state, socket_id, &params.player_id, &request)
            .await
            .map_err(|err| (EVENT_CREATE_ROOM, err))?;
        game_id = Some(created);
    }

    if let Some(game_id) = game_id {
        join(state, socket_id, &params.player_id, &game_id, None)
            .await
            .map_err(|err| (EVENT_JOIN_ROOM, err))?;
    }
    Ok(())
}

async fn create_room(
    state: &SharedState,
    socket_id: &str,
    player_id: &str,
    request: &CreateRoomRequest,
) -> Result<String, ServiceError> {
    let game_id = room_service::create_room(state, request, player_id).await?;
    state.connections().emit_to_socket(
        socket_id,
        EVENT_CREATE_ROOM,
        &CreateRoomEvent {
            game_id: game_id.clone(),
        },
    );
    Ok(game_id)
}

/// Join a room and send the joiner its initial view: the room options, then the roster.
async fn join(
    state: &SharedState,
    socket_id: &str,
    player_id: &str,
    game_id: &str,
    player_name: Option<&str>,
) -> Result<(), ServiceError> {
    let outcome = room_service::join_room(state, game_id, player_id, player_name, Some(socket_id)).await?;
    let connections = state.connections();
    connections.emit_to_socket(
        socket_id,
        EVENT_UPDATE_ROOM_OPTION,
        &RoomOptionEvent::from(&outcome.room),
    );
    connections.emit_to_socket(
        socket_id,
        EVENT_JOIN_ROOM,
        &JoinRoomEvent {
            players: outcome.players,
        },
    );
    Ok(())
}

/// Execute one client action on behalf of `player_id`.
pub async fn handle_client_message(
    state: &SharedState,
    socket_id: &str,
    player_id: &str,
    message: ClientMessage,
) -> Result<(), ServiceError> {
    match message {
        ClientMessage::CreateRoom(request) => {
            let game_id = create_room(state, socket_id, player_id, &request).await?;
            join(state, socket_id, player_id, &game_id, None).await
        }
        ClientMessage::JoinRoom(request) => {
            join(
                state,
                socket_id,
                player_id,
                &request.game_id,
                request.player_name.as_deref(),
            )
            .await
        }
        ClientMessage::UpdatePosition(request) => {
            presence_service::update_position(state, &request, player_id).await
        }
        ClientMessage::ChatMessage(request) => {
            chat_service::chat_message(state, &request, player_id).await
        }
        ClientMessage::UpdateRoomOption(request) => {
            room_service::update_room_option(state, &request, player_id).await
        }
        ClientMessage::UpdateRoomQuizset(request) => {
            room_service::update_room_quizset(state, &request, player_id).await
        }
        ClientMessage::KickRoom(request) => room_service::kick_room(state, &request, player_id)
            .await
            .map(|_| ()),
        ClientMessage::StartGame(request) => {
            round_service::start_game(state, &request, player_id).await
        }
        ClientMessage::SetPlayerName(request) => {
            presence_service::set_player_name(state, &request, player_id).await
        }
    }
}

/// Run the exit path unless the player already moved to another socket.
async fn release_player(
    state: &SharedState,
    player_id: &str,
    socket_id: &str,
) -> Result<(), ServiceError> {
    let Some(player) = presence_service::fetch_player(state, player_id).await? else {
        return Ok(());
    };
    if player.socket_id.as_deref().is_some_and(|current| current != socket_id) {
        info!(player_id, "player reconnected on another socket, keeping membership");
        return Ok(());
    }
    room_service::handle_player_exit(state, player_id).await?;
    Ok(())
}

/// Structured failure payload for an action that failed.
pub fn error_event(event: &str, err: &ServiceError) -> ErrorEvent {
    match err {
        ServiceError::Rejected { event, reason } => ErrorEvent {
            event: event.to_string(),
            message: reason.to_string(),
        },
        ServiceError::Unavailable(_) => ErrorEvent {
            event: event.to_string(),
            message: "service temporarily unavailable".to_string(),
        },
        other => ErrorEvent {
            event: event.to_string(),
            message: other.to_string(),
        },
    }
}

fn send_error(state: &SharedState, socket_id: &str, event: &str, err: &ServiceError) {
    state
        .connections()
        .emit_to_socket(socket_id, EVENT_ERROR, &error_event(event, err));
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<ServerMessage>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    #[test]
    fn rejected_errors_name_the_failing_event() {
        let err = ServiceError::rejected(EVENT_JOIN_ROOM, ValidationError::RoomFull { current: 2, max: 2 });
        let payload = error_event("ignored", &err);
        assert_eq!(payload.event, EVENT_JOIN_ROOM);
        assert_eq!(payload.message, "room is full (2/2)");
    }

    #[test]
    fn other_errors_use_the_fallback_event() {
        let err = ServiceError::InvalidInput("bad".into());
        let payload = error_event(EVENT_CREATE_ROOM, &err);
        assert_eq!(payload.event, EVENT_CREATE_ROOM);
        assert_eq!(payload.message, "invalid input: bad");
    }
}
