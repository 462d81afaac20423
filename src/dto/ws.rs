//! WebSocket framing: event names, inbound client messages and the outbound envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use validator::Validate;

use crate::dto::room::{
    ChatMessageRequest, CreateRoomRequest, JoinRoomRequest, KickRoomRequest,
    SetPlayerNameRequest, StartGameRequest, UpdatePositionRequest, UpdateRoomOptionRequest,
    UpdateRoomQuizsetRequest,
};

// Event names shared by inbound and outbound frames.

/// Host creates a room.
pub const EVENT_CREATE_ROOM: &str = "createRoom";
/// Player joins, or roster delta.
pub const EVENT_JOIN_ROOM: &str = "joinRoom";
/// Member left.
pub const EVENT_EXIT_ROOM: &str = "exitRoom";
/// Board move, or batch of moves.
pub const EVENT_UPDATE_POSITION: &str = "updatePosition";
/// Chat line, or batch of lines.
pub const EVENT_CHAT_MESSAGE: &str = "chatMessage";
/// Display name change.
pub const EVENT_SET_PLAYER_NAME: &str = "setPlayerName";
/// Host removes a member.
pub const EVENT_KICK_ROOM: &str = "kickRoom";
/// Host changes the room settings.
pub const EVENT_UPDATE_ROOM_OPTION: &str = "updateRoomOption";
/// Host selects the quiz set.
pub const EVENT_UPDATE_ROOM_QUIZSET: &str = "updateRoomQuizset";
/// Host starts the round.
pub const EVENT_START_GAME: &str = "startGame";
/// A question opens.
pub const EVENT_START_QUIZ_TIME: &str = "startQuizTime";
/// A question closes.
pub const EVENT_END_QUIZ_TIME: &str = "endQuizTime";
/// The round is over.
pub const EVENT_END_GAME: &str = "endGame";
/// Failure report for one request.
pub const EVENT_ERROR: &str = "error";

/// Messages accepted from game clients, framed as `{ "event": ..., "data": ... }`.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    /// See [`EVENT_CREATE_ROOM`].
    CreateRoom(CreateRoomRequest),
    /// See [`EVENT_JOIN_ROOM`].
    JoinRoom(JoinRoomRequest),
    /// See [`EVENT_UPDATE_POSITION`].
    UpdatePosition(UpdatePositionRequest),
    /// See [`EVENT_CHAT_MESSAGE`].
    ChatMessage(ChatMessageRequest),
    /// See [`EVENT_UPDATE_ROOM_OPTION`].
    UpdateRoomOption(UpdateRoomOptionRequest),
    /// See [`EVENT_UPDATE_ROOM_QUIZSET`].
    UpdateRoomQuizset(UpdateRoomQuizsetRequest),
    /// See [`EVENT_KICK_ROOM`].
    KickRoom(KickRoomRequest),
    /// See [`EVENT_START_GAME`].
    StartGame(StartGameRequest),
    /// See [`EVENT_SET_PLAYER_NAME`].
    SetPlayerName(SetPlayerNameRequest),
}

/// Why an inbound frame was refused.
#[derive(Debug, Error)]
pub enum ClientMessageError {
    /// Not a known `{ event, data }` frame.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Payload failed validation.
    #[error("invalid `{event}` payload: {source}")]
    Invalid {
        /// Event of the refused frame.
        event: &'static str,
        /// Failed rules.
        #[source]
        source: validator::ValidationErrors,
    },
}

impl ClientMessage {
    /// Parse a text frame and validate its payload.
    pub fn from_json_str(text: &str) -> Result<Self, ClientMessageError> {
        let message: Self = serde_json::from_str(text)?;
        let validated = match &message {
            ClientMessage::CreateRoom(data) => data.validate(),
            ClientMessage::JoinRoom(data) => data.validate(),
            ClientMessage::UpdatePosition(data) => data.validate(),
            ClientMessage::ChatMessage(data) => data.validate(),
            ClientMessage::UpdateRoomOption(data) => data.validate(),
            ClientMessage::UpdateRoomQuizset(data) => data.validate(),
            ClientMessage::KickRoom(data) => data.validate(),
            ClientMessage::StartGame(data) => data.validate(),
            ClientMessage::SetPlayerName(data) => data.validate(),
        };
        validated.map_err(|source| ClientMessageError::Invalid {
            event: message.event_name(),
            source,
        })?;
        Ok(message)
    }

    /// Wire name of this message.
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::CreateRoom(_) => EVENT_CREATE_ROOM,
            ClientMessage::JoinRoom(_) => EVENT_JOIN_ROOM,
            ClientMessage::UpdatePosition(_) => EVENT_UPDATE_POSITION,
            ClientMessage::ChatMessage(_) => EVENT_CHAT_MESSAGE,
            ClientMessage::UpdateRoomOption(_) => EVENT_UPDATE_ROOM_OPTION,
            ClientMessage::UpdateRoomQuizset(_) => EVENT_UPDATE_ROOM_QUIZSET,
            ClientMessage::KickRoom(_) => EVENT_KICK_ROOM,
            ClientMessage::StartGame(_) => EVENT_START_GAME,
            ClientMessage::SetPlayerName(_) => EVENT_SET_PLAYER_NAME,
        }
    }
}

/// Frame pushed to a socket, using the same envelope as inbound messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerMessage {
    /// Event name.
    pub event: String,
    /// Event payload.
    pub data: Value,
}

impl ServerMessage {
    /// Serialize `payload` under `event`.
    pub fn json(event: &str, payload: &impl Serialize) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: event.to_string(),
            data: serde_json::to_value(payload)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_frames() {
        let message = ClientMessage::from_json_str(
            r#"{"event":"updatePosition","data":{"gameId":"123456","newPosition":[0.1,0.9]}}"#,
        )
        .unwrap();
        match message {
            ClientMessage::UpdatePosition(data) => {
                assert_eq!(data.game_id, "123456");
                assert_eq!(data.new_position, [0.1, 0.9]);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn invalid_payload_names_the_event() {
        let err = ClientMessage::from_json_str(
            r#"{"event":"kickRoom","data":{"gameId":"12","kickPlayerId":"p2"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ClientMessageError::Invalid { event: EVENT_KICK_ROOM, .. }));
    }

    #[test]
    fn unknown_event_is_malformed() {
        let err = ClientMessage::from_json_str(r#"{"event":"teleport","data":{}}"#).unwrap_err();
        assert!(matches!(err, ClientMessageError::Malformed(_)));
    }
}
