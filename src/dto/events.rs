//! Payloads emitted to game clients.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::{
    player::Player,
    room::{GameMode, Room, RoomStatus},
};

/// Sent to the host once its room exists.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomEvent {
    /// PIN of the new room.
    pub game_id: String,
}

/// Roster entry as seen by other room members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    /// Player identifier.
    pub player_id: String,
    /// Display name.
    pub player_name: String,
    /// Board position as `[x, y]`.
    pub player_position: [f64; 2],
    /// Set only on the entry of the room host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_host: Option<bool>,
}

impl From<&Player> for PlayerSnapshot {
    fn from(player: &Player) -> Self {
        Self {
            player_id: player.id.clone(),
            player_name: player.name.clone(),
            player_position: player.position.as_pair(),
            is_host: None,
        }
    }
}

/// Roster delta announced when players join.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JoinRoomEvent {
    /// Joined players.
    pub players: Vec<PlayerSnapshot>,
}

/// A member left the room.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExitRoomEvent {
    /// Departed player.
    pub player_id: String,
}

/// The host removed a member.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KickRoomEvent {
    /// Kicked player.
    pub player_id: String,
}

/// A member changed their display name.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerNameEvent {
    /// Renamed player.
    pub player_id: String,
    /// New display name.
    pub player_name: String,
}

/// Entry of an `updatePosition` batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    /// Moved player.
    pub player_id: String,
    /// New position as `[x, y]`.
    pub player_position: [f64; 2],
}

/// Chat line as published on `chat:<pin>` and delivered in `chatMessage` batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    /// Sender.
    pub player_id: String,
    /// Sender name at send time.
    pub player_name: String,
    /// Message text.
    pub message: String,
    /// RFC 3339 send time.
    pub timestamp: String,
}

/// Room settings after a host update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomOptionEvent {
    /// Room title.
    pub title: String,
    /// Scoring rules.
    pub game_mode: GameMode,
    /// Capacity.
    pub max_player_count: u32,
    /// Listed publicly.
    pub is_public: bool,
}

impl From<&Room> for RoomOptionEvent {
    fn from(room: &Room) -> Self {
        Self {
            title: room.title.clone(),
            game_mode: room.game_mode,
            max_player_count: room.max_player_count,
            is_public: room.is_public,
        }
    }
}

/// Quiz set selection after a host update.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomQuizsetEvent {
    /// Selected set, `-1` for the built-in one.
    pub quiz_set_id: i64,
    /// Number of quizzes drawn from the set.
    pub quiz_count: u32,
    /// Title of the selected set.
    pub quiz_set_title: String,
}

impl From<&Room> for RoomQuizsetEvent {
    fn from(room: &Room) -> Self {
        Self {
            quiz_set_id: room.quiz_set_id,
            quiz_count: room.quiz_count,
            quiz_set_title: room.quiz_set_title.clone(),
        }
    }
}

/// The round has started.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StartGameEvent {}

/// Choice as shown on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChoiceSnapshot {
    /// 1-based board column.
    pub order: u32,
    /// Displayed text.
    pub content: String,
}

/// Question opened for answers, sent to the whole room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartQuizTimeEvent {
    /// Question text.
    pub quiz: String,
    /// Choices in board order.
    pub choice_list: Vec<ChoiceSnapshot>,
    /// Unix milliseconds.
    pub start_time: i64,
    /// Unix milliseconds.
    pub end_time: i64,
}

/// Outcome of one member for the question that just closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuizResultEntry {
    /// Member.
    pub player_id: String,
    /// Stood on the correct choice.
    pub is_answer: bool,
    /// Still in play after this question.
    pub is_alive: bool,
    /// Total score so far.
    pub score: f64,
}

/// Correct choice and per-member results once a question closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EndQuizTimeEvent {
    /// 1-based correct choice.
    pub answer: u32,
    /// Result of every member.
    pub players: Vec<QuizResultEntry>,
}

/// Final ranking sent when the last question has closed.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndGameEvent {
    /// Room host.
    pub host_id: String,
    /// Members ordered by score, highest first.
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Structured failure sent back to the socket that issued `event`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorEvent {
    /// Event that failed.
    pub event: String,
    /// Human readable reason.
    pub message: String,
}

/// Public view of a room, served to the PIN entry page.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    /// Room PIN.
    pub game_id: String,
    /// Room title.
    pub title: String,
    /// Scoring rules.
    pub game_mode: GameMode,
    /// Capacity.
    pub max_player_count: u32,
    /// Current members.
    pub current_player_count: usize,
    /// Lifecycle stage.
    pub status: RoomStatus,
    /// Listed publicly.
    pub is_public: bool,
}

/// Score of one member.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// Member.
    pub player_id: String,
    /// Accumulated points.
    pub score: f64,
}
