//! Room entity, game modes and the quiz pointer.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dao::{keyed_store::Fields, quiz_source::DEFAULT_QUIZ_SET_ID};

/// Hash field names of a `Room:<pin>` entry.
pub mod fields {
    /// Host player id.
    pub const HOST: &str = "host";
    /// `waiting` or `playing`.
    pub const STATUS: &str = "status";
    /// `"1"` while joins are accepted.
    pub const IS_WAITING: &str = "isWaiting";
    /// Room title.
    pub const TITLE: &str = "title";
    /// `ranking` or `survival`.
    pub const GAME_MODE: &str = "gameMode";
    /// Capacity.
    pub const MAX_PLAYER_COUNT: &str = "maxPlayerCount";
    /// `"1"` when listed.
    pub const IS_PUBLIC: &str = "isPublic";
    /// Heartbeat in Unix milliseconds.
    pub const LAST_ACTIVITY_AT: &str = "lastActivityAt";
    /// Selected quiz set.
    pub const QUIZ_SET_ID: &str = "quizSetId";
    /// Quizzes drawn per round.
    pub const QUIZ_COUNT: &str = "quizCount";
    /// Title of the selected set.
    pub const QUIZ_SET_TITLE: &str = "quizSetTitle";
}

/// How a round is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Everyone plays every quiz; the leaderboard decides.
    #[serde(alias = "RANKING")]
    Ranking,
    /// Wrong answers eliminate players, who keep watching as spectators.
    #[serde(alias = "SURVIVAL")]
    Survival,
}

impl GameMode {
    /// Stored and wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Ranking => "ranking",
            GameMode::Survival => "survival",
        }
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "ranking" => Ok(GameMode::Ranking),
            "survival" => Ok(GameMode::Survival),
            other => Err(format!("unknown game mode `{other}`")),
        }
    }
}

/// Lifecycle stage of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// Lobby, accepting players.
    Waiting,
    /// A round is running.
    Playing,
}

impl RoomStatus {
    /// Stored and wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Playing => "playing",
        }
    }
}

/// Room snapshot decoded from its hash.
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    /// Six digit PIN.
    pub id: String,
    /// Host player id.
    pub host: String,
    /// Lifecycle stage.
    pub status: RoomStatus,
    /// Joins accepted.
    pub is_waiting: bool,
    /// Room title.
    pub title: String,
    /// Scoring rules.
    pub game_mode: GameMode,
    /// Capacity.
    pub max_player_count: u32,
    /// Listed publicly.
    pub is_public: bool,
    /// Unix timestamp in milliseconds.
    pub last_activity_at: i64,
    /// Selected quiz set.
    pub quiz_set_id: i64,
    /// Quizzes drawn per round.
    pub quiz_count: u32,
    /// Title of the selected set.
    pub quiz_set_title: String,
}

impl Room {
    /// Decode a room hash; an empty hash means the room does not exist.
    pub fn from_fields(id: &str, hash: &Fields) -> Option<Self> {
        if hash.is_empty() {
            return None;
        }
        let text = |name: &str| hash.get(name).cloned().unwrap_or_default();

        Some(Self {
            id: id.to_string(),
            host: text(fields::HOST),
            status: match hash.get(fields::STATUS).map(String::as_str) {
                Some("playing") => RoomStatus::Playing,
                _ => RoomStatus::Waiting,
            },
            is_waiting: hash.get(fields::IS_WAITING).map(String::as_str) != Some("0"),
            title: text(fields::TITLE),
            game_mode: text(fields::GAME_MODE).parse().unwrap_or(GameMode::Ranking),
            max_player_count: parse_or(hash, fields::MAX_PLAYER_COUNT, 0),
            is_public: hash.get(fields::IS_PUBLIC).map(String::as_str) == Some("1"),
            last_activity_at: parse_or(hash, fields::LAST_ACTIVITY_AT, 0),
            quiz_set_id: parse_or(hash, fields::QUIZ_SET_ID, DEFAULT_QUIZ_SET_ID),
            quiz_count: parse_or(hash, fields::QUIZ_COUNT, 0),
            quiz_set_title: text(fields::QUIZ_SET_TITLE),
        })
    }

    /// Full hash representation used when the room is created.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            (fields::HOST.into(), self.host.clone()),
            (fields::STATUS.into(), self.status.as_str().into()),
            (fields::IS_WAITING.into(), flag(self.is_waiting)),
            (fields::TITLE.into(), self.title.clone()),
            (fields::GAME_MODE.into(), self.game_mode.as_str().into()),
            (fields::MAX_PLAYER_COUNT.into(), self.max_player_count.to_string()),
            (fields::IS_PUBLIC.into(), flag(self.is_public)),
            (fields::LAST_ACTIVITY_AT.into(), self.last_activity_at.to_string()),
            (fields::QUIZ_SET_ID.into(), self.quiz_set_id.to_string()),
            (fields::QUIZ_COUNT.into(), self.quiz_count.to_string()),
            (fields::QUIZ_SET_TITLE.into(), self.quiz_set_title.clone()),
        ]
    }

    /// Whether new players may join without being reconnecting members.
    pub fn is_joinable(&self) -> bool {
        self.status == RoomStatus::Waiting && self.is_waiting
    }
}

pub(crate) fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn parse_or<T: FromStr>(hash: &Fields, name: &str, fallback: T) -> T {
    hash.get(name)
        .and_then(|value| value.parse().ok())
        .unwrap_or(fallback)
}

/// Half of a quiz the pointer is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizPhase {
    /// Question open for answers.
    Start,
    /// Question closed, results shown.
    End,
}

/// Position of a room inside its round, stored as `"<index>:<phase>"`.
///
/// A round begins at `-1:end`, so the first advance opens quiz `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizPointer {
    /// 0-based quiz index, `-1` before the first.
    pub index: i64,
    /// Phase within that quiz.
    pub phase: QuizPhase,
}

impl QuizPointer {
    /// Pointer written when a round starts.
    pub const BEFORE_FIRST: QuizPointer = QuizPointer {
        index: -1,
        phase: QuizPhase::End,
    };

    /// Next pointer: `i:start -> i:end`, `i:end -> (i+1):start`.
    pub fn next(self) -> Self {
        match self.phase {
            QuizPhase::Start => QuizPointer {
                index: self.index,
                phase: QuizPhase::End,
            },
            QuizPhase::End => QuizPointer {
                index: self.index + 1,
                phase: QuizPhase::Start,
            },
        }
    }
}

impl fmt::Display for QuizPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self.phase {
            QuizPhase::Start => "start",
            QuizPhase::End => "end",
        };
        write!(f, "{}:{}", self.index, phase)
    }
}

impl FromStr for QuizPointer {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (index, phase) = value
            .split_once(':')
            .ok_or_else(|| format!("malformed quiz pointer `{value}`"))?;
        let index = index
            .parse::<i64>()
            .map_err(|_| format!("malformed quiz index in `{value}`"))?;
        let phase = match phase {
            "start" => QuizPhase::Start,
            "end" => QuizPhase::End,
            other => return Err(format!("unknown quiz phase `{other}`")),
        };
        Ok(Self { index, phase })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hash_is_missing_room() {
        assert!(Room::from_fields("123456", &Fields::new()).is_none());
    }

    #[test]
    fn decodes_created_room() {
        let room = Room {
            id: "123456".into(),
            host: "host".into(),
            status: RoomStatus::Waiting,
            is_waiting: true,
            title: "Quiz1".into(),
            game_mode: GameMode::Survival,
            max_player_count: 4,
            is_public: true,
            last_activity_at: 1_700_000_000_000,
            quiz_set_id: DEFAULT_QUIZ_SET_ID,
            quiz_count: 2,
            quiz_set_title: "Default quiz set".into(),
        };
        let hash = room.to_fields().into_iter().collect::<Fields>();

        assert_eq!(Room::from_fields("123456", &hash), Some(room));
    }

    #[test]
    fn game_mode_parsing_ignores_case() {
        assert_eq!("SURVIVAL".parse::<GameMode>(), Ok(GameMode::Survival));
        assert!("battle".parse::<GameMode>().is_err());
    }

    #[test]
    fn pointer_walks_start_and_end() {
        let first = QuizPointer::BEFORE_FIRST.next();
        assert_eq!(first.to_string(), "0:start");
        assert_eq!(first.next().to_string(), "0:end");
        assert_eq!(first.next().next().to_string(), "1:start");
        assert_eq!("-1:end".parse::<QuizPointer>(), Ok(QuizPointer::BEFORE_FIRST));
        assert!("1-start".parse::<QuizPointer>().is_err());
    }
}
