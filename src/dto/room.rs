//! Client requests, validated after parsing.

use serde::{Deserialize, Deserializer, de};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::validation::{validate_pin, validate_position},
    error::ServiceError,
    state::room::GameMode,
};

/// Room configuration supplied by the host at creation time.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    /// Shown in the lobby, 1 to 20 characters.
    #[validate(length(min = 1, max = 20))]
    pub title: String,
    /// Scoring rules.
    pub game_mode: GameMode,
    /// Capacity, 1 to 200.
    #[validate(range(min = 1, max = 200))]
    pub max_player_count: u32,
    /// Listed publicly.
    #[serde(alias = "isPublicGame", deserialize_with = "flexible_bool")]
    pub is_public: bool,
}

impl CreateRoomRequest {
    /// Parse the `create-room` connection header (`title=Quiz;gameMode=ranking;...`).
    pub fn from_header(raw: &str) -> Result<Self, ServiceError> {
        let mut object = Map::new();
        for pair in raw.split([';', '&']).filter(|pair| !pair.trim().is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                ServiceError::InvalidInput(format!("malformed create-room entry `{pair}`"))
            })?;
            let key = key.trim();
            let value = value.trim();
            let value = match key {
                "maxPlayerCount" => value
                    .parse::<u32>()
                    .map(Value::from)
                    .map_err(|_| ServiceError::InvalidInput("maxPlayerCount must be a number".into()))?,
                _ => Value::String(value.to_string()),
            };
            object.insert(key.to_string(), value);
        }

        let request: Self = serde_json::from_value(Value::Object(object))
            .map_err(|err| ServiceError::InvalidInput(format!("invalid create-room header: {err}")))?;
        request.validate()?;
        Ok(request)
    }
}

/// Accept JSON booleans as well as `"true"`/`"false"`/`"1"`/`"0"` and `1`/`0`.
fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(value) => Ok(value),
        Value::Number(number) if number.as_u64() == Some(1) => Ok(true),
        Value::Number(number) if number.as_u64() == Some(0) => Ok(false),
        Value::String(text) => match text.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(de::Error::custom(format!("invalid boolean `{text}`"))),
        },
        other => Err(de::Error::custom(format!("invalid boolean `{other}`"))),
    }
}

/// Join a room by PIN.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    /// Room PIN.
    #[validate(custom(function = "validate_pin"))]
    pub game_id: String,
    /// Name to use, a generated one when absent.
    #[serde(default)]
    #[validate(length(min = 1, max = 20))]
    pub player_name: Option<String>,
}

/// Move on the board.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePositionRequest {
    /// Room PIN.
    #[validate(custom(function = "validate_pin"))]
    pub game_id: String,
    /// `[x, y]`, both within `[0, 1]`.
    #[validate(custom(function = "validate_position"))]
    pub new_position: [f64; 2],
}

/// Send a chat line to the room.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageRequest {
    /// Room PIN.
    #[validate(custom(function = "validate_pin"))]
    pub game_id: String,
    /// Text, 1 to 300 characters.
    #[validate(length(min = 1, max = 300))]
    pub message: String,
}

/// Host change of the room settings.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoomOptionRequest {
    /// Room PIN.
    #[validate(custom(function = "validate_pin"))]
    pub game_id: String,
    /// New title.
    #[validate(length(min = 1, max = 20))]
    pub title: String,
    /// New scoring rules.
    pub game_mode: GameMode,
    /// New capacity, not below the current member count.
    #[validate(range(min = 1, max = 200))]
    pub max_player_count: u32,
    /// Listed publicly.
    #[serde(deserialize_with = "flexible_bool")]
    pub is_public: bool,
}

/// Host selection of the quiz set.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoomQuizsetRequest {
    /// Room PIN.
    #[validate(custom(function = "validate_pin"))]
    pub game_id: String,
    /// `-1` selects the built-in quiz set.
    pub quiz_set_id: i64,
    /// Quizzes to draw, at most the size of the set.
    #[validate(range(min = 1))]
    pub quiz_count: u32,
}

/// Host removal of a member.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct KickRoomRequest {
    /// Room PIN.
    #[validate(custom(function = "validate_pin"))]
    pub game_id: String,
    /// Member to remove.
    #[validate(length(min = 1))]
    pub kick_player_id: String,
}

/// Host request to start the round.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartGameRequest {
    /// Room PIN.
    #[validate(custom(function = "validate_pin"))]
    pub game_id: String,
}

/// Change of display name.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetPlayerNameRequest {
    /// New name, 1 to 20 characters.
    #[validate(length(min = 1, max = 20))]
    pub player_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_room_header_is_parsed() {
        let request =
            CreateRoomRequest::from_header("title=Quiz1;gameMode=RANKING;maxPlayerCount=4;isPublic=1")
                .unwrap();
        assert_eq!(request.title, "Quiz1");
        assert_eq!(request.game_mode, GameMode::Ranking);
        assert_eq!(request.max_player_count, 4);
        assert!(request.is_public);
    }

    #[test]
    fn create_room_header_rejects_bad_values() {
        assert!(CreateRoomRequest::from_header("title=Quiz1;gameMode=ranking;maxPlayerCount=x;isPublic=1").is_err());
        assert!(CreateRoomRequest::from_header("title=;gameMode=ranking;maxPlayerCount=4;isPublic=1").is_err());
        assert!(CreateRoomRequest::from_header("title=Quiz1;gameMode=ranking;maxPlayerCount=500;isPublic=1").is_err());
        assert!(CreateRoomRequest::from_header("title=Quiz1;gameMode=ranking;maxPlayerCount=4;isPublic=maybe").is_err());
    }

    #[test]
    fn public_flag_accepts_legacy_field_name() {
        let request: CreateRoomRequest = serde_json::from_str(
            r#"{"title":"Quiz1","gameMode":"survival","maxPlayerCount":10,"isPublicGame":"false"}"#,
        )
        .unwrap();
        assert!(!request.is_public);
        assert_eq!(request.game_mode, GameMode::Survival);
    }

    #[test]
    fn position_outside_unit_square_fails_validation() {
        let request: UpdatePositionRequest =
            serde_json::from_str(r#"{"gameId":"123456","newPosition":[0.2,1.2]}"#).unwrap();
        assert!(request.validate().is_err());
    }
}
