//! Player entity and its position on the board.

use rand::Rng;

use crate::{dao::keyed_store::Fields, state::room::flag};

/// Hash field names of a `Player:<id>` entry.
pub mod fields {
    /// Display name.
    pub const PLAYER_NAME: &str = "playerName";
    /// Horizontal coordinate.
    pub const POSITION_X: &str = "positionX";
    /// Vertical coordinate.
    pub const POSITION_Y: &str = "positionY";
    /// `"1"` while the socket is gone.
    pub const DISCONNECTED: &str = "disconnected";
    /// Unix milliseconds of the disconnect.
    pub const DISCONNECTED_AT: &str = "disconnectedAt";
    /// PIN of the current room.
    pub const GAME_ID: &str = "gameId";
    /// `"0"` once eliminated.
    pub const IS_ALIVE: &str = "isAlive";
    /// Socket currently bound to the player.
    pub const SOCKET_ID: &str = "socketId";
}

/// Point inside the unit square.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// Horizontal, 0 is the left edge.
    pub x: f64,
    /// Vertical, 0 is the top edge.
    pub y: f64,
}

impl Position {
    /// Build a position, rejecting coordinates outside `[0, 1]`.
    pub fn new(x: f64, y: f64) -> Option<Self> {
        let inside = |value: f64| (0.0..=1.0).contains(&value);
        (inside(x) && inside(y)).then_some(Self { x, y })
    }

    /// Uniformly random spawn point.
    pub fn random() -> Self {
        let mut rng = rand::rng();
        Self {
            x: rng.random_range(0.0..=1.0),
            y: rng.random_range(0.0..=1.0),
        }
    }

    /// `[x, y]` as sent on the wire.
    pub fn as_pair(&self) -> [f64; 2] {
        [self.x, self.y]
    }

    /// 1-based choice picked by standing in one of `choice_count` equal
    /// vertical columns of the board.
    pub fn choice(&self, choice_count: u32) -> Option<u32> {
        if choice_count == 0 {
            return None;
        }
        let column = (self.x * f64::from(choice_count)).floor() as u32;
        Some(column.min(choice_count - 1) + 1)
    }
}

/// Player snapshot decoded from its hash.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    /// Client supplied id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Board position.
    pub position: Position,
    /// Socket dropped, record kept for the grace period.
    pub disconnected: bool,
    /// Unix milliseconds of the disconnect.
    pub disconnected_at: Option<i64>,
    /// Room the player belongs to.
    pub game_id: Option<String>,
    /// Still in play; always true outside survival rounds.
    pub is_alive: bool,
    /// Socket currently bound to the player.
    pub socket_id: Option<String>,
}

impl Player {
    /// Decode a player hash; an empty hash means the record expired or never existed.
    pub fn from_fields(id: &str, hash: &Fields) -> Option<Self> {
        if hash.is_empty() {
            return None;
        }
        let coordinate = |name: &str| {
            hash.get(name)
                .and_then(|value| value.parse::<f64>().ok())
                .map(|value| value.clamp(0.0, 1.0))
                .unwrap_or(0.0)
        };
        let non_empty = |name: &str| hash.get(name).filter(|value| !value.is_empty()).cloned();

        Some(Self {
            id: id.to_string(),
            name: hash.get(fields::PLAYER_NAME).cloned().unwrap_or_default(),
            position: Position {
                x: coordinate(fields::POSITION_X),
                y: coordinate(fields::POSITION_Y),
            },
            disconnected: hash.get(fields::DISCONNECTED).map(String::as_str) == Some("1"),
            disconnected_at: hash
                .get(fields::DISCONNECTED_AT)
                .and_then(|value| value.parse().ok()),
            game_id: non_empty(fields::GAME_ID),
            is_alive: hash.get(fields::IS_ALIVE).map(String::as_str) != Some("0"),
            socket_id: non_empty(fields::SOCKET_ID),
        })
    }

    /// Whether this record still binds the player to `room_id`.
    pub fn belongs_to(&self, room_id: &str) -> bool {
        self.game_id.as_deref() == Some(room_id)
    }
}

pub(crate) fn position_fields(position: Position) -> Vec<(String, String)> {
    vec![
        (fields::POSITION_X.into(), position.x.to_string()),
        (fields::POSITION_Y.into(), position.y.to_string()),
    ]
}

pub(crate) fn alive_field(alive: bool) -> (String, String) {
    (fields::IS_ALIVE.into(), flag(alive))
}
