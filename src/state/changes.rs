//! Change markers written next to every announced mutation.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Kind of the latest mutation of a Player or Room, stored in the entity's marker key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A player joined.
    Join,
    /// A player moved.
    Position,
    /// A player disconnected.
    Disconnect,
    /// A player renamed.
    Name,
    /// A player was kicked.
    Kicked,
    /// Room settings changed.
    Option,
    /// Quiz set selection changed.
    Quizset,
    /// The round started.
    Start,
    /// Room heartbeat refreshed, never fanned out.
    LastActivityAt,
}

/// Marker text that names no known kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown change kind `{0}`")]
pub struct UnknownChangeKind(pub String);

impl ChangeKind {
    /// Marker text stored in the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Join => "Join",
            ChangeKind::Position => "Position",
            ChangeKind::Disconnect => "Disconnect",
            ChangeKind::Name => "Name",
            ChangeKind::Kicked => "Kicked",
            ChangeKind::Option => "Option",
            ChangeKind::Quizset => "Quizset",
            ChangeKind::Start => "Start",
            ChangeKind::LastActivityAt => "lastActivityAt",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = UnknownChangeKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let kind = match value {
            "Join" => ChangeKind::Join,
            "Position" => ChangeKind::Position,
            "Disconnect" => ChangeKind::Disconnect,
            "Name" => ChangeKind::Name,
            "Kicked" => ChangeKind::Kicked,
            "Option" => ChangeKind::Option,
            "Quizset" => ChangeKind::Quizset,
            "Start" => ChangeKind::Start,
            "lastActivityAt" => ChangeKind::LastActivityAt,
            other => return Err(UnknownChangeKind(other.to_string())),
        };
        Ok(kind)
    }
}
