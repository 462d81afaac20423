//! Room and player invariants, checked against freshly fetched snapshots.

use crate::{
    error::{ServiceError, ValidationError},
    state::{player::Player, room::Room},
};

/// The room must exist.
pub fn room_exists(event: &'static str, room: Option<Room>) -> Result<Room, ServiceError> {
    room.ok_or_else(|| ServiceError::rejected(event, ValidationError::RoomNotFound))
}

/// Only the host may act.
pub fn player_is_host(event: &'static str, room: &Room, player_id: &str) -> Result<(), ServiceError> {
    if room.host == player_id {
        Ok(())
    } else {
        Err(ServiceError::rejected(event, ValidationError::NotHost))
    }
}

/// Fails when the room already holds `max` members.
pub fn room_capacity(event: &'static str, current: usize, max: u32) -> Result<(), ServiceError> {
    if current < max as usize {
        Ok(())
    } else {
        Err(ServiceError::rejected(
            event,
            ValidationError::RoomFull { current, max },
        ))
    }
}

/// The room must still accept players.
pub fn room_waiting(event: &'static str, room: &Room) -> Result<(), ServiceError> {
    if room.is_joinable() {
        Ok(())
    } else {
        Err(ServiceError::rejected(event, ValidationError::RoomInProgress))
    }
}

/// The player record must exist.
pub fn player_exists(
    event: &'static str,
    player_id: &str,
    player: Option<Player>,
) -> Result<Player, ServiceError> {
    player.ok_or_else(|| {
        ServiceError::rejected(event, ValidationError::PlayerNotFound(player_id.to_string()))
    })
}

/// The player record must exist, be connected and point at `room_id`.
pub fn player_in_room(
    event: &'static str,
    room_id: &str,
    player: Option<Player>,
) -> Result<Player, ServiceError> {
    match player {
        Some(player) if player.belongs_to(room_id) && !player.disconnected => Ok(player),
        _ => Err(ServiceError::rejected(event, ValidationError::PlayerNotInRoom)),
    }
}

/// Between one and `available` quizzes.
pub fn quiz_count(event: &'static str, requested: u32, available: usize) -> Result<(), ServiceError> {
    if requested >= 1 && requested as usize <= available {
        Ok(())
    } else {
        Err(ServiceError::rejected(
            event,
            ValidationError::InvalidQuizCount {
                requested,
                available,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::keyed_store::Fields,
        state::room::{GameMode, RoomStatus},
    };

    fn room(status: RoomStatus) -> Room {
        Room {
            id: "123456".into(),
            host: "host".into(),
            status,
            is_waiting: status == RoomStatus::Waiting,
            title: "Quiz1".into(),
            game_mode: GameMode::Ranking,
            max_player_count: 2,
            is_public: true,
            last_activity_at: 0,
            quiz_set_id: -1,
            quiz_count: 2,
            quiz_set_title: String::new(),
        }
    }

    #[test]
    fn capacity_is_exclusive_of_max() {
        assert!(room_capacity("joinRoom", 1, 2).is_ok());
        let err = room_capacity("joinRoom", 2, 2).unwrap_err();
        assert_eq!(
            err.validation(),
            Some(&ValidationError::RoomFull { current: 2, max: 2 })
        );
    }

    #[test]
    fn host_and_status_checks() {
        let waiting = room(RoomStatus::Waiting);
        assert!(player_is_host("kickRoom", &waiting, "host").is_ok());
        assert!(player_is_host("kickRoom", &waiting, "guest").is_err());
        assert!(room_waiting("joinRoom", &waiting).is_ok());
        assert_eq!(
            room_waiting("joinRoom", &room(RoomStatus::Playing))
                .unwrap_err()
                .validation(),
            Some(&ValidationError::RoomInProgress)
        );
    }

    #[test]
    fn disconnected_player_is_not_in_room() {
        let hash = Fields::from([
            ("gameId".to_string(), "123456".to_string()),
            ("disconnected".to_string(), "1".to_string()),
        ]);
        let player = Player::from_fields("p1", &hash);
        assert!(player_in_room("chatMessage", "123456", player).is_err());
        assert!(player_in_room("chatMessage", "123456", None).is_err());
    }

    #[test]
    fn quiz_count_must_fit_the_set() {
        assert!(quiz_count("startGame", 2, 5).is_ok());
        assert!(quiz_count("startGame", 6, 5).is_err());
        assert!(quiz_count("startGame", 0, 5).is_err());
    }
}
