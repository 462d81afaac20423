//! Key and channel naming shared by every component touching the keyed store.

/// Set of PINs of rooms that have not been torn down yet.
pub const ACTIVE_ROOMS: &str = "ActiveRooms";
/// Pub/sub channel carrying the PIN of a room to tear down.
pub const ROOM_CLEANUP_CHANNEL: &str = "room:cleanup";
/// Pattern matching every per-room chat channel.
pub const CHAT_CHANNEL_PATTERN: &str = "chat:*";

const CHANGES_SUFFIX: &str = "Changes";
const TIMER_SUFFIX: &str = "Timer";

/// Room hash.
pub fn room(room_id: &str) -> String {
    format!("Room:{room_id}")
}

/// Member set of a room.
pub fn room_players(room_id: &str) -> String {
    format!("Room:{room_id}:Players")
}

/// Score board of a room.
pub fn room_leaderboard(room_id: &str) -> String {
    format!("Room:{room_id}:Leaderboard")
}

/// Ids of the quizzes selected for the current round.
pub fn room_quiz_set(room_id: &str) -> String {
    format!("Room:{room_id}:QuizSet")
}

/// Snapshot of one selected quiz.
pub fn room_quiz(room_id: &str, quiz_id: &str) -> String {
    format!("Room:{room_id}:Quiz:{quiz_id}")
}

/// Choices of one selected quiz, keyed by order.
pub fn room_quiz_choices(room_id: &str, quiz_id: &str) -> String {
    format!("Room:{room_id}:Quiz:{quiz_id}:Choices")
}

/// Round pointer, `<index>:<start|end>`.
pub fn room_current_quiz(room_id: &str) -> String {
    format!("Room:{room_id}:CurrentQuiz")
}

/// Round timer of a room; its expiry moves the round to the next phase.
pub fn room_timer(room_id: &str) -> String {
    format!("Room:{room_id}:{TIMER_SUFFIX}")
}

/// Extract the room id from a `Room:<id>:Timer` key.
pub fn timer_room_id(key: &str) -> Option<&str> {
    key.strip_prefix("Room:")?
        .strip_suffix(TIMER_SUFFIX)?
        .strip_suffix(':')
        .filter(|id| !id.is_empty() && !id.contains(':'))
}

/// Player hash.
pub fn player(player_id: &str) -> String {
    format!("Player:{player_id}")
}

/// Pattern matching every derived key of a player (`Player:<id>:*`).
pub fn player_derived_pattern(player_id: &str) -> String {
    format!("Player:{player_id}:*")
}

/// Chat channel of a room.
pub fn chat_channel(room_id: &str) -> String {
    format!("chat:{room_id}")
}

/// Marker key recording the kind of the latest mutation of `entity_key`.
pub fn changes(entity_key: &str) -> String {
    format!("{entity_key}:{CHANGES_SUFFIX}")
}

/// Extract the room id from a `chat:<id>` channel.
pub fn chat_room_id(channel: &str) -> Option<&str> {
    channel
        .strip_prefix("chat:")
        .filter(|id| !id.is_empty() && !id.contains(':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_key_appends_suffix() {
        assert_eq!(changes(&player("abc")), "Player:abc:Changes");
        assert_eq!(changes(&room("123456")), "Room:123456:Changes");
    }

    #[test]
    fn timer_key_round_trips_to_its_room() {
        assert_eq!(timer_room_id(&room_timer("123456")), Some("123456"));
        assert_eq!(timer_room_id("Room:123456:Players"), None);
        assert_eq!(timer_room_id("Room::Timer"), None);
        assert_eq!(timer_room_id("Room:1:Quiz:2:Timer"), None);
    }

    #[test]
    fn chat_room_id_rejects_nested_channels() {
        assert_eq!(chat_room_id("chat:123456"), Some("123456"));
        assert_eq!(chat_room_id("chat:"), None);
        assert_eq!(chat_room_id("chat:1:2"), None);
        assert_eq!(chat_room_id("room:cleanup"), None);
    }
}
