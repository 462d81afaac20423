mod common;

use std::time::Duration;

use quiz_rooms_back::{
    dto::{
        room::{ChatMessageRequest, StartGameRequest, UpdatePositionRequest},
        ws::{EVENT_CHAT_MESSAGE, EVENT_JOIN_ROOM, EVENT_UPDATE_POSITION, ServerMessage},
    },
    error::ValidationError,
    services::{chat_service, presence_service, round_service},
    state::{SharedState, room::GameMode},
};

use common::{FakeSocket, create_room, spawn_app};

/// Window long enough for several flush ticks and the notifier round trip.
const SETTLE: Duration = Duration::from_millis(300);

fn mentions(frames: &[ServerMessage], event: &str, player_id: &str) -> bool {
    frames
        .iter()
        .filter(|frame| frame.event == event)
        .filter_map(|frame| frame.data.as_array())
        .flatten()
        .any(|entry| entry["playerId"] == player_id)
}

async fn move_to(state: &SharedState, room_id: &str, player_id: &str, x: f64, y: f64) {
    let request = UpdatePositionRequest {
        game_id: room_id.to_string(),
        new_position: [x, y],
    };
    presence_service::update_position(state, &request, player_id)
        .await
        .unwrap();
}

async fn say(state: &SharedState, room_id: &str, player_id: &str, message: &str) {
    let request = ChatMessageRequest {
        game_id: room_id.to_string(),
        message: message.to_string(),
    };
    chat_service::chat_message(state, &request, player_id).await.unwrap();
}

/// Survival room with `host` alive and `dead` eliminated, every socket drained.
async fn survival_room(
    state: &SharedState,
    host: &str,
    dead: &[&str],
) -> (String, FakeSocket, Vec<FakeSocket>) {
    let room_id = create_room(state, host, GameMode::Survival, 8).await;
    let mut host_socket = FakeSocket::connect(state, host);
    host_socket.join(state, &room_id).await;

    let mut dead_sockets = Vec::new();
    for player_id in dead {
        let socket = FakeSocket::connect(state, player_id);
        socket.join(state, &room_id).await;
        dead_sockets.push(socket);
    }
    for _ in 0..=dead.len() {
        host_socket.next_event(EVENT_JOIN_ROOM).await;
    }

    round_service::start_game(state, &StartGameRequest { game_id: room_id.clone() }, host)
        .await
        .unwrap();
    host_socket.next_event("startGame").await;
    let ids: Vec<String> = dead.iter().map(|id| id.to_string()).collect();
    assert_eq!(
        round_service::eliminate_players(state, &room_id, &ids).await.unwrap(),
        dead.len()
    );

    host_socket.frames_within(SETTLE).await;
    for socket in &mut dead_sockets {
        socket.drain();
    }
    (room_id, host_socket, dead_sockets)
}

#[tokio::test]
async fn alive_positions_are_batched_to_the_whole_room() {
    let (state, _) = spawn_app();
    let room_id = create_room(&state, "alice", GameMode::Ranking, 4).await;
    let mut alice = FakeSocket::connect(&state, "alice");
    alice.join(&state, &room_id).await;
    let mut bob = FakeSocket::connect(&state, "bob");
    bob.join(&state, &room_id).await;
    bob.next_event(EVENT_JOIN_ROOM).await;

    move_to(&state, &room_id, "alice", 0.1, 0.2).await;
    let batch = bob.next_event(EVENT_UPDATE_POSITION).await;
    assert_eq!(batch[0]["playerId"], "alice");
    assert_eq!(batch[0]["playerPosition"], serde_json::json!([0.1, 0.2]));

    move_to(&state, &room_id, "alice", 0.3, 0.4).await;
    let batch = bob.next_event(EVENT_UPDATE_POSITION).await;
    assert_eq!(batch[0]["playerPosition"], serde_json::json!([0.3, 0.4]));

    let own = alice.next_event(EVENT_UPDATE_POSITION).await;
    assert_eq!(own[0]["playerId"], "alice");
}

#[tokio::test]
async fn position_outside_the_room_is_rejected() {
    let (state, _) = spawn_app();
    let room_id = create_room(&state, "alice", GameMode::Ranking, 4).await;
    let other = create_room(&state, "bob", GameMode::Ranking, 4).await;
    FakeSocket::connect(&state, "alice").join(&state, &room_id).await;

    let request = UpdatePositionRequest {
        game_id: other,
        new_position: [0.5, 0.5],
    };
    let err = presence_service::update_position(&state, &request, "alice")
        .await
        .unwrap_err();
    assert_eq!(err.validation(), Some(&ValidationError::PlayerNotInRoom));
}

#[tokio::test]
async fn dead_positions_only_reach_other_dead_players() {
    let (state, _) = spawn_app();
    let (room_id, mut host, mut dead) = survival_room(&state, "host", &["ann", "ben"]).await;
    assert!(!presence_service::is_alive(&state, "ann").await.unwrap());
    assert!(presence_service::is_alive(&state, "host").await.unwrap());

    move_to(&state, &room_id, "ann", 0.9, 0.9).await;

    let ben_frames = dead[1].frames_within(SETTLE).await;
    assert!(mentions(&ben_frames, EVENT_UPDATE_POSITION, "ann"));
    let ann_frames = dead[0].frames_within(Duration::ZERO).await;
    assert!(!mentions(&ann_frames, EVENT_UPDATE_POSITION, "ann"));
    let host_frames = host.frames_within(Duration::ZERO).await;
    assert!(!mentions(&host_frames, EVENT_UPDATE_POSITION, "ann"));

    // Living players stay visible to everyone, spectators included.
    move_to(&state, &room_id, "host", 0.2, 0.2).await;
    let ann_frames = dead[0].frames_within(SETTLE).await;
    assert!(mentions(&ann_frames, EVENT_UPDATE_POSITION, "host"));
    let ben_frames = dead[1].frames_within(Duration::ZERO).await;
    assert!(mentions(&ben_frames, EVENT_UPDATE_POSITION, "host"));
}

#[tokio::test]
async fn dead_chat_stays_among_dead_players() {
    let (state, _) = spawn_app();
    let (room_id, mut host, mut dead) = survival_room(&state, "host", &["ann", "ben"]).await;

    say(&state, &room_id, "ann", "boo").await;

    let ann_frames = dead[0].frames_within(SETTLE).await;
    assert!(mentions(&ann_frames, EVENT_CHAT_MESSAGE, "ann"));
    let ben_frames = dead[1].frames_within(Duration::ZERO).await;
    assert!(mentions(&ben_frames, EVENT_CHAT_MESSAGE, "ann"));
    let host_frames = host.frames_within(Duration::ZERO).await;
    assert!(!mentions(&host_frames, EVENT_CHAT_MESSAGE, "ann"));

    say(&state, &room_id, "host", "hello").await;
    let chat = dead[1].next_event(EVENT_CHAT_MESSAGE).await;
    assert_eq!(chat[0]["playerId"], "host");
    assert_eq!(chat[0]["message"], "hello");
    assert_eq!(host.next_event(EVENT_CHAT_MESSAGE).await[0]["playerId"], "host");
}

#[tokio::test]
async fn eliminations_only_apply_to_survival_members() {
    let (state, _) = spawn_app();
    let ranking = create_room(&state, "alice", GameMode::Ranking, 4).await;
    FakeSocket::connect(&state, "alice").join(&state, &ranking).await;
    let ids = vec!["alice".to_string()];
    assert_eq!(round_service::eliminate_players(&state, &ranking, &ids).await.unwrap(), 0);
    assert!(presence_service::is_alive(&state, "alice").await.unwrap());

    let survival = create_room(&state, "carl", GameMode::Survival, 4).await;
    FakeSocket::connect(&state, "carl").join(&state, &survival).await;
    let outsiders = vec!["alice".to_string(), "nobody".to_string()];
    assert_eq!(
        round_service::eliminate_players(&state, &survival, &outsiders).await.unwrap(),
        0
    );
}
