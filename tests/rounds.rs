mod common;

use std::time::Duration;

use quiz_rooms_back::{
    config::AppConfig,
    dao::keys,
    dto::{
        room::{StartGameRequest, UpdatePositionRequest, UpdateRoomQuizsetRequest},
        ws::{EVENT_END_GAME, EVENT_END_QUIZ_TIME, EVENT_START_QUIZ_TIME},
    },
    services::{presence_service, room_service, round_service},
    state::{
        SharedState,
        room::{GameMode, RoomStatus},
    },
};
use serde_json::Value;
use tokio::time::sleep;

use common::{FakeSocket, create_room, quiz_set, spawn_app_with, test_config};

/// 3 s countdown, then each two-choice quiz stays open 10 s followed by a 2 s pause.
fn timed_config() -> AppConfig {
    AppConfig {
        round_countdown: Duration::from_secs(3),
        quiz_intermission: Duration::from_secs(2),
        ..test_config()
    }
}

async fn use_quiz_set(state: &SharedState, pin: &str, quiz_set_id: i64, quiz_count: u32) {
    let request = UpdateRoomQuizsetRequest {
        game_id: pin.to_string(),
        quiz_set_id,
        quiz_count,
    };
    room_service::update_room_quizset(state, &request, "alice")
        .await
        .unwrap();
}

/// Stand in the left (first choice, correct) or right column of a two-choice board.
async fn stand(state: &SharedState, pin: &str, player_id: &str, correct: bool) {
    let x = if correct { 0.2 } else { 0.8 };
    let request = UpdatePositionRequest {
        game_id: pin.to_string(),
        new_position: [x, 0.5],
    };
    presence_service::update_position(state, &request, player_id)
        .await
        .unwrap();
}

async fn pointer(state: &SharedState, pin: &str) -> Option<String> {
    state.store().get(&keys::room_current_quiz(pin)).await.unwrap()
}

fn result_of<'a>(event: &'a Value, player_id: &str) -> &'a Value {
    event["players"]
        .as_array()
        .and_then(|players| players.iter().find(|entry| entry["playerId"] == player_id))
        .unwrap_or_else(|| panic!("no result for {player_id}"))
}

#[tokio::test(start_paused = true)]
async fn round_timer_walks_every_quiz_and_reopens_the_room() {
    let (state, quizzes) = spawn_app_with(timed_config());
    quizzes.insert(7, quiz_set("Timed", 2));
    let pin = create_room(&state, "alice", GameMode::Ranking, 4).await;
    let mut alice = FakeSocket::connect(&state, "alice");
    alice.join(&state, &pin).await;
    FakeSocket::connect(&state, "bob").join(&state, &pin).await;
    use_quiz_set(&state, &pin, 7, 2).await;
    stand(&state, &pin, "alice", true).await;
    stand(&state, &pin, "bob", false).await;

    round_service::start_game(&state, &StartGameRequest { game_id: pin.clone() }, "alice")
        .await
        .unwrap();

    sleep(Duration::from_secs(2)).await;
    assert_eq!(pointer(&state, &pin).await.as_deref(), Some("-1:end"));

    sleep(Duration::from_secs(2)).await;
    assert_eq!(pointer(&state, &pin).await.as_deref(), Some("0:start"));
    let opened = alice.next_event(EVENT_START_QUIZ_TIME).await;
    assert_eq!(opened["choiceList"].as_array().map(Vec::len), Some(2));
    assert_eq!(opened["choiceList"][0]["order"], 1);
    let window = opened["endTime"].as_i64().unwrap() - opened["startTime"].as_i64().unwrap();
    assert_eq!(window, 10_000);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(pointer(&state, &pin).await.as_deref(), Some("0:end"));
    let closed = alice.next_event(EVENT_END_QUIZ_TIME).await;
    assert_eq!(closed["answer"], 1);
    assert_eq!(result_of(&closed, "alice")["isAnswer"], true);
    assert_eq!(result_of(&closed, "alice")["score"], 1000.0);
    assert_eq!(result_of(&closed, "bob")["isAnswer"], false);

    // 1:start at 15 s, 1:end at 25 s, round over at 27 s.
    sleep(Duration::from_secs(15)).await;
    assert_eq!(pointer(&state, &pin).await, None);
    assert!(!state.store().exists(&keys::room_timer(&pin)).await.unwrap());
    let summary = room_service::room_summary(&state, &pin).await.unwrap();
    assert_eq!(summary.status, RoomStatus::Waiting);

    let ended = alice.next_event(EVENT_END_GAME).await;
    assert_eq!(ended["hostId"], "alice");
    assert_eq!(ended["leaderboard"][0]["playerId"], "alice");
    assert_eq!(ended["leaderboard"][0]["score"], 2000.0);
    assert_eq!(ended["leaderboard"][1]["score"], 0.0);

    let newcomer = room_service::join_room(&state, &pin, "carol", None, None).await;
    assert!(newcomer.is_ok(), "room reopened after the round: {newcomer:?}");
}

#[tokio::test(start_paused = true)]
async fn survival_round_eliminates_wrong_answers() {
    let (state, quizzes) = spawn_app_with(timed_config());
    quizzes.insert(7, quiz_set("Timed", 1));
    let pin = create_room(&state, "alice", GameMode::Survival, 4).await;
    let mut alice = FakeSocket::connect(&state, "alice");
    alice.join(&state, &pin).await;
    FakeSocket::connect(&state, "bob").join(&state, &pin).await;
    use_quiz_set(&state, &pin, 7, 1).await;
    stand(&state, &pin, "alice", true).await;
    stand(&state, &pin, "bob", false).await;

    round_service::start_game(&state, &StartGameRequest { game_id: pin.clone() }, "alice")
        .await
        .unwrap();
    sleep(Duration::from_secs(14)).await;

    let closed = alice.next_event(EVENT_END_QUIZ_TIME).await;
    assert_eq!(result_of(&closed, "alice")["isAlive"], true);
    assert_eq!(result_of(&closed, "bob")["isAlive"], false);
    assert!(presence_service::is_alive(&state, "alice").await.unwrap());
    assert!(!presence_service::is_alive(&state, "bob").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn teardown_stops_the_round_timer() {
    let (state, _) = spawn_app_with(timed_config());
    let pin = create_room(&state, "alice", GameMode::Ranking, 4).await;
    FakeSocket::connect(&state, "alice").join(&state, &pin).await;
    round_service::start_game(&state, &StartGameRequest { game_id: pin.clone() }, "alice")
        .await
        .unwrap();
    assert!(state.store().exists(&keys::room_timer(&pin)).await.unwrap());

    room_service::handle_player_exit(&state, "alice").await.unwrap();
    sleep(Duration::from_secs(1)).await;
    assert!(!state.store().exists(&keys::room_timer(&pin)).await.unwrap());
    assert_eq!(pointer(&state, &pin).await, None);
}
