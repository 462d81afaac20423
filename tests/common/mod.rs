#![allow(dead_code)]

use std::{future::Future, sync::Arc, time::Duration};

use quiz_rooms_back::{
    config::AppConfig,
    dao::{
        keyed_store::memory::MemoryStore,
        models::{ChoiceEntity, QuizEntity, QuizSetEntity},
        quiz_source::StaticQuizSource,
    },
    dto::{room::CreateRoomRequest, ws::ServerMessage},
    services::{
        change_notifier, chat_service, janitor,
        room_service::{self, JoinOutcome},
        round_service,
    },
    state::{AppState, SharedState, room::GameMode},
};
use serde_json::Value;
use tokio::{
    sync::mpsc,
    time::{sleep, timeout},
};

/// Upper bound for anything produced by the background tasks.
pub const WAIT: Duration = Duration::from_secs(2);

/// Fast flushes; the round countdown outlasts any test that walks phases by hand.
pub fn test_config() -> AppConfig {
    AppConfig {
        position_flush: Duration::from_millis(20),
        chat_flush: Duration::from_millis(20),
        round_countdown: Duration::from_secs(600),
        ..AppConfig::default()
    }
}

/// Shared state over a fresh in-process store, with every listener running.
pub fn spawn_app() -> (SharedState, StaticQuizSource) {
    spawn_app_with(test_config())
}

pub fn spawn_app_with(config: AppConfig) -> (SharedState, StaticQuizSource) {
    let store = MemoryStore::new();
    store.spawn_expiry();
    let quizzes = StaticQuizSource::new();
    let state = AppState::new(Arc::new(store), Arc::new(quizzes.clone()), config);

    state.spawn_fanouts();
    change_notifier::spawn(state.clone());
    chat_service::spawn_chat_listener(state.clone());
    janitor::spawn_cleanup_listener(state.clone());
    round_service::spawn_round_timer_listener(state.clone());
    (state, quizzes)
}

pub async fn create_room(state: &SharedState, host: &str, mode: GameMode, max_player_count: u32) -> String {
    let request = CreateRoomRequest {
        title: "Quiz1".into(),
        game_mode: mode,
        max_player_count,
        is_public: true,
    };
    room_service::create_room(state, &request, host).await.unwrap()
}

/// Quiz set with `count` two-choice quizzes, the first choice being right.
pub fn quiz_set(title: &str, count: i64) -> QuizSetEntity {
    QuizSetEntity {
        title: title.into(),
        quiz_list: (1..=count)
            .map(|id| QuizEntity {
                id,
                quiz: format!("Question {id}"),
                limit_time: 10,
                choice_list: vec![
                    ChoiceEntity {
                        order: 1,
                        content: "yes".into(),
                        is_answer: true,
                    },
                    ChoiceEntity {
                        order: 2,
                        content: "no".into(),
                        is_answer: false,
                    },
                ],
            })
            .collect(),
    }
}

/// Socket stand-in: registered in the connection registry, read through its mpsc receiver.
pub struct FakeSocket {
    pub socket_id: String,
    pub player_id: String,
    rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl FakeSocket {
    pub fn connect(state: &SharedState, player_id: &str) -> Self {
        Self::connect_as(state, player_id, &format!("socket-{player_id}"))
    }

    pub fn connect_as(state: &SharedState, player_id: &str, socket_id: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        state.connections().register(socket_id, player_id, tx);
        Self {
            socket_id: socket_id.to_string(),
            player_id: player_id.to_string(),
            rx,
        }
    }

    pub async fn join(&self, state: &SharedState, room_id: &str) -> JoinOutcome {
        room_service::join_room(
            state,
            room_id,
            &self.player_id,
            Some(&self.player_id),
            Some(&self.socket_id),
        )
        .await
        .unwrap()
    }

    /// Wait for the next `event` frame, skipping frames of other events.
    pub async fn next_event(&mut self, event: &str) -> Value {
        let rx = &mut self.rx;
        let found = timeout(WAIT, async {
            while let Some(message) = rx.recv().await {
                if message.event == event {
                    return Some(message.data);
                }
            }
            None
        })
        .await;
        match found {
            Ok(Some(data)) => data,
            Ok(None) => panic!("socket {} closed while waiting for `{event}`", self.socket_id),
            Err(_) => panic!("socket {} received no `{event}` frame", self.socket_id),
        }
    }

    /// Every frame received during `window`.
    pub async fn frames_within(&mut self, window: Duration) -> Vec<ServerMessage> {
        sleep(window).await;
        let mut frames = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            frames.push(message);
        }
        frames
    }

    /// Drop whatever is queued so far.
    pub fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

/// Poll `check` until it holds, failing the test after [`WAIT`].
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let reached = timeout(WAIT, async {
        while !check().await {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "condition not reached in time");
}

/// Player ids listed in a `joinRoom` payload.
pub fn joined_ids(data: &Value) -> Vec<String> {
    data["players"]
        .as_array()
        .map(|players| {
            players
                .iter()
                .filter_map(|player| player["playerId"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
