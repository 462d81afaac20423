//! Shared application state and the domain types decoded from the keyed store.

pub mod changes;
pub mod connections;
pub mod player;
pub mod room;

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{
    config::AppConfig,
    dao::{keyed_store::KeyedStore, quiz_source::QuizSetSource},
    dto::{
        events::{ChatEntry, PositionUpdate},
        ws::{EVENT_CHAT_MESSAGE, EVENT_UPDATE_POSITION},
    },
    services::batch_fanout::BatchFanout,
};

pub use self::connections::{Connections, SocketHandle};

/// State shared by handlers and background tasks.
pub type SharedState = Arc<AppState>;

/// Central application state: the keyed store, live sockets and the outgoing batch queues.
pub struct AppState {
    store: Arc<dyn KeyedStore>,
    quiz_source: Arc<dyn QuizSetSource>,
    config: Arc<AppConfig>,
    connections: Arc<Connections>,
    position_batches: Arc<BatchFanout<PositionUpdate>>,
    chat_batches: Arc<BatchFanout<ChatEntry>>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// Batch flush loops are not started here; see [`AppState::spawn_fanouts`].
    pub fn new(
        store: Arc<dyn KeyedStore>,
        quiz_source: Arc<dyn QuizSetSource>,
        config: AppConfig,
    ) -> SharedState {
        let connections = Arc::new(Connections::default());

        let position_sink = connections.clone();
        let position_batches = BatchFanout::new(
            "position",
            config.position_flush,
            Arc::new(move |room_id: &str, batch: Vec<PositionUpdate>| {
                position_sink.emit_to_room(room_id, EVENT_UPDATE_POSITION, &batch);
            }),
        );

        let chat_sink = connections.clone();
        let chat_batches = BatchFanout::new(
            "chat",
            config.chat_flush,
            Arc::new(move |room_id: &str, batch: Vec<ChatEntry>| {
                chat_sink.emit_to_room(room_id, EVENT_CHAT_MESSAGE, &batch);
            }),
        );

        Arc::new(Self {
            store,
            quiz_source,
            config: Arc::new(config),
            connections,
            position_batches: Arc::new(position_batches),
            chat_batches: Arc::new(chat_batches),
        })
    }

    /// Keyed store holding rooms and players.
    pub fn store(&self) -> &Arc<dyn KeyedStore> {
        &self.store
    }

    /// Where quiz sets are read from.
    pub fn quiz_source(&self) -> &Arc<dyn QuizSetSource> {
        &self.quiz_source
    }

    /// Current configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Registry of connected sockets and room groups.
    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    /// Position updates of alive players, batched per room.
    pub fn position_batches(&self) -> &Arc<BatchFanout<PositionUpdate>> {
        &self.position_batches
    }

    /// Chat lines of alive players, batched per room.
    pub fn chat_batches(&self) -> &Arc<BatchFanout<ChatEntry>> {
        &self.chat_batches
    }

    /// Start the position and chat flush loops.
    pub fn spawn_fanouts(&self) {
        self.position_batches.spawn();
        self.chat_batches.spawn();
    }
}

/// Wall clock in Unix milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
