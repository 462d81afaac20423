//! Application services: room lifecycle, presence, chat, rounds and the background listeners.

/// Per-room batching of high-rate payloads flushed on a fixed tick.
pub mod batch_fanout;
/// Keyspace notification decoding and change dispatch.
pub mod change_notifier;
/// Chat publication and delivery.
pub mod chat_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Inactivity sweep and room teardown.
pub mod janitor;
/// Player position, naming and presence fan-out.
pub mod presence_service;
/// Room lifecycle: creation, membership, options and activity.
pub mod room_service;
/// Quiz round control and scoring.
pub mod round_service;
/// Precondition checks shared by the room and player services.
pub mod validator;
/// WebSocket connection and message handling service.
pub mod websocket_service;
