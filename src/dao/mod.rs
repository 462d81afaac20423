//! Storage layer: the keyed store, key naming, quiz-set source and storage errors.

/// Keyed store abstraction and its in-process backend.
pub mod keyed_store;
/// Key and channel naming for rooms and players.
pub mod keys;
/// Quiz-set data model.
pub mod models;
/// Source of quiz sets copied into rooms at round start.
pub mod quiz_source;
/// Storage error types.
pub mod storage;
