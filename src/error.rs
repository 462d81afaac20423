//! Service and HTTP error types.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::dao::storage::StorageError;

/// Room and player invariants enforced against freshly fetched state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No room under the given PIN.
    #[error("room not found")]
    RoomNotFound,
    /// The room is at capacity.
    #[error("room is full ({current}/{max})")]
    RoomFull {
        /// Current members.
        current: usize,
        /// Capacity.
        max: u32,
    },
    /// The room is not waiting for players.
    #[error("game already in progress")]
    RoomInProgress,
    /// Caller is not the room host.
    #[error("only the host can perform this action")]
    NotHost,
    /// No player under this id.
    #[error("player `{0}` not found")]
    PlayerNotFound(String),
    /// Player belongs to another room or none.
    #[error("player is not in this room")]
    PlayerNotInRoom,
    /// More quizzes requested than the set holds.
    #[error("quiz count {requested} exceeds the {available} quizzes of the quiz set")]
    InvalidQuizCount {
        /// Requested count.
        requested: u32,
        /// Quizzes in the set.
        available: usize,
    },
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// A client action violated a room or player invariant.
    #[error("{event}: {reason}")]
    Rejected {
        /// Name of the client event that failed.
        event: &'static str,
        /// Violated invariant.
        reason: ValidationError,
    },
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl ServiceError {
    /// Rejection of `event` for `reason`.
    pub fn rejected(event: &'static str, reason: ValidationError) -> Self {
        ServiceError::Rejected { event, reason }
    }

    /// Validation failure carried by this error, if any.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            ServiceError::Rejected { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {err}"))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Rejected {
                reason: ValidationError::RoomNotFound,
                ..
            } => AppError::NotFound("room not found".into()),
            ServiceError::Rejected { reason, .. } => AppError::Conflict(reason.to_string()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
