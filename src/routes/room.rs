//! Read-only room lookups.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{dto::events::RoomSummary, error::AppError, services::room_service, state::SharedState};

/// Read-only room lookups used before opening a socket.
pub fn router() -> Router<SharedState> {
    Router::new().route("/rooms/{pin}", get(room_summary))
}

#[utoipa::path(
    get,
    path = "/rooms/{pin}",
    tag = "rooms",
    params(("pin" = String, Path, description = "Six digit room PIN")),
    responses(
        (status = 200, description = "Room summary", body = RoomSummary),
        (status = 400, description = "Malformed PIN"),
        (status = 404, description = "No room with this PIN")
    )
)]
/// Return the public summary of a room.
pub async fn room_summary(
    State(state): State<SharedState>,
    Path(pin): Path<String>,
) -> Result<Json<RoomSummary>, AppError> {
    let summary = room_service::room_summary(&state, &pin).await?;
    Ok(Json(summary))
}
