//! WebSocket upgrade for game clients.

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
};

use crate::{
    error::AppError,
    services::websocket_service::{self, ConnectionParams},
    state::SharedState,
};

const PLAYER_ID_HEADER: &str = "player-id";
const GAME_ID_HEADER: &str = "game-id";
const CREATE_ROOM_HEADER: &str = "create-room";

#[utoipa::path(
    get,
    path = "/ws",
    tag = "players",
    params(
        ("player-id" = String, Header, description = "Stable identifier of the connecting player"),
        ("game-id" = Option<String>, Header, description = "Room PIN to join on connect"),
        ("create-room" = Option<String>, Header, description = "Room options (`title=..;gameMode=..;maxPlayerCount=..;isPublic=..`) to create a room on connect")
    ),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 400, description = "Missing player identifier")
    )
)]
/// Upgrade the HTTP connection into a player WebSocket session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let params = connection_params(&headers)?;
    Ok(ws.on_upgrade(move |socket| websocket_service::handle_socket(state, socket, params)))
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn connection_params(headers: &HeaderMap) -> Result<ConnectionParams, AppError> {
    let player_id = header(headers, PLAYER_ID_HEADER)
        .ok_or_else(|| AppError::BadRequest(format!("missing `{PLAYER_ID_HEADER}` header")))?;
    Ok(ConnectionParams {
        player_id,
        game_id: header(headers, GAME_ID_HEADER),
        create_room: header(headers, CREATE_ROOM_HEADER),
    })
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn player_id_is_required() {
        let mut headers = HeaderMap::new();
        headers.insert(GAME_ID_HEADER, HeaderValue::from_static("123456"));
        assert!(matches!(connection_params(&headers), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn blank_headers_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(PLAYER_ID_HEADER, HeaderValue::from_static("p-1"));
        headers.insert(GAME_ID_HEADER, HeaderValue::from_static("  "));
        let params = connection_params(&headers).unwrap();
        assert_eq!(params.player_id, "p-1");
        assert_eq!(params.game_id, None);
        assert_eq!(params.create_room, None);
    }
}
