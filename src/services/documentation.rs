//! OpenAPI document aggregation.

use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the quiz room backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::room::room_summary,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::events::RoomSummary,
            crate::dto::room::CreateRoomRequest,
            crate::dto::room::JoinRoomRequest,
            crate::dto::room::UpdatePositionRequest,
            crate::dto::room::ChatMessageRequest,
            crate::dto::room::UpdateRoomOptionRequest,
            crate::dto::room::UpdateRoomQuizsetRequest,
            crate::dto::room::KickRoomRequest,
            crate::dto::room::StartGameRequest,
            crate::dto::room::SetPlayerNameRequest,
            crate::dto::events::PlayerSnapshot,
            crate::dto::events::PositionUpdate,
            crate::dto::events::ChatEntry,
            crate::dto::events::ErrorEvent,
            crate::dto::events::ChoiceSnapshot,
            crate::dto::events::StartQuizTimeEvent,
            crate::dto::events::QuizResultEntry,
            crate::dto::events::EndQuizTimeEvent,
            crate::dto::events::LeaderboardEntry,
            crate::dto::events::EndGameEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Read-only room lookups"),
        (name = "players", description = "WebSocket session for room members"),
    )
)]
pub struct ApiDoc;
