//! Swagger UI and the OpenAPI document.

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

const OPENAPI_PATH: &str = "/api-doc/openapi.json";

/// Serve the Swagger UI for the room and health endpoints.
pub fn router(state: SharedState) -> Router<SharedState> {
    let ui: Router<SharedState> = SwaggerUi::new("/docs")
        .url(OPENAPI_PATH, ApiDoc::openapi())
        .into();

    ui.with_state(state)
}
