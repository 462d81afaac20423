//! `/healthcheck` payload.

use serde::Serialize;
use utoipa::ToSchema;

/// Overall status: `ok` while the keyed store answers, `degraded` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every dependency answered.
    Ok,
    /// The keyed store did not answer; realtime traffic is stalled.
    Degraded,
}

/// Health report returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Whether the keyed store answered the health check.
    pub store_reachable: bool,
    /// Sockets currently registered on this instance.
    pub connected_sockets: usize,
}

impl HealthResponse {
    /// Report built from the store check and the live socket count.
    pub fn new(store_reachable: bool, connected_sockets: usize) -> Self {
        Self {
            status: if store_reachable {
                HealthStatus::Ok
            } else {
                HealthStatus::Degraded
            },
            store_reachable,
            connected_sockets,
        }
    }
}
