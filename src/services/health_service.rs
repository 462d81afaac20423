//! Liveness reporting.

use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Check the keyed store and report `degraded` when it does not answer.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let store_reachable = match state.store().health_check().await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "storage health check failed");
            false
        }
    };
    HealthResponse::new(store_reachable, state.connections().socket_count())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::{future::BoxFuture, stream::BoxStream};
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            keyed_store::{BatchOp, BatchReply, KeyedStore, Notification, memory::MemoryStore},
            quiz_source::StaticQuizSource,
            storage::{StorageError, StorageResult},
        },
        dto::health::HealthStatus,
        state::AppState,
    };

    /// Store whose every call fails as if the backend were gone.
    struct DownStore;

    fn down() -> StorageError {
        StorageError::unavailable("backend gone".into(), std::io::Error::other("refused"))
    }

    impl KeyedStore for DownStore {
        fn batch(&self, _ops: Vec<BatchOp>) -> BoxFuture<'static, StorageResult<Vec<BatchReply>>> {
            Box::pin(async { Err(down()) })
        }

        fn scan(&self, _pattern: &str) -> BoxFuture<'static, StorageResult<Vec<String>>> {
            Box::pin(async { Err(down()) })
        }

        fn psubscribe(&self, _pattern: &str) -> BoxStream<'static, Notification> {
            Box::pin(futures::stream::empty())
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Err(down()) })
        }
    }

    fn state_over(store: Arc<dyn KeyedStore>) -> SharedState {
        AppState::new(store, Arc::new(StaticQuizSource::new()), AppConfig::default())
    }

    #[tokio::test]
    async fn reachable_store_reports_ok_with_socket_count() {
        let state = state_over(Arc::new(MemoryStore::new()));
        let (tx, _rx) = mpsc::unbounded_channel();
        state.connections().register("socket-1", "alice", tx);

        let report = health_status(&state).await;
        assert_eq!(report.status, HealthStatus::Ok);
        assert!(report.store_reachable);
        assert_eq!(report.connected_sockets, 1);
    }

    #[tokio::test]
    async fn unreachable_store_reports_degraded() {
        let report = health_status(&state_over(Arc::new(DownStore))).await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(!report.store_reachable);
    }
}
