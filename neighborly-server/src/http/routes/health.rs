//! Liveness plus store reachability for load balancers

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use crate::http::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the store is unreachable
    pub status: &'static str,
    pub store: &'static str,
    pub version: &'static str,
}

/// GET /health - 503 while the store cannot be reached
async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status, store) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ok", "ok"),
        Err(e) => {
            tracing::warn!(error = %e, "health check: store unreachable");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unreachable")
        }
    };
    (
        code,
        Json(HealthResponse {
            status,
            store,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use sqlx::postgres::PgPoolOptions;

    use crate::config::ServerConfig;
    use crate::integrations::{DisabledGifs, MemoryMailer};
    use crate::storage::MemoryStorage;
    use crate::store::{MemoryStore, PgStore, Store};

    fn state_with(store: Arc<dyn Store>) -> Arc<AppState> {
        Arc::new(AppState::new(
            store,
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryMailer::new()),
            Arc::new(DisabledGifs),
            ServerConfig::default(),
        ))
    }

    #[tokio::test]
    async fn memory_store_is_always_healthy() {
        let (code, Json(body)) = health(State(state_with(Arc::new(MemoryStore::new())))).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.store, "ok");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn unreachable_database_degrades() {
        // Nothing listens on port 1
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(2))
            .connect_lazy("postgres://neighborly@127.0.0.1:1/neighborly")
            .unwrap();
        let (code, Json(body)) = health(State(state_with(Arc::new(PgStore::new(pool))))).await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
        assert_eq!(body.store, "unreachable");
    }
}
