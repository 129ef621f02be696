//! Axum server setup
//!
//! - Localhost-only CORS by default, with credentials so the session
//!   cookie travels
//! - Request tracing and a request timeout
//! - Graceful shutdown on SIGTERM/Ctrl+C

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::routes;
use crate::config::ServerConfig;
use crate::events::ChangeFeed;
use crate::integrations::email::mailer_from_config;
use crate::integrations::gifs::provider_from_config;
use crate::integrations::{GifError, GifProvider, Mailer, MailerError};
use crate::rate_limit::RateLimiter;
use crate::storage::{DocumentStorage, FsStorage};
use crate::store::Store;

/// Origins allowed when no list is configured
const LOCAL_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:3030",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:3030",
];

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub storage: Arc<dyn DocumentStorage>,
    pub mailer: Arc<dyn Mailer>,
    pub gifs: Arc<dyn GifProvider>,
    pub limiter: RateLimiter,
    pub feed: ChangeFeed,
    pub config: ServerConfig,
}

impl AppState {
    /// Assemble state from explicit parts (tests swap in memory backends).
    pub fn new(
        store: Arc<dyn Store>,
        storage: Arc<dyn DocumentStorage>,
        mailer: Arc<dyn Mailer>,
        gifs: Arc<dyn GifProvider>,
        config: ServerConfig,
    ) -> Self {
        Self {
            store,
            storage,
            mailer,
            gifs,
            limiter: RateLimiter::new(config.rate_limit),
            feed: ChangeFeed::new(),
            config,
        }
    }

    /// Filesystem storage plus the email and GIF clients the config asks for.
    pub fn from_config(store: Arc<dyn Store>, config: ServerConfig) -> Result<Self, ServerError> {
        let storage = Arc::new(FsStorage::new(config.storage_dir.clone()));
        let mailer: Arc<dyn Mailer> = mailer_from_config(&config.email)?.into();
        let gifs: Arc<dyn GifProvider> = provider_from_config(&config.gifs)?.into();
        tracing::info!(storage_dir = %config.storage_dir.display(), "document storage ready");
        Ok(Self::new(store, storage, mailer, gifs, config))
    }
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.cors_permissive {
        tracing::warn!("CORS: permissive mode enabled, all origins allowed");
        return CorsLayer::permissive();
    }

    let configured: Vec<&str> = if config.allowed_origins.is_empty() {
        LOCAL_ORIGINS.to_vec()
    } else {
        config.allowed_origins.iter().map(String::as_str).collect()
    };
    let origins: Vec<HeaderValue> = configured
        .into_iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Every route, with CORS, tracing and timeout applied.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config);
    let timeout = state.config.request_timeout;

    routes::router(state.clone())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until a shutdown signal arrives.
pub async fn run_server(state: Arc<AppState>) -> Result<(), ServerError> {
    let bind_addr = state.config.bind_addr;
    let app = build_router(state);

    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    // Peer addresses feed the rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("email client: {0}")]
    Mailer(#[from] MailerError),

    #[error("GIF client: {0}")]
    Gifs(#[from] GifError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_origins_are_skipped() {
        let config = ServerConfig {
            allowed_origins: vec!["https://ok.example".into(), "bad\norigin".into()],
            ..ServerConfig::default()
        };
        // Building the layer must not panic on the bad entry
        let _ = cors_layer(&config);
    }

    #[test]
    fn from_config_without_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ServerConfig {
            storage_dir: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let store: Arc<dyn Store> = Arc::new(crate::store::MemoryStore::new());
        assert!(AppState::from_config(store, config).is_ok());
    }
}
