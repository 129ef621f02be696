//! HTTP layer
//!
//! Axum router with:
//! - Session extractors and membership guards on every protected route
//! - JSON error responses (`{ "error": ... }`)
//! - Per-IP rate limiting on the auth, code-validation, analysis and GIF routes
//! - Graceful shutdown

pub mod error;
pub mod extractors;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{build_router, run_server, AppState, ServerError};
