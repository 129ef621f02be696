//! neighborly-server: multi-tenant community engagement API
//!
//! Residents verify their identity, join communities by code, and take
//! part through announcements, complaints, polls, conversations and
//! feedback. Admins review verifications and moderate.
//!
//! Persistence sits behind the [`store::Store`] trait with a PostgreSQL
//! implementation and an in-memory one for tests and local runs.

pub mod auth;
pub mod config;
pub mod db;
pub mod events;
pub mod http;
pub mod integrations;
pub mod rate_limit;
pub mod storage;
pub mod store;

pub use config::ServerConfig;
pub use http::{build_router, run_server, ApiError, AppState, ServerError};
pub use store::{MemoryStore, PgStore, Store, StoreError};
