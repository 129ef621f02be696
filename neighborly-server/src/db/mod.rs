//! Database layer - connection pool, schema, operator maintenance
//!
//! Queries themselves live in [`crate::store::PgStore`].

pub mod maintenance;
pub mod migrations;
pub mod pool;

pub use pool::{create_pool, ping};
