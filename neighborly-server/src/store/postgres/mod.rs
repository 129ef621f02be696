//! PostgreSQL store
//!
//! # Design Principles
//!
//! - Runtime queries with manual row mapping, no compile-time DB access
//! - List operations JOIN or aggregate in SQL, no N+1 queries
//! - Rely on DB constraints and map violations, no check-then-insert
//! - Transactions for multi-row writes

mod analysis;
mod announcements;
mod communities;
mod complaints;
mod feedback;
mod messages;
mod notifications;
mod polls;
mod sessions;
mod users;
mod verifications;

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::{HealthStore, StoreError};

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl HealthStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        crate::db::ping(&self.pool).await?;
        Ok(())
    }
}

/// Parse a text enum column, reporting bad values as corruption.
fn parse_column<T: FromStr>(row: &PgRow, field: &'static str) -> Result<T, StoreError> {
    let value: String = row.try_get(field)?;
    value
        .parse()
        .map_err(|_| StoreError::Corrupt { field, value })
}

/// Map a unique violation to a conflict, pass everything else through.
fn conflict_on_unique(err: sqlx::Error, resource: &'static str, reason: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::conflict(resource, reason)
        }
        _ => StoreError::Sqlx(err),
    }
}

/// Map a foreign key violation to not-found.
fn missing_on_foreign_key(err: sqlx::Error, resource: &'static str, id: impl ToString) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            StoreError::not_found(resource, id)
        }
        _ => StoreError::Sqlx(err),
    }
}
