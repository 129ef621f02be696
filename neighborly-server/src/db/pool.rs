//! PostgreSQL pool construction
//!
//! Connections identify themselves as `neighborly` in `pg_stat_activity`.

use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use crate::config::DatabaseConfig;

const APPLICATION_NAME: &str = "neighborly";

/// Open a pool sized by `config`. A malformed URL fails before any
/// connection attempt.
pub async fn create_pool(
    database_url: &str,
    config: &DatabaseConfig,
) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(database_url)?.application_name(APPLICATION_NAME);
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await?;
    tracing::debug!(
        max_connections = config.max_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        "database pool ready"
    );
    Ok(pool)
}

/// Round-trip a trivial query; used by the health check.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_url_is_rejected_up_front() {
        let err = create_pool("not a database url", &DatabaseConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, sqlx::Error::Configuration(_)), "{err}");
    }

    // Run with: DATABASE_URL=postgres://... cargo test -p neighborly-server -- --ignored

    #[tokio::test]
    #[ignore = "requires database"]
    async fn pool_honors_config_and_tags_connections() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let config = DatabaseConfig {
            max_connections: 3,
            ..DatabaseConfig::default()
        };
        let pool = create_pool(&url, &config).await.expect("pool creation failed");
        assert_eq!(pool.options().get_max_connections(), 3);

        ping(&pool).await.expect("ping failed");
        let (name,): (String,) = sqlx::query_as("SELECT current_setting('application_name')")
            .fetch_one(&pool)
            .await
            .expect("query failed");
        assert_eq!(name, APPLICATION_NAME);
    }
}
