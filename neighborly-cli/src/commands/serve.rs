//! Run the HTTP API
//!
//! PostgreSQL by default; `--memory` keeps everything in process for local
//! development and demos.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use neighborly_server::db::{create_pool, migrations};
use neighborly_server::{run_server, AppState, MemoryStore, PgStore, Store};

use crate::config::{resolve_database_url, FileConfig};

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to (default: 127.0.0.1:3030)
    #[arg(long, short = 'b')]
    pub bind: Option<SocketAddr>,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// Database URL (overrides config file)
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Use the in-memory store instead of PostgreSQL (data is lost on exit)
    #[arg(long, conflicts_with = "migrate")]
    pub memory: bool,

    /// Apply the schema before serving
    #[arg(long)]
    pub migrate: bool,

    /// Maximum PostgreSQL connections in the pool
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub db_max_connections: Option<u32>,
}

/// Run the HTTP server until Ctrl+C
pub async fn run_serve(args: ServeArgs, file: &FileConfig) -> Result<()> {
    let mut config = file.server_config()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if args.cors_permissive {
        config.cors_permissive = true;
    }
    if let Some(max) = args.db_max_connections {
        config.database.max_connections = max;
    }

    let store: Arc<dyn Store> = if args.memory {
        tracing::warn!("Using the in-memory store; nothing is persisted");
        Arc::new(MemoryStore::new())
    } else {
        let database_url = resolve_database_url(args.database_url, file)?;
        let pool = create_pool(&database_url, &config.database)
            .await
            .context("Failed to create database pool")?;
        if args.migrate {
            migrations::run(&pool)
                .await
                .context("Failed to run migrations")?;
        }
        Arc::new(PgStore::new(pool))
    };

    if config.email.api_key.is_none() {
        tracing::warn!("EMAIL_API_KEY not set; login codes are written to the log");
    }

    tracing::info!("Starting neighborly server on {}", config.bind_addr);

    let state = AppState::from_config(store, config).context("Failed to build server state")?;
    run_server(Arc::new(state)).await.context("Server error")?;

    Ok(())
}
