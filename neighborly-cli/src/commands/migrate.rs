//! Apply the database schema

use anyhow::{Context, Result};
use clap::Parser;

use neighborly_server::db::{create_pool, migrations};

use crate::config::{resolve_database_url, FileConfig};

#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// Database URL (overrides config file)
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,
}

pub async fn run_migrate(args: MigrateArgs, file: &FileConfig) -> Result<()> {
    let database_url = resolve_database_url(args.database_url, file)?;
    let database = file.server_config()?.database;
    let pool = create_pool(&database_url, &database)
        .await
        .context("Failed to create database pool")?;

    migrations::run(&pool)
        .await
        .context("Failed to run migrations")?;

    println!("Schema is up to date");
    Ok(())
}
