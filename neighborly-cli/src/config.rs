//! Operator configuration: `.env` files and `~/.neighborly/config.toml`
//!
//! Precedence, lowest first: built-in defaults, the TOML file, environment
//! variables, command-line flags.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use neighborly_server::ServerConfig;
use serde::Deserialize;

/// `~/.neighborly`, or `./.neighborly` without a home directory
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".neighborly")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Load `.env` from the working directory, then `~/.neighborly/.env`.
///
/// Variables already set win, so the first file takes priority. Runs before
/// tracing is up, so the loaded paths are returned for logging.
pub fn load_dotenv() -> Vec<PathBuf> {
    let mut loaded = Vec::new();
    if let Ok(path) = dotenvy::dotenv() {
        loaded.push(path);
    }
    let home_env = config_dir().join(".env");
    if home_env.exists() && dotenvy::from_path(&home_env).is_ok() {
        loaded.push(home_env);
    }
    loaded
}

/// Contents of `config.toml`; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub database_url: Option<String>,
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    pub bind: Option<SocketAddr>,
    pub cors_permissive: Option<bool>,
    pub allowed_origins: Option<Vec<String>>,
    pub storage_dir: Option<PathBuf>,
    pub public_url: Option<String>,
    pub cookie_secure: Option<bool>,
    pub db_max_connections: Option<u32>,
}

impl FileConfig {
    /// Read the default file; a missing file is an empty config.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Defaults overlaid with the file's `[server]` section.
    pub fn server_defaults(&self) -> ServerConfig {
        let mut config = ServerConfig::default();
        let s = &self.server;
        if let Some(bind) = s.bind {
            config.bind_addr = bind;
        }
        if let Some(permissive) = s.cors_permissive {
            config.cors_permissive = permissive;
        }
        if let Some(origins) = &s.allowed_origins {
            config.allowed_origins = origins.clone();
        }
        if let Some(dir) = &s.storage_dir {
            config.storage_dir = dir.clone();
        }
        if let Some(url) = &s.public_url {
            config.public_url = url.trim_end_matches('/').to_owned();
        }
        if let Some(secure) = s.cookie_secure {
            config.cookie_secure = secure;
        }
        if let Some(max) = s.db_max_connections.filter(|&n| n > 0) {
            config.database.max_connections = max;
        }
        config
    }

    /// File config with environment variables on top.
    pub fn server_config(&self) -> Result<ServerConfig> {
        self.server_defaults()
            .with_env(|key| std::env::var(key).ok())
            .context("Invalid server configuration in environment")
    }
}

/// A flag or `DATABASE_URL` first, then the file.
pub fn resolve_database_url(flag: Option<String>, file: &FileConfig) -> Result<String> {
    flag.or_else(|| file.database_url.clone()).context(
        "DATABASE_URL not set. Set via --database-url, DATABASE_URL env, \
         ~/.neighborly/.env or ~/.neighborly/config.toml",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert!(config.database_url.is_none());
        assert!(config.server.bind.is_none());
    }

    #[test]
    fn file_values_overlay_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
database_url = "postgres://localhost/neighborly"

[server]
bind = "0.0.0.0:8080"
allowed_origins = ["https://app.example"]
public_url = "https://app.example/"
db_max_connections = 4
"#,
        )
        .unwrap();

        let file = FileConfig::load_from(&path).unwrap();
        let server = file.server_defaults();
        assert_eq!(server.bind_addr.port(), 8080);
        assert_eq!(server.allowed_origins, vec!["https://app.example"]);
        assert_eq!(server.public_url, "https://app.example");
        assert!(!server.cors_permissive);
        assert_eq!(server.database.max_connections, 4);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "databse_url = \"typo\"\n").unwrap();
        assert!(FileConfig::load_from(&path).is_err());
    }

    #[test]
    fn flag_beats_file_for_database_url() {
        let file = FileConfig {
            database_url: Some("postgres://file".into()),
            ..FileConfig::default()
        };
        assert_eq!(
            resolve_database_url(Some("postgres://flag".into()), &file).unwrap(),
            "postgres://flag"
        );
        assert_eq!(resolve_database_url(None, &file).unwrap(), "postgres://file");
        assert!(resolve_database_url(None, &FileConfig::default()).is_err());
    }
}
