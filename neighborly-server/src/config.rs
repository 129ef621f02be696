//! Server configuration
//!
//! Defaults suit local development. `from_env` overlays the `NEIGHBORLY_*`,
//! `EMAIL_*` and `GIF_*` variables; the CLI layers its file config and
//! flags on top of that.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1:3030";

/// Default transactional email endpoint (Resend-compatible).
pub const DEFAULT_EMAIL_API_URL: &str = "https://api.resend.com/emails";

/// Default GIF search endpoint (Giphy-compatible).
pub const DEFAULT_GIF_API_URL: &str = "https://api.giphy.com/v1/gifs/search";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Allow any origin (development only)
    pub cors_permissive: bool,
    /// Origins allowed when not permissive
    pub allowed_origins: Vec<String>,
    pub request_timeout: Duration,
    pub session_ttl: Duration,
    /// Mark the session cookie `Secure`
    pub cookie_secure: bool,
    pub login_code_ttl: Duration,
    pub rate_limit: RateLimitConfig,
    /// Root directory for uploaded verification documents
    pub storage_dir: PathBuf,
    /// Base URL used in links inside emails
    pub public_url: String,
    pub email: EmailConfig,
    pub gifs: GifConfig,
    pub database: DatabaseConfig,
}

/// PostgreSQL pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    /// How long a request waits for a free connection
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// No key means emails are logged instead of sent
    pub api_key: Option<String>,
    pub from: String,
    pub api_url: String,
}

#[derive(Debug, Clone)]
pub struct GifConfig {
    /// No key disables GIF search
    pub api_key: Option<String>,
    pub api_url: String,
    pub rating: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(60),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            from: "Neighborly <no-reply@neighborly.local>".to_string(),
            api_url: DEFAULT_EMAIL_API_URL.to_string(),
        }
    }
}

impl Default for GifConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_GIF_API_URL.to_string(),
            rating: "pg".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.parse().unwrap_or_else(|_| {
                SocketAddr::from(([127, 0, 0, 1], 3030))
            }),
            cors_permissive: false,
            allowed_origins: Vec::new(),
            request_timeout: Duration::from_secs(30),
            session_ttl: Duration::from_secs(7 * 24 * 3600),
            cookie_secure: false,
            login_code_ttl: Duration::from_secs(15 * 60),
            rate_limit: RateLimitConfig::default(),
            storage_dir: default_storage_dir(),
            public_url: "http://localhost:3000".to_string(),
            email: EmailConfig::default(),
            gifs: GifConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

/// `~/.neighborly/documents`, or `./documents` without a home directory.
pub fn default_storage_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".neighborly").join("documents"))
        .unwrap_or_else(|| PathBuf::from("documents"))
}

/// Configuration errors surface the offending variable.
#[derive(Debug, thiserror::Error)]
#[error("invalid value for {var}: '{value}'")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

impl ServerConfig {
    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Overlay values from a lookup function (tests pass a map).
    pub fn with_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |var: &'static str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("NEIGHBORLY_BIND") {
            self.bind_addr = parse("NEIGHBORLY_BIND", &v)?;
        }
        if let Some(v) = get("NEIGHBORLY_CORS_PERMISSIVE") {
            self.cors_permissive = parse_bool("NEIGHBORLY_CORS_PERMISSIVE", &v)?;
        }
        if let Some(v) = get("NEIGHBORLY_ALLOWED_ORIGINS") {
            self.allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(v) = get("NEIGHBORLY_REQUEST_TIMEOUT_SECS") {
            self.request_timeout = Duration::from_secs(parse("NEIGHBORLY_REQUEST_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("NEIGHBORLY_SESSION_TTL_HOURS") {
            let hours: u64 = parse("NEIGHBORLY_SESSION_TTL_HOURS", &v)?;
            self.session_ttl = Duration::from_secs(hours * 3600);
        }
        if let Some(v) = get("NEIGHBORLY_COOKIE_SECURE") {
            self.cookie_secure = parse_bool("NEIGHBORLY_COOKIE_SECURE", &v)?;
        }
        if let Some(v) = get("NEIGHBORLY_LOGIN_CODE_TTL_MINUTES") {
            let minutes: u64 = parse("NEIGHBORLY_LOGIN_CODE_TTL_MINUTES", &v)?;
            self.login_code_ttl = Duration::from_secs(minutes * 60);
        }
        if let Some(v) = get("NEIGHBORLY_RATE_LIMIT_REQUESTS") {
            self.rate_limit.max_requests = parse("NEIGHBORLY_RATE_LIMIT_REQUESTS", &v)?;
        }
        if let Some(v) = get("NEIGHBORLY_RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window =
                Duration::from_secs(parse("NEIGHBORLY_RATE_LIMIT_WINDOW_SECS", &v)?);
        }
        if let Some(v) = get("NEIGHBORLY_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(v);
        }
        if let Some(v) = get("NEIGHBORLY_PUBLIC_URL") {
            self.public_url = v.trim_end_matches('/').to_owned();
        }

        if let Some(v) = get("NEIGHBORLY_DB_MAX_CONNECTIONS") {
            let max: u32 = parse("NEIGHBORLY_DB_MAX_CONNECTIONS", &v)?;
            if max == 0 {
                return Err(ConfigError {
                    var: "NEIGHBORLY_DB_MAX_CONNECTIONS",
                    value: v,
                });
            }
            self.database.max_connections = max;
        }
        if let Some(v) = get("NEIGHBORLY_DB_ACQUIRE_TIMEOUT_SECS") {
            self.database.acquire_timeout =
                Duration::from_secs(parse("NEIGHBORLY_DB_ACQUIRE_TIMEOUT_SECS", &v)?);
        }

        if let Some(v) = get("EMAIL_API_KEY") {
            self.email.api_key = Some(v);
        }
        if let Some(v) = get("EMAIL_FROM") {
            self.email.from = v;
        }
        if let Some(v) = get("EMAIL_API_URL") {
            self.email.api_url = v;
        }

        if let Some(v) = get("GIF_API_KEY") {
            self.gifs.api_key = Some(v);
        }
        if let Some(v) = get("GIF_API_URL") {
            self.gifs.api_url = v;
        }
        if let Some(v) = get("GIF_RATING") {
            self.gifs.rating = v;
        }

        Ok(self)
    }
}

fn parse<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError {
        var,
        value: value.to_owned(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError {
            var,
            value: value.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overlay(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::default().with_env(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_are_local() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND);
        assert!(!config.cors_permissive);
        assert!(config.email.api_key.is_none());
        assert_eq!(config.rate_limit.max_requests, 30);
    }

    #[test]
    fn env_overrides() {
        let config = overlay(&[
            ("NEIGHBORLY_BIND", "0.0.0.0:8080"),
            ("NEIGHBORLY_CORS_PERMISSIVE", "true"),
            ("NEIGHBORLY_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("NEIGHBORLY_SESSION_TTL_HOURS", "2"),
            ("NEIGHBORLY_PUBLIC_URL", "https://app.example/"),
            ("EMAIL_API_KEY", "re_123"),
            ("GIF_RATING", "g"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.cors_permissive);
        assert_eq!(config.allowed_origins.len(), 2);
        assert_eq!(config.session_ttl, Duration::from_secs(7200));
        assert_eq!(config.public_url, "https://app.example");
        assert_eq!(config.email.api_key.as_deref(), Some("re_123"));
        assert_eq!(config.gifs.rating, "g");
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = overlay(&[("EMAIL_API_KEY", "  ")]).unwrap();
        assert!(config.email.api_key.is_none());
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = overlay(&[("NEIGHBORLY_RATE_LIMIT_REQUESTS", "lots")]).unwrap_err();
        assert_eq!(err.var, "NEIGHBORLY_RATE_LIMIT_REQUESTS");

        let err = overlay(&[("NEIGHBORLY_COOKIE_SECURE", "maybe")]).unwrap_err();
        assert_eq!(err.var, "NEIGHBORLY_COOKIE_SECURE");
    }

    #[test]
    fn pool_size_from_env() {
        let config = overlay(&[
            ("NEIGHBORLY_DB_MAX_CONNECTIONS", "25"),
            ("NEIGHBORLY_DB_ACQUIRE_TIMEOUT_SECS", "2"),
        ])
        .unwrap();
        assert_eq!(config.database.max_connections, 25);
        assert_eq!(config.database.acquire_timeout, Duration::from_secs(2));

        let err = overlay(&[("NEIGHBORLY_DB_MAX_CONNECTIONS", "0")]).unwrap_err();
        assert_eq!(err.var, "NEIGHBORLY_DB_MAX_CONNECTIONS");
    }
}
