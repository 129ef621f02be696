//! Fixed-window request limiter keyed by client IP
//!
//! Process-local: every server instance counts on its own.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::http::{ApiError, AppState};

/// Windows older than this many periods are swept
const SWEEP_AFTER_WINDOWS: u32 = 2;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, Window>>,
}

/// Outcome of counting one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count a request for `key` and decide whether it may proceed.
    pub async fn check(&self, key: &str) -> Decision {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        if windows.len() > 10_000 {
            let horizon = self.config.window * SWEEP_AFTER_WINDOWS;
            windows.retain(|_, w| now.duration_since(w.started) < horizon);
        }

        let window = windows.entry(key.to_owned()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= self.config.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        if window.count >= self.config.max_requests {
            let elapsed = now.duration_since(window.started);
            return Decision::Limited {
                retry_after: self.config.window.saturating_sub(elapsed),
            };
        }

        window.count += 1;
        Decision::Allowed {
            remaining: self.config.max_requests - window.count,
        }
    }
}

/// First `X-Forwarded-For` hop, then the socket peer, else `"unknown"`.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_owned(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_owned(),
    }
}

/// Middleware for the routes that are cheap to abuse.
pub async fn limit_by_ip(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), peer);

    match state.limiter.check(&key).await {
        Decision::Allowed { .. } => Ok(next.run(request).await),
        Decision::Limited { retry_after } => {
            tracing::warn!(client = %key, path = %request.uri().path(), "rate limited");
            Err(ApiError::RateLimited {
                retry_after: retry_after.as_secs().max(1),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn limiter(max_requests: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(60),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn limits_within_window() {
        let limiter = limiter(2);
        assert_eq!(limiter.check("a").await, Decision::Allowed { remaining: 1 });
        assert_eq!(limiter.check("a").await, Decision::Allowed { remaining: 0 });
        assert!(matches!(limiter.check("a").await, Decision::Limited { .. }));

        // Other clients have their own window
        assert_eq!(limiter.check("b").await, Decision::Allowed { remaining: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets() {
        let limiter = limiter(1);
        limiter.check("a").await;
        tokio::time::advance(Duration::from_secs(30)).await;
        match limiter.check("a").await {
            Decision::Limited { retry_after } => assert_eq!(retry_after, Duration::from_secs(30)),
            other => panic!("expected limit, got {other:?}"),
        }

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(limiter.check("a").await, Decision::Allowed { remaining: 0 });
    }

    #[test]
    fn client_key_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "10.0.0.9:5555".parse().unwrap();

        assert_eq!(client_key(&headers, None), "unknown");
        assert_eq!(client_key(&headers, Some(peer)), "10.0.0.9");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_key(&headers, Some(peer)), "203.0.113.7");
    }
}
