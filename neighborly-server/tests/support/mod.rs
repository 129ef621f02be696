//! Shared harness for route tests: the full router over in-memory backends

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, BodyDataStream};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use futures::StreamExt;
use neighborly_server::config::{RateLimitConfig, ServerConfig};
use neighborly_server::integrations::{DisabledGifs, MemoryMailer};
use neighborly_server::storage::MemoryStorage;
use neighborly_server::{build_router, AppState, MemoryStore};
use serde_json::Value;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<MemoryMailer>,
    pub storage: Arc<MemoryStorage>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(ServerConfig {
            rate_limit: RateLimitConfig {
                max_requests: 10_000,
                ..RateLimitConfig::default()
            },
            ..ServerConfig::default()
        })
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(MemoryMailer::new());
        let storage = Arc::new(MemoryStorage::new());
        let state = Arc::new(AppState::new(
            store.clone(),
            storage.clone(),
            mailer.clone(),
            Arc::new(DisabledGifs),
            config,
        ));
        Self {
            router: build_router(state.clone()),
            state,
            store,
            mailer,
            storage,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        cookie: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Open a streaming GET (SSE) and hand back the live response.
    pub async fn open_stream(&self, uri: &str, cookie: &str) -> Response {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: &str) -> TestResponse {
        self.request(Method::GET, uri, None, Some(cookie)).await
    }

    pub async fn post(&self, uri: &str, body: Value, cookie: &str) -> TestResponse {
        self.request(Method::POST, uri, Some(body), Some(cookie)).await
    }

    /// The code from the latest login email to `email`.
    pub async fn login_code(&self, email: &str) -> String {
        let message = self
            .mailer
            .last_to(email)
            .await
            .expect("no login email sent");
        message
            .subject
            .rsplit(' ')
            .next()
            .expect("code in subject")
            .to_owned()
    }

    /// Exchange the emailed code for a `Cookie` header value.
    pub async fn verify(&self, email: &str) -> String {
        let code = self.login_code(email).await;
        let response = self
            .request(
                Method::POST,
                "/api/auth/verify",
                Some(serde_json::json!({ "email": email, "code": code })),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "verify failed: {}", response.body);

        let set_cookie = response.headers[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_owned()
    }

    /// Sign up and sign in; returns the session cookie.
    pub async fn sign_up(&self, email: &str, full_name: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/api/auth/signup",
                Some(serde_json::json!({ "email": email, "full_name": full_name })),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "signup failed: {}", response.body);
        self.verify(email).await
    }

    /// Create a community as `cookie`; returns `(id, code)`.
    pub async fn create_community(&self, cookie: &str, name: &str) -> (String, String) {
        let response = self
            .post("/api/communities", serde_json::json!({ "name": name }), cookie)
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        (
            response.body["id"].as_str().unwrap().to_owned(),
            response.body["code"].as_str().unwrap().to_owned(),
        )
    }

    pub async fn join(&self, cookie: &str, code: &str) {
        let response = self
            .post(
                "/api/communities/join",
                serde_json::json!({ "code": code }),
                cookie,
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    }

    /// The signed-in user's id.
    pub async fn user_id(&self, cookie: &str) -> String {
        let response = self.get("/api/user/me", cookie).await;
        response.body["user"]["id"].as_str().unwrap().to_owned()
    }
}

/// Next SSE frame as text, or `None` once the stream ends. Panics if
/// nothing arrives in time.
pub async fn next_frame(body: &mut BodyDataStream) -> Option<String> {
    let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
        .await
        .expect("timed out waiting for an event")?;
    Some(String::from_utf8(chunk.unwrap().to_vec()).unwrap())
}
