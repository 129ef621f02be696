//! Passwordless sign-up and sign-in
//!
//! A six-digit code is emailed and exchanged for a session cookie.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, TimeDelta, Utc};
use neighborly_core::{DisplayName, EmailAddress};
use serde::{Deserialize, Serialize};

use super::send_email;
use crate::auth::{
    clear_session_cookie, generate_login_code, generate_token, hash_login_code, hash_token,
    session_cookie, MaybeSession, SessionEmail,
};
use crate::http::error::ApiError;
use crate::http::extractors::JsonBody;
use crate::http::server::AppState;
use crate::integrations::email::login_code_email;
use crate::store::User;

#[derive(Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub full_name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub email: String,
    pub user: Option<User>,
    pub expires_at: DateTime<Utc>,
}

/// `now + ttl`, saturating instead of overflowing.
pub(crate) fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let delta = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::days(365));
    now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

async fn issue_login_code(state: &AppState, email: &str) -> Result<(), ApiError> {
    let code = generate_login_code();
    let expires_at = expiry(Utc::now(), state.config.login_code_ttl);
    state
        .store
        .put_login_code(email, &hash_login_code(email, &code), expires_at)
        .await?;

    let minutes = state.config.login_code_ttl.as_secs() / 60;
    send_email(state, login_code_email(email, &code, minutes)).await;
    Ok(())
}

/// POST /api/auth/signup - create an account and send the first code
async fn signup(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<SignupRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let email = EmailAddress::parse(&req.email)?;
    let full_name = DisplayName::new(&req.full_name)?;

    let user = state.store.create_user(&email, &full_name).await?;
    tracing::info!(user_id = %user.id, "user signed up");

    issue_login_code(&state, email.as_str()).await?;
    Ok((StatusCode::CREATED, Json(UserResponse { user })))
}

/// POST /api/auth/login - send a code if the account exists
///
/// Always answers `{sent: true}` so the endpoint does not reveal which
/// emails have accounts.
async fn login(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let email = EmailAddress::parse(&req.email)?;

    if state.store.find_user_by_email(email.as_str()).await?.is_some() {
        issue_login_code(&state, email.as_str()).await?;
    } else {
        tracing::debug!("login requested for unknown email");
    }

    Ok(Json(serde_json::json!({ "sent": true })))
}

/// POST /api/auth/verify - exchange a code for a session cookie
async fn verify(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<VerifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = EmailAddress::parse(&req.email)?;
    let now = Utc::now();

    let code_hash = hash_login_code(email.as_str(), &req.code);
    if !state
        .store
        .consume_login_code(email.as_str(), &code_hash, now)
        .await?
    {
        return Err(ApiError::Unauthorized);
    }

    let token = generate_token();
    let ttl = state.config.session_ttl;
    state
        .store
        .create_session(&hash_token(&token), email.as_str(), expiry(now, ttl))
        .await?;

    let user = state.store.find_user_by_email(email.as_str()).await?;
    tracing::info!(user_id = ?user.as_ref().map(|u| u.id), "session created");

    let cookie = session_cookie(&token, ttl, state.config.cookie_secure);
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(serde_json::json!({ "user": user })),
    ))
}

/// POST /api/auth/logout - drop the session, clear the cookie
async fn logout(
    State(state): State<Arc<AppState>>,
    MaybeSession(session): MaybeSession,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(session) = session {
        state.store.delete_session(&session.token_hash).await?;
    }
    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            clear_session_cookie(state.config.cookie_secure),
        )]),
        Json(serde_json::json!({ "logged_out": true })),
    ))
}

/// GET /api/auth/session - who is signed in
async fn session(
    State(state): State<Arc<AppState>>,
    SessionEmail(session): SessionEmail,
) -> Result<Json<SessionResponse>, ApiError> {
    let user = state.store.find_user_by_email(&session.email).await?;
    Ok(Json(SessionResponse {
        email: session.email,
        user,
        expires_at: session.expires_at,
    }))
}

/// Auth routes (rate limited)
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/verify", post(verify))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/session", get(session))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_adds_ttl() {
        let now = Utc::now();
        let later = expiry(now, Duration::from_secs(900));
        assert_eq!((later - now).num_minutes(), 15);
    }

    #[test]
    fn expiry_saturates() {
        let now = Utc::now();
        assert!(expiry(now, Duration::from_secs(u64::MAX)) > now);
    }
}
