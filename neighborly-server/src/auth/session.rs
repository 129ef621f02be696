//! Session extractors

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Utc};

use super::{hash_token, token_from_headers};
use crate::http::{ApiError, AppState};
use crate::store::User;

/// A resolved, unexpired session
#[derive(Debug, Clone)]
pub struct Session {
    pub email: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Session if the request carries a valid one. Only store failures reject.
pub struct MaybeSession(pub Option<Session>);

/// A valid session, else 401. The user row may be gone.
pub struct SessionEmail(pub Session);

/// The signed-in user, else 401.
pub struct CurrentUser(pub User);

async fn resolve(parts: &Parts, state: &AppState) -> Result<Option<Session>, ApiError> {
    let Some(token) = token_from_headers(&parts.headers) else {
        return Ok(None);
    };
    let token_hash = hash_token(&token);

    let Some(record) = state.store.find_session(&token_hash).await? else {
        return Ok(None);
    };

    if record.expires_at <= Utc::now() {
        tracing::debug!(email = %record.email, "session expired");
        state.store.delete_session(&token_hash).await?;
        return Ok(None);
    }

    Ok(Some(Session {
        email: record.email,
        token_hash,
        expires_at: record.expires_at,
    }))
}

impl FromRequestParts<Arc<AppState>> for MaybeSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(resolve(parts, state).await?))
    }
}

impl FromRequestParts<Arc<AppState>> for SessionEmail {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        resolve(parts, state)
            .await?
            .map(Self)
            .ok_or(ApiError::Unauthorized)
    }
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let session = resolve(parts, state).await?.ok_or(ApiError::Unauthorized)?;
        state
            .store
            .find_user_by_email(&session.email)
            .await?
            .map(Self)
            .ok_or(ApiError::Unauthorized)
    }
}
