//! The caller's notifications

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::http::error::ApiError;
use crate::http::extractors::{PathParams, QueryParams};
use crate::http::server::AppState;
use crate::store::Notification;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

#[derive(Deserialize, Default)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
    pub limit: Option<u32>,
}

/// GET /api/notifications?unread=&limit=
async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    QueryParams(query): QueryParams<NotificationQuery>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    Ok(Json(
        state
            .store
            .list_notifications(user.id, query.unread, limit)
            .await?,
    ))
}

/// POST /api/notifications/{id}/read
async fn mark_read(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(id): PathParams<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Someone else's notification looks the same as a missing one
    if !state
        .store
        .mark_notification_read(id, user.id, Utc::now())
        .await?
    {
        return Err(ApiError::not_found("notification", id));
    }
    Ok(Json(serde_json::json!({ "read": true })))
}

/// POST /api/notifications/read-all
async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state
        .store
        .mark_all_notifications_read(user.id, Utc::now())
        .await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

/// Notification routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/notifications", get(list))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/{id}/read", post(mark_read))
}
