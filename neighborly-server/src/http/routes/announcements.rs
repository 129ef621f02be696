//! Community announcements

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use neighborly_core::{Body, NotificationKind, Paginated, Pagination, PaginationParams, Title};
use serde::Deserialize;
use uuid::Uuid;

use super::{notify, publish};
use crate::auth::{require_admin, require_member, CurrentUser};
use crate::events::ChangeAction;
use crate::http::error::ApiError;
use crate::http::extractors::{JsonBody, PathParams, QueryParams};
use crate::http::server::AppState;
use crate::store::{Announcement, NewAnnouncement, NewNotification};

#[derive(Deserialize)]
pub struct CreateAnnouncementRequest {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub pinned: bool,
}

/// GET /api/communities/{id}/announcements - pinned first, then newest
async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(community_id): PathParams<Uuid>,
    QueryParams(params): QueryParams<PaginationParams>,
) -> Result<Json<Paginated<Announcement>>, ApiError> {
    require_member(state.store.as_ref(), community_id, user.id).await?;
    let page = Pagination::from(params);
    Ok(Json(
        state.store.list_announcements(community_id, page).await?,
    ))
}

/// POST /api/communities/{id}/announcements - Admin only, notifies members
async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(community_id): PathParams<Uuid>,
    JsonBody(req): JsonBody<CreateAnnouncementRequest>,
) -> Result<(StatusCode, Json<Announcement>), ApiError> {
    require_admin(state.store.as_ref(), community_id, user.id).await?;
    let title = Title::new(&req.title)?;
    let body = Body::new(&req.body)?;

    let announcement = state
        .store
        .create_announcement(NewAnnouncement {
            community_id,
            author_id: user.id,
            title: title.into_string(),
            body: body.into_string(),
            pinned: req.pinned,
        })
        .await?;

    let items = state
        .store
        .list_members(community_id)
        .await?
        .into_iter()
        .filter(|m| m.user_id != user.id)
        .map(|m| NewNotification {
            user_id: m.user_id,
            kind: NotificationKind::Announcement,
            title: announcement.title.clone(),
            body: "A new announcement was posted".to_owned(),
            link: Some(format!("/communities/{}/announcements", community_id)),
        })
        .collect();
    notify(&state, items).await;

    publish(
        &state,
        community_id,
        "announcements",
        ChangeAction::Insert,
        announcement.id,
    );
    tracing::info!(announcement_id = %announcement.id, community_id = %community_id, "announcement posted");
    Ok((StatusCode::CREATED, Json(announcement)))
}

/// DELETE /api/announcements/{id} - Admin of its community
async fn remove(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(id): PathParams<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let announcement = state
        .store
        .find_announcement(id)
        .await?
        .ok_or_else(|| ApiError::not_found("announcement", id))?;
    require_admin(state.store.as_ref(), announcement.community_id, user.id).await?;

    state.store.delete_announcement(id).await?;
    publish(
        &state,
        announcement.community_id,
        "announcements",
        ChangeAction::Delete,
        id,
    );
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Announcement routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/communities/{id}/announcements",
            get(list).post(create),
        )
        .route("/api/announcements/{id}", delete(remove))
}
