//! Community polls and voting

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use neighborly_core::{poll::is_open, NotificationKind, PollDraft, VoteSelection};
use serde::Deserialize;
use uuid::Uuid;

use super::{notify, publish};
use crate::auth::{require_admin, require_member, require_participant, CurrentUser};
use crate::events::ChangeAction;
use crate::http::error::ApiError;
use crate::http::extractors::{JsonBody, PathParams};
use crate::http::server::AppState;
use crate::store::{NewNotification, NewPoll, PollSummary};

#[derive(Deserialize)]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub allow_multiple: bool,
    pub closes_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct VoteRequest {
    pub option_ids: Vec<Uuid>,
}

async fn summary(state: &AppState, poll_id: Uuid, viewer_id: Uuid) -> Result<PollSummary, ApiError> {
    state
        .store
        .poll_summary(poll_id, viewer_id, Utc::now())
        .await?
        .ok_or_else(|| ApiError::not_found("poll", poll_id))
}

/// GET /api/communities/{id}/polls - with tallies and the caller's ballot
async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(community_id): PathParams<Uuid>,
) -> Result<Json<Vec<PollSummary>>, ApiError> {
    require_member(state.store.as_ref(), community_id, user.id).await?;
    Ok(Json(
        state
            .store
            .list_polls(community_id, user.id, Utc::now())
            .await?,
    ))
}

/// POST /api/communities/{id}/polls - Admin only
async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(community_id): PathParams<Uuid>,
    JsonBody(req): JsonBody<CreatePollRequest>,
) -> Result<(StatusCode, Json<PollSummary>), ApiError> {
    require_admin(state.store.as_ref(), community_id, user.id).await?;
    let draft = PollDraft::new(
        &req.question,
        &req.options,
        req.allow_multiple,
        req.closes_at,
        Utc::now(),
    )?;

    let (poll, _options) = state
        .store
        .create_poll(NewPoll {
            community_id,
            author_id: user.id,
            draft,
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
            kind: NotificationKind::PollCreated,
            title: "New poll".to_owned(),
            body: poll.question.clone(),
            link: Some(format!("/communities/{}/polls", community_id)),
        })
        .collect();
    notify(&state, items).await;

    publish(&state, community_id, "polls", ChangeAction::Insert, poll.id);
    tracing::info!(poll_id = %poll.id, community_id = %community_id, "poll created");
    Ok((StatusCode::CREATED, Json(summary(&state, poll.id, user.id).await?)))
}

/// POST /api/polls/{id}/vote - replaces any earlier ballot
async fn vote(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(poll_id): PathParams<Uuid>,
    JsonBody(req): JsonBody<VoteRequest>,
) -> Result<Json<PollSummary>, ApiError> {
    let poll = state
        .store
        .find_poll(poll_id)
        .await?
        .ok_or_else(|| ApiError::not_found("poll", poll_id))?;
    require_participant(state.store.as_ref(), poll.community_id, user.id).await?;

    if !is_open(poll.closes_at, Utc::now()) {
        return Err(ApiError::bad_request("poll is closed"));
    }

    let known: Vec<Uuid> = state
        .store
        .poll_options(poll_id)
        .await?
        .iter()
        .map(|o| o.id)
        .collect();
    let selection = VoteSelection::validate(&req.option_ids, poll.allow_multiple, &known)?;

    let recorded = state
        .store
        .replace_votes(poll_id, user.id, &selection)
        .await?;
    tracing::debug!(poll_id = %poll_id, user_id = %user.id, recorded, "ballot replaced");

    publish(
        &state,
        poll.community_id,
        "poll_votes",
        ChangeAction::Update,
        poll_id,
    );
    Ok(Json(summary(&state, poll_id, user.id).await?))
}

/// DELETE /api/polls/{id} - Admin of its community
async fn remove(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(poll_id): PathParams<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let poll = state
        .store
        .find_poll(poll_id)
        .await?
        .ok_or_else(|| ApiError::not_found("poll", poll_id))?;
    require_admin(state.store.as_ref(), poll.community_id, user.id).await?;

    state.store.delete_poll(poll_id).await?;
    publish(
        &state,
        poll.community_id,
        "polls",
        ChangeAction::Delete,
        poll_id,
    );
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Poll routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/communities/{id}/polls", get(list).post(create))
        .route("/api/polls/{id}/vote", post(vote))
        .route("/api/polls/{id}", delete(remove))
}
