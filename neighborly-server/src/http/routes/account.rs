//! The signed-in user's own account

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{delete, get},
    Json, Router,
};
use neighborly_core::{DisplayName, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::publish;
use crate::auth::{CurrentUser, SessionEmail};
use crate::events::ChangeAction;
use crate::http::error::ApiError;
use crate::http::extractors::JsonBody;
use crate::http::server::AppState;
use crate::store::{CommunityWithRole, User};

/// Status reported for a live session whose user row is gone
const DELETED_STATUS: &str = "deleted";

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user: User,
    pub communities: Vec<CommunityWithRole>,
}

#[derive(Deserialize)]
pub struct UpdateMeRequest {
    pub full_name: String,
}

/// GET /api/user/status
async fn status(
    State(state): State<Arc<AppState>>,
    SessionEmail(session): SessionEmail,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = match state.store.find_user_by_email(&session.email).await? {
        Some(user) => user.status.as_str().to_owned(),
        None => DELETED_STATUS.to_owned(),
    };
    Ok(Json(StatusResponse { status }))
}

/// GET /api/user/me
async fn me(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<MeResponse>, ApiError> {
    let communities = state.store.list_communities_for_user(user.id).await?;
    Ok(Json(MeResponse { user, communities }))
}

/// PATCH /api/user/me
async fn update_me(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    JsonBody(req): JsonBody<UpdateMeRequest>,
) -> Result<Json<User>, ApiError> {
    let full_name = DisplayName::new(&req.full_name)?;
    let user = state.store.update_user_name(user.id, &full_name).await?;
    Ok(Json(user))
}

/// 400 while the user is the only Admin of a community that still has
/// other members. A community the user is alone in goes empty instead.
async fn ensure_not_sole_admin(
    state: &AppState,
    user_id: Uuid,
    communities: &[CommunityWithRole],
) -> Result<(), ApiError> {
    for entry in communities.iter().filter(|e| e.role == Role::Admin) {
        let members = state.store.list_members(entry.community.id).await?;
        let others: Vec<_> = members.iter().filter(|m| m.user_id != user_id).collect();
        if !others.is_empty() && !others.iter().any(|m| m.role == Role::Admin) {
            return Err(ApiError::bad_request(format!(
                "you are the only admin of '{}'; promote another member first",
                entry.community.name
            )));
        }
    }
    Ok(())
}

/// DELETE /api/user/account
///
/// Stored documents go first and only log on failure; memberships and the
/// user row must go. The session stays so the client can observe
/// `status: "deleted"`.
async fn delete_account(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let communities = state.store.list_communities_for_user(user.id).await?;
    ensure_not_sole_admin(&state, user.id, &communities).await?;

    for verification in state.store.list_verifications_for_user(user.id).await? {
        if let Err(e) = state.storage.delete(&verification.document_key).await {
            tracing::warn!(
                error = %e,
                user_id = %user.id,
                key = %verification.document_key,
                "failed to delete verification document"
            );
        }
    }

    let removed = state.store.remove_memberships_for_user(user.id).await?;
    state.store.delete_user(user.id).await?;

    for entry in &communities {
        publish(
            &state,
            entry.community.id,
            "community_members",
            ChangeAction::Delete,
            user.id,
        );
    }

    tracing::info!(user_id = %user.id, memberships = removed, "account deleted");
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Account routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/user/status", get(status))
        .route("/api/user/me", get(me).patch(update_me))
        .route("/api/user/account", delete(delete_account))
}
