//! Communities, join codes and membership

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use neighborly_core::{JoinCode, Role, Title, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::publish;
use crate::auth::{require_admin, require_member, CurrentUser};
use crate::events::ChangeAction;
use crate::http::error::ApiError;
use crate::http::extractors::{JsonBody, PathParams};
use crate::http::server::AppState;
use crate::store::{Community, CommunityWithRole, MemberProfile, Membership, StoreError};

const MAX_DESCRIPTION_LEN: usize = 1000;

/// Fresh codes to try before giving up on a collision streak
const CODE_ATTEMPTS: usize = 5;

#[derive(Deserialize)]
pub struct CreateCommunityRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

#[derive(Serialize)]
pub struct CommunityRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Serialize)]
pub struct ValidateCodeResponse {
    pub valid: bool,
    pub community: Option<CommunityRef>,
}

fn validate_description(raw: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if text.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ValidationError::TooLong {
            field: "description",
            max: MAX_DESCRIPTION_LEN,
        });
    }
    Ok(Some(text.to_owned()))
}

/// Error unless someone other than `user_id` keeps the Admin role.
async fn ensure_other_admin(
    state: &AppState,
    community_id: Uuid,
    user_id: Uuid,
) -> Result<(), ApiError> {
    let others = state
        .store
        .list_members(community_id)
        .await?
        .iter()
        .filter(|m| m.role == Role::Admin && m.user_id != user_id)
        .count();
    if others == 0 {
        return Err(ApiError::bad_request(
            "a community must keep at least one admin",
        ));
    }
    Ok(())
}

/// POST /api/communities - caller becomes its first Admin
async fn create_community(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    JsonBody(req): JsonBody<CreateCommunityRequest>,
) -> Result<(StatusCode, Json<CommunityWithRole>), ApiError> {
    let name = Title::new(&req.name)?;
    let description = validate_description(req.description.as_deref())?;

    let mut attempts = 0;
    let community = loop {
        attempts += 1;
        let code = JoinCode::generate();
        match state
            .store
            .create_community(&name, &code, description.as_deref(), user.id)
            .await
        {
            Ok(community) => break community,
            Err(StoreError::Conflict { .. }) if attempts < CODE_ATTEMPTS => {
                tracing::debug!(attempts, "join code collision, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    };

    tracing::info!(community_id = %community.id, user_id = %user.id, "community created");
    Ok((
        StatusCode::CREATED,
        Json(CommunityWithRole {
            community,
            role: Role::Admin,
        }),
    ))
}

/// GET /api/communities - the caller's communities with their role
async fn list_communities(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<CommunityWithRole>>, ApiError> {
    Ok(Json(state.store.list_communities_for_user(user.id).await?))
}

/// GET /api/communities/{id}
async fn get_community(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(community_id): PathParams<Uuid>,
) -> Result<Json<CommunityWithRole>, ApiError> {
    let membership = require_member(state.store.as_ref(), community_id, user.id).await?;
    let community = state
        .store
        .find_community(community_id)
        .await?
        .ok_or_else(|| ApiError::not_found("community", community_id))?;
    Ok(Json(CommunityWithRole {
        community,
        role: membership.role,
    }))
}

/// POST /api/communities/validate-code - no session needed
///
/// Codes match case-insensitively. Malformed codes are just invalid.
async fn validate_code(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<CodeRequest>,
) -> Result<Json<ValidateCodeResponse>, ApiError> {
    let community = match JoinCode::parse(&req.code) {
        Ok(code) => state.store.find_community_by_code(&code).await?,
        Err(_) => None,
    };
    Ok(Json(ValidateCodeResponse {
        valid: community.is_some(),
        community: community.map(|c: Community| CommunityRef {
            id: c.id,
            name: c.name,
        }),
    }))
}

/// POST /api/communities/join - join as a Resident
async fn join(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    JsonBody(req): JsonBody<CodeRequest>,
) -> Result<(StatusCode, Json<Membership>), ApiError> {
    let code = JoinCode::parse(&req.code)?;
    let community = state
        .store
        .find_community_by_code(&code)
        .await?
        .ok_or_else(|| ApiError::not_found("community", code.as_str()))?;

    let membership = state
        .store
        .add_member(community.id, user.id, Role::Resident)
        .await?;

    publish(
        &state,
        community.id,
        "community_members",
        ChangeAction::Insert,
        user.id,
    );
    tracing::info!(community_id = %community.id, user_id = %user.id, "member joined");
    Ok((StatusCode::CREATED, Json(membership)))
}

/// GET /api/communities/{id}/members
async fn list_members(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(community_id): PathParams<Uuid>,
) -> Result<Json<Vec<MemberProfile>>, ApiError> {
    require_member(state.store.as_ref(), community_id, user.id).await?;
    Ok(Json(state.store.list_members(community_id).await?))
}

/// PATCH /api/communities/{id}/members/{user_id}
async fn set_role(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams((community_id, member_id)): PathParams<(Uuid, Uuid)>,
    JsonBody(req): JsonBody<RoleRequest>,
) -> Result<Json<Membership>, ApiError> {
    require_admin(state.store.as_ref(), community_id, user.id).await?;

    let current = state
        .store
        .find_membership(community_id, member_id)
        .await?
        .ok_or_else(|| ApiError::not_found("membership", member_id))?;
    if current.role == Role::Admin && req.role != Role::Admin {
        ensure_other_admin(&state, community_id, member_id).await?;
    }

    let membership = state
        .store
        .set_member_role(community_id, member_id, req.role)
        .await?;
    publish(
        &state,
        community_id,
        "community_members",
        ChangeAction::Update,
        member_id,
    );
    tracing::info!(
        community_id = %community_id,
        member_id = %member_id,
        role = %req.role,
        "member role changed"
    );
    Ok(Json(membership))
}

/// DELETE /api/communities/{id}/members/{user_id} - Admin removal or leaving
async fn remove_member(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams((community_id, member_id)): PathParams<(Uuid, Uuid)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if member_id == user.id {
        require_member(state.store.as_ref(), community_id, user.id).await?;
    } else {
        require_admin(state.store.as_ref(), community_id, user.id).await?;
    }

    let target = state
        .store
        .find_membership(community_id, member_id)
        .await?
        .ok_or_else(|| ApiError::not_found("membership", member_id))?;
    if target.role == Role::Admin {
        ensure_other_admin(&state, community_id, member_id).await?;
    }

    state.store.remove_member(community_id, member_id).await?;
    publish(
        &state,
        community_id,
        "community_members",
        ChangeAction::Delete,
        member_id,
    );
    Ok(Json(serde_json::json!({ "removed": true })))
}

/// Community routes that need a session
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/communities", get(list_communities).post(create_community))
        .route("/api/communities/join", post(join))
        .route("/api/communities/{id}", get(get_community))
        .route("/api/communities/{id}/members", get(list_members))
        .route(
            "/api/communities/{id}/members/{user_id}",
            patch(set_role).delete(remove_member),
        )
}

/// Code validation (public, rate limited)
pub fn code_router() -> Router<Arc<AppState>> {
    Router::new().route("/api/communities/validate-code", post(validate_code))
}
