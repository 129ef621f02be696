//! Admin dashboard: verification review, stats, member lists
//!
//! Every handler checks the Admin role in the community involved.

use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use neighborly_core::{NotificationKind, ReviewDecision, UserStatus, VerificationStatus};
use serde::Deserialize;
use uuid::Uuid;

use super::{notify, publish, send_email};
use crate::auth::{require_admin, CurrentUser};
use crate::events::ChangeAction;
use crate::http::error::ApiError;
use crate::http::extractors::{JsonBody, PathParams, QueryParams};
use crate::http::server::AppState;
use crate::integrations::email::review_email;
use crate::storage::StorageError;
use crate::store::{
    CommunityStats, MemberProfile, NewNotification, Verification, VerificationWithUser,
};

const MAX_REASON_LEN: usize = 500;

#[derive(Deserialize, Default)]
pub struct VerificationFilter {
    pub status: Option<VerificationStatus>,
}

#[derive(Deserialize, Default)]
pub struct MemberFilter {
    pub status: Option<UserStatus>,
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    pub reason: Option<String>,
}

/// The verification plus a check that the caller moderates a community
/// its applicant belongs to. Nobody reviews their own request.
async fn reviewable(
    state: &AppState,
    verification_id: Uuid,
    reviewer_id: Uuid,
) -> Result<Verification, ApiError> {
    let verification = state
        .store
        .find_verification(verification_id)
        .await?
        .ok_or_else(|| ApiError::not_found("verification", verification_id))?;

    if verification.user_id == reviewer_id {
        return Err(ApiError::forbidden(
            "you cannot review your own verification",
        ));
    }

    let communities = state
        .store
        .list_communities_for_user(verification.user_id)
        .await?;
    for entry in &communities {
        match require_admin(state.store.as_ref(), entry.community.id, reviewer_id).await {
            Ok(_) => return Ok(verification),
            Err(ApiError::Forbidden { .. }) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(ApiError::forbidden(
        "admin role required in one of the applicant's communities",
    ))
}

/// GET /api/admin/communities/{id}/verifications?status=
async fn list_verifications(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(community_id): PathParams<Uuid>,
    QueryParams(filter): QueryParams<VerificationFilter>,
) -> Result<Json<Vec<VerificationWithUser>>, ApiError> {
    require_admin(state.store.as_ref(), community_id, user.id).await?;
    let items = state
        .store
        .list_verifications_for_community(community_id, filter.status)
        .await?;
    Ok(Json(items))
}

/// POST /api/admin/verifications/{id}/review
async fn review(
    State(state): State<Arc<AppState>>,
    CurrentUser(reviewer): CurrentUser,
    PathParams(verification_id): PathParams<Uuid>,
    JsonBody(req): JsonBody<ReviewRequest>,
) -> Result<Json<Verification>, ApiError> {
    let reason = req
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());
    if reason.is_some_and(|r| r.chars().count() > MAX_REASON_LEN) {
        return Err(neighborly_core::ValidationError::TooLong {
            field: "reason",
            max: MAX_REASON_LEN,
        }
        .into());
    }

    let pending = reviewable(&state, verification_id, reviewer.id).await?;

    let verification = state
        .store
        .review_verification(
            verification_id,
            req.decision.verification_status(),
            reviewer.id,
            reason,
            Utc::now(),
        )
        .await?;

    let applicant = state
        .store
        .set_user_status(pending.user_id, req.decision.user_status())
        .await?;

    let approved = req.decision == ReviewDecision::Approve;
    tracing::info!(
        verification_id = %verification.id,
        reviewer_id = %reviewer.id,
        applicant_id = %applicant.id,
        decision = %req.decision,
        "verification reviewed"
    );

    for entry in state.store.list_communities_for_user(applicant.id).await? {
        publish(
            &state,
            entry.community.id,
            "id_verifications",
            ChangeAction::Update,
            verification.id,
        );
    }

    let body = match (approved, reason) {
        (true, _) => "Your identity has been verified.".to_owned(),
        (false, Some(reason)) => format!("Your verification was rejected: {reason}"),
        (false, None) => "Your verification was rejected.".to_owned(),
    };
    notify(
        &state,
        vec![NewNotification {
            user_id: applicant.id,
            kind: NotificationKind::VerificationReviewed,
            title: "Verification reviewed".to_owned(),
            body,
            link: Some("/verification".to_owned()),
        }],
    )
    .await;
    send_email(
        &state,
        review_email(&applicant.email, approved, reason, &state.config.public_url),
    )
    .await;

    Ok(Json(verification))
}

/// GET /api/admin/verifications/{id}/document - the uploaded file
async fn document(
    State(state): State<Arc<AppState>>,
    CurrentUser(reviewer): CurrentUser,
    PathParams(verification_id): PathParams<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let verification = reviewable(&state, verification_id, reviewer.id).await?;

    let stored = match state.storage.get(&verification.document_key).await {
        Ok(stored) => stored,
        Err(StorageError::NotFound(_)) => {
            return Err(ApiError::not_found("document", verification_id))
        }
        Err(e) => return Err(ApiError::internal(format!("reading document: {e}"))),
    };

    Ok((
        [
            (header::CONTENT_TYPE, stored.content_type),
            (header::CACHE_CONTROL, "private, no-store".to_owned()),
        ],
        stored.bytes,
    ))
}

/// GET /api/admin/communities/{id}/stats
async fn stats(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(community_id): PathParams<Uuid>,
) -> Result<Json<CommunityStats>, ApiError> {
    require_admin(state.store.as_ref(), community_id, user.id).await?;
    Ok(Json(
        state.store.community_stats(community_id, Utc::now()).await?,
    ))
}

/// GET /api/admin/communities/{id}/members?status=
async fn members(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(community_id): PathParams<Uuid>,
    QueryParams(filter): QueryParams<MemberFilter>,
) -> Result<Json<Vec<MemberProfile>>, ApiError> {
    require_admin(state.store.as_ref(), community_id, user.id).await?;
    let members = state
        .store
        .list_members(community_id)
        .await?
        .into_iter()
        .filter(|m| filter.status.map_or(true, |status| m.status == status))
        .collect();
    Ok(Json(members))
}

/// Admin routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/admin/communities/{id}/verifications",
            get(list_verifications),
        )
        .route("/api/admin/communities/{id}/stats", get(stats))
        .route("/api/admin/communities/{id}/members", get(members))
        .route("/api/admin/verifications/{id}/review", post(review))
        .route("/api/admin/verifications/{id}/document", get(document))
}
