//! Resident complaints and their triage

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use chrono::Utc;
use neighborly_core::{classify_topic, Body, ComplaintStatus, NotificationKind, Title};
use serde::Deserialize;
use uuid::Uuid;

use super::{notify, publish};
use crate::auth::{require_admin, require_member, require_participant, CurrentUser};
use crate::events::ChangeAction;
use crate::http::error::ApiError;
use crate::http::extractors::{JsonBody, PathParams, QueryParams};
use crate::http::server::AppState;
use crate::store::{Complaint, ComplaintFilter, NewComplaint, NewNotification};

const MAX_CATEGORY_LEN: usize = 50;

#[derive(Deserialize)]
pub struct CreateComplaintRequest {
    pub title: String,
    pub description: String,
    pub category: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ComplaintQuery {
    pub status: Option<ComplaintStatus>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ComplaintStatus,
}

/// Given category, lowercased; classified from the text when omitted.
fn resolve_category(given: Option<&str>, title: &str, description: &str) -> Result<String, ApiError> {
    match given.map(str::trim).filter(|c| !c.is_empty()) {
        Some(category) if category.chars().count() > MAX_CATEGORY_LEN => {
            Err(neighborly_core::ValidationError::TooLong {
                field: "category",
                max: MAX_CATEGORY_LEN,
            }
            .into())
        }
        Some(category) => Ok(category.to_lowercase()),
        None => Ok(classify_topic(&format!("{title} {description}")).category),
    }
}

/// POST /api/communities/{id}/complaints - Admins and Residents
async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(community_id): PathParams<Uuid>,
    JsonBody(req): JsonBody<CreateComplaintRequest>,
) -> Result<(StatusCode, Json<Complaint>), ApiError> {
    require_participant(state.store.as_ref(), community_id, user.id).await?;
    let title = Title::new(&req.title)?;
    let description = Body::new(&req.description)?;
    let category = resolve_category(req.category.as_deref(), title.as_str(), description.as_str())?;

    let complaint = state
        .store
        .create_complaint(NewComplaint {
            community_id,
            author_id: user.id,
            title: title.into_string(),
            description: description.into_string(),
            category,
        })
        .await?;

    publish(
        &state,
        community_id,
        "complaints",
        ChangeAction::Insert,
        complaint.id,
    );
    tracing::info!(complaint_id = %complaint.id, category = %complaint.category, "complaint filed");
    Ok((StatusCode::CREATED, Json(complaint)))
}

/// GET /api/communities/{id}/complaints?status= - Admins see all, others their own
async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(community_id): PathParams<Uuid>,
    QueryParams(query): QueryParams<ComplaintQuery>,
) -> Result<Json<Vec<Complaint>>, ApiError> {
    let membership = require_member(state.store.as_ref(), community_id, user.id).await?;
    let filter = ComplaintFilter {
        author_id: (!membership.role.can_moderate()).then_some(user.id),
        status: query.status,
    };
    Ok(Json(state.store.list_complaints(community_id, filter).await?))
}

/// PATCH /api/complaints/{id} - Admin triage, notifies the author
async fn update_status(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(id): PathParams<Uuid>,
    JsonBody(req): JsonBody<UpdateStatusRequest>,
) -> Result<Json<Complaint>, ApiError> {
    let complaint = state
        .store
        .find_complaint(id)
        .await?
        .ok_or_else(|| ApiError::not_found("complaint", id))?;
    require_admin(state.store.as_ref(), complaint.community_id, user.id).await?;

    let updated = state
        .store
        .update_complaint_status(id, req.status, Utc::now())
        .await?;

    if let Some(author_id) = updated.author_id.filter(|a| *a != user.id) {
        notify(
            &state,
            vec![NewNotification {
                user_id: author_id,
                kind: NotificationKind::ComplaintUpdated,
                title: "Complaint updated".to_owned(),
                body: format!("\"{}\" is now {}", updated.title, updated.status),
                link: Some(format!("/communities/{}/complaints", updated.community_id)),
            }],
        )
        .await;
    }

    publish(
        &state,
        updated.community_id,
        "complaints",
        ChangeAction::Update,
        id,
    );
    Ok(Json(updated))
}

/// Complaint routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/communities/{id}/complaints", get(list).post(create))
        .route("/api/complaints/{id}", patch(update_status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_category_wins() {
        assert_eq!(
            resolve_category(Some(" Parking "), "Leak", "water everywhere").unwrap(),
            "parking"
        );
    }

    #[test]
    fn missing_category_is_classified() {
        let category = resolve_category(None, "Broken elevator", "the elevator is broken again").unwrap();
        assert_eq!(category, classify_topic("Broken elevator the elevator is broken again").category);
    }

    #[test]
    fn overlong_category_rejected() {
        assert!(resolve_category(Some(&"x".repeat(MAX_CATEGORY_LEN + 1)), "t", "d").is_err());
    }
}
