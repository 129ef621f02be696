//! Resident feedback with a stored sentiment score

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use neighborly_core::{Body, Paginated, Pagination, PaginationParams, ValidationError};
use serde::Deserialize;
use uuid::Uuid;

use super::analysis::sentiment;
use super::publish;
use crate::auth::{require_admin, require_member, CurrentUser};
use crate::events::ChangeAction;
use crate::http::error::ApiError;
use crate::http::extractors::{JsonBody, PathParams, QueryParams};
use crate::http::server::AppState;
use crate::store::{Feedback, NewFeedback};

const MIN_RATING: i16 = 1;
const MAX_RATING: i16 = 5;
const MAX_CATEGORY_LEN: usize = 50;

#[derive(Deserialize)]
pub struct FeedbackRequest {
    pub community_id: Uuid,
    pub category: String,
    pub message: String,
    pub rating: i16,
}

fn validate_category(raw: &str) -> Result<String, ValidationError> {
    let category = raw.trim();
    if category.is_empty() {
        return Err(ValidationError::Empty { field: "category" });
    }
    if category.chars().count() > MAX_CATEGORY_LEN {
        return Err(ValidationError::TooLong {
            field: "category",
            max: MAX_CATEGORY_LEN,
        });
    }
    Ok(category.to_lowercase())
}

fn validate_rating(rating: i16) -> Result<i16, ValidationError> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(rating)
    } else {
        Err(ValidationError::OutOfRange {
            field: "rating",
            min: MIN_RATING.into(),
            max: MAX_RATING.into(),
        })
    }
}

/// POST /api/feedback - any member
async fn submit(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    JsonBody(req): JsonBody<FeedbackRequest>,
) -> Result<(StatusCode, Json<Feedback>), ApiError> {
    require_member(state.store.as_ref(), req.community_id, user.id).await?;
    let category = validate_category(&req.category)?;
    let message = Body::new(&req.message)?;
    let rating = validate_rating(req.rating)?;

    let analyzed = sentiment(&state, message.as_str()).await?;
    let feedback = state
        .store
        .create_feedback(NewFeedback {
            community_id: req.community_id,
            user_id: user.id,
            category,
            message: message.into_string(),
            rating,
            sentiment: analyzed.result.sentiment,
            sentiment_score: analyzed.result.score,
        })
        .await?;

    publish(
        &state,
        feedback.community_id,
        "feedback",
        ChangeAction::Insert,
        feedback.id,
    );
    Ok((StatusCode::CREATED, Json(feedback)))
}

/// GET /api/communities/{id}/feedback - Admin only
async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(community_id): PathParams<Uuid>,
    QueryParams(params): QueryParams<PaginationParams>,
) -> Result<Json<Paginated<Feedback>>, ApiError> {
    require_admin(state.store.as_ref(), community_id, user.id).await?;
    Ok(Json(
        state
            .store
            .list_feedback(community_id, Pagination::from(params))
            .await?,
    ))
}

/// Feedback routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/feedback", post(submit))
        .route("/api/communities/{id}/feedback", get(list))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_bounds() {
        assert!(validate_rating(0).is_err());
        assert_eq!(validate_rating(1).unwrap(), 1);
        assert_eq!(validate_rating(5).unwrap(), 5);
        assert!(validate_rating(6).is_err());
    }

    #[test]
    fn category_normalized() {
        assert_eq!(validate_category(" Amenities ").unwrap(), "amenities");
        assert!(validate_category("").is_err());
    }
}
