//! Identity verification requests

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use base64::Engine;
use neighborly_core::{NotificationKind, UserStatus, ValidationError, VerificationStatus};
use serde::Deserialize;

use super::{notify, publish};
use crate::auth::CurrentUser;
use crate::events::ChangeAction;
use crate::http::error::ApiError;
use crate::http::extractors::JsonBody;
use crate::http::server::AppState;
use crate::storage::{document_key, ALLOWED_CONTENT_TYPES, MAX_DOCUMENT_BYTES};
use crate::store::{NewNotification, NewVerification, User, Verification};

const MAX_DOCUMENT_TYPE_LEN: usize = 50;

/// Base64 inflates by 4/3; leave room for the rest of the JSON
const UPLOAD_BODY_LIMIT: usize = MAX_DOCUMENT_BYTES / 3 * 4 + 64 * 1024;

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub document_type: String,
    pub content_type: String,
    pub content_base64: String,
}

/// Decoded, checked upload
#[derive(Debug)]
struct Document {
    document_type: String,
    content_type: String,
    bytes: Vec<u8>,
}

fn validate_document(req: SubmitRequest) -> Result<Document, ApiError> {
    let document_type = req.document_type.trim();
    if document_type.is_empty() {
        return Err(ValidationError::Empty {
            field: "document_type",
        }
        .into());
    }
    if document_type.chars().count() > MAX_DOCUMENT_TYPE_LEN {
        return Err(ValidationError::TooLong {
            field: "document_type",
            max: MAX_DOCUMENT_TYPE_LEN,
        }
        .into());
    }

    let content_type = req.content_type.trim().to_ascii_lowercase();
    if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
        return Err(ApiError::bad_request(format!(
            "unsupported content type '{}', expected one of: {}",
            content_type,
            ALLOWED_CONTENT_TYPES.join(", ")
        )));
    }

    // Accept data URLs as produced by FileReader.readAsDataURL
    let encoded = req
        .content_base64
        .split_once(";base64,")
        .map_or(req.content_base64.as_str(), |(_, data)| data)
        .trim();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| ApiError::bad_request("document is not valid base64"))?;

    if bytes.is_empty() {
        return Err(ValidationError::Empty { field: "document" }.into());
    }
    if bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(ApiError::bad_request(format!(
            "document exceeds {} bytes",
            MAX_DOCUMENT_BYTES
        )));
    }

    Ok(Document {
        document_type: document_type.to_owned(),
        content_type,
        bytes,
    })
}

/// Notifications for every Admin of every community the applicant is in.
async fn admin_notifications(
    state: &AppState,
    applicant: &User,
    verification: &Verification,
) -> Result<Vec<NewNotification>, ApiError> {
    let mut items = Vec::new();
    for entry in state.store.list_communities_for_user(applicant.id).await? {
        let community_id = entry.community.id;
        publish(
            state,
            community_id,
            "id_verifications",
            ChangeAction::Insert,
            verification.id,
        );
        for member in state.store.list_members(community_id).await? {
            if member.role.can_moderate() && member.user_id != applicant.id {
                items.push(NewNotification {
                    user_id: member.user_id,
                    kind: NotificationKind::VerificationSubmitted,
                    title: "New verification request".to_owned(),
                    body: format!(
                        "{} submitted a {} for review in {}",
                        applicant.full_name, verification.document_type, entry.community.name
                    ),
                    link: Some(format!("/admin/communities/{}/verifications", community_id)),
                });
            }
        }
    }
    Ok(items)
}

/// POST /api/verification - upload a document for review
async fn submit(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    JsonBody(req): JsonBody<SubmitRequest>,
) -> Result<(StatusCode, Json<Verification>), ApiError> {
    if user.status == UserStatus::Approved {
        return Err(ApiError::conflict("account is already verified"));
    }
    if let Some(latest) = state.store.latest_verification_for_user(user.id).await? {
        if latest.status == VerificationStatus::Pending {
            return Err(ApiError::conflict("a verification request is already pending"));
        }
    }

    let document = validate_document(req)?;
    let key = document_key(user.id, &document.content_type);
    state
        .storage
        .put(&key, &document.bytes, &document.content_type)
        .await
        .map_err(|e| ApiError::internal(format!("storing document: {e}")))?;

    let created = state
        .store
        .create_verification(NewVerification {
            user_id: user.id,
            document_type: document.document_type,
            document_key: key.clone(),
            content_type: document.content_type,
        })
        .await;
    let verification = match created {
        Ok(v) => v,
        Err(e) => {
            if let Err(cleanup) = state.storage.delete(&key).await {
                tracing::warn!(error = %cleanup, %key, "failed to remove orphaned document");
            }
            return Err(e.into());
        }
    };

    state
        .store
        .set_user_status(user.id, UserStatus::Pending)
        .await?;

    let items = admin_notifications(&state, &user, &verification).await?;
    notify(&state, items).await;

    tracing::info!(
        user_id = %user.id,
        verification_id = %verification.id,
        size = document.bytes.len(),
        "verification submitted"
    );
    Ok((StatusCode::CREATED, Json(verification)))
}

/// GET /api/verification - latest request, or null
async fn latest(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Option<Verification>>, ApiError> {
    Ok(Json(state.store.latest_verification_for_user(user.id).await?))
}

/// Verification routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/verification",
        get(latest)
            .post(submit)
            .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(content_type: &str, data: &str) -> SubmitRequest {
        SubmitRequest {
            document_type: "drivers_license".into(),
            content_type: content_type.into(),
            content_base64: data.into(),
        }
    }

    #[test]
    fn accepts_plain_and_data_url_base64() {
        let plain = validate_document(request("image/png", "aGVsbG8=")).unwrap();
        assert_eq!(plain.bytes, b"hello");

        let data_url =
            validate_document(request("IMAGE/PNG", "data:image/png;base64,aGVsbG8=")).unwrap();
        assert_eq!(data_url.bytes, b"hello");
        assert_eq!(data_url.content_type, "image/png");
    }

    #[test]
    fn rejects_bad_uploads() {
        assert!(validate_document(request("text/plain", "aGVsbG8=")).is_err());
        assert!(validate_document(request("image/png", "!!!")).is_err());
        assert!(validate_document(request("image/png", "")).is_err());

        let mut blank_type = request("image/png", "aGVsbG8=");
        blank_type.document_type = "  ".into();
        assert!(validate_document(blank_type).is_err());
    }

    #[test]
    fn rejects_oversized_documents() {
        let big = vec![0u8; MAX_DOCUMENT_BYTES + 1];
        let encoded = base64::engine::general_purpose::STANDARD.encode(big);
        let err = validate_document(request("application/pdf", &encoded)).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
