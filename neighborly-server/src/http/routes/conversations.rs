//! Direct and group conversations inside a community

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use neighborly_core::{Body, NotificationKind, Paginated, Pagination, PaginationParams};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{notify, publish};
use crate::auth::{require_member, CurrentUser};
use crate::events::ChangeAction;
use crate::http::error::ApiError;
use crate::http::extractors::{JsonBody, PathParams, QueryParams};
use crate::http::server::AppState;
use crate::store::{
    Conversation, ConversationSummary, Message, NewMessage, NewNotification,
};

const MAX_GIF_URL_LEN: usize = 500;
const PREVIEW_CHARS: usize = 80;

#[derive(Deserialize)]
pub struct CreateConversationRequest {
    pub community_id: Uuid,
    pub participant_ids: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct ConversationResponse {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub participants: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub body: Option<String>,
    pub gif_url: Option<String>,
}

/// Body and GIF URL after validation; at least one is present.
fn validate_message(req: &SendMessageRequest) -> Result<(Option<String>, Option<String>), ApiError> {
    let body = match req.body.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
        Some(text) => Some(Body::new(text)?.into_string()),
        None => None,
    };

    let gif_url = req
        .gif_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());
    if let Some(url) = gif_url {
        if !url.starts_with("https://") || url.len() > MAX_GIF_URL_LEN {
            return Err(ApiError::bad_request("gif_url must be an https URL"));
        }
    }

    if body.is_none() && gif_url.is_none() {
        return Err(ApiError::bad_request("a message needs a body or a gif_url"));
    }
    Ok((body, gif_url.map(str::to_owned)))
}

/// Conversation plus its participants, 403 unless the caller is one.
async fn participant_of(
    state: &AppState,
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<(Conversation, Vec<Uuid>), ApiError> {
    let conversation = state
        .store
        .find_conversation(conversation_id)
        .await?
        .ok_or_else(|| ApiError::not_found("conversation", conversation_id))?;
    let participants = state.store.conversation_participants(conversation_id).await?;
    if !participants.contains(&user_id) {
        return Err(ApiError::forbidden("not a participant in this conversation"));
    }
    Ok((conversation, participants))
}

/// GET /api/conversations - newest activity first
async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    Ok(Json(state.store.list_conversations(user.id).await?))
}

/// POST /api/conversations - everyone involved must be a member
async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    JsonBody(req): JsonBody<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationResponse>), ApiError> {
    require_member(state.store.as_ref(), req.community_id, user.id).await?;

    let others: Vec<Uuid> = req
        .participant_ids
        .iter()
        .copied()
        .filter(|id| *id != user.id)
        .collect();
    if others.is_empty() {
        return Err(ApiError::bad_request(
            "a conversation needs at least one other participant",
        ));
    }
    for id in &others {
        if state
            .store
            .find_membership(req.community_id, *id)
            .await?
            .is_none()
        {
            return Err(ApiError::bad_request(format!(
                "user {id} is not a member of this community"
            )));
        }
    }

    let conversation = state
        .store
        .create_conversation(req.community_id, user.id, &others)
        .await?;
    let participants = state.store.conversation_participants(conversation.id).await?;

    publish(
        &state,
        conversation.community_id,
        "conversations",
        ChangeAction::Insert,
        conversation.id,
    );
    Ok((
        StatusCode::CREATED,
        Json(ConversationResponse {
            conversation,
            participants,
        }),
    ))
}

/// GET /api/conversations/{id}/messages - oldest first
async fn list_messages(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(conversation_id): PathParams<Uuid>,
    QueryParams(params): QueryParams<PaginationParams>,
) -> Result<Json<Paginated<Message>>, ApiError> {
    participant_of(&state, conversation_id, user.id).await?;
    Ok(Json(
        state
            .store
            .list_messages(conversation_id, Pagination::from(params))
            .await?,
    ))
}

/// POST /api/conversations/{id}/messages
async fn send_message(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(conversation_id): PathParams<Uuid>,
    JsonBody(req): JsonBody<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let (conversation, participants) = participant_of(&state, conversation_id, user.id).await?;
    let (body, gif_url) = validate_message(&req)?;

    let message = state
        .store
        .add_message(NewMessage {
            conversation_id,
            sender_id: user.id,
            body,
            gif_url,
        })
        .await?;

    let preview = match &message.body {
        Some(text) => text.chars().take(PREVIEW_CHARS).collect(),
        None => "sent a GIF".to_owned(),
    };
    let items = participants
        .into_iter()
        .filter(|id| *id != user.id)
        .map(|id| NewNotification {
            user_id: id,
            kind: NotificationKind::Message,
            title: format!("Message from {}", user.full_name),
            body: preview.clone(),
            link: Some(format!("/conversations/{}", conversation_id)),
        })
        .collect();
    notify(&state, items).await;

    publish(
        &state,
        conversation.community_id,
        "messages",
        ChangeAction::Insert,
        message.id,
    );
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /api/conversations/{id}/read
async fn mark_read(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(conversation_id): PathParams<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    participant_of(&state, conversation_id, user.id).await?;
    let marked = state
        .store
        .mark_conversation_read(conversation_id, user.id, Utc::now())
        .await?;
    Ok(Json(serde_json::json!({ "marked": marked })))
}

/// Conversation routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/conversations", get(list).post(create))
        .route(
            "/api/conversations/{id}/messages",
            get(list_messages).post(send_message),
        )
        .route("/api/conversations/{id}/read", post(mark_read))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: Option<&str>, gif_url: Option<&str>) -> SendMessageRequest {
        SendMessageRequest {
            body: body.map(str::to_owned),
            gif_url: gif_url.map(str::to_owned),
        }
    }

    #[test]
    fn needs_body_or_gif() {
        assert!(validate_message(&request(None, None)).is_err());
        assert!(validate_message(&request(Some("   "), Some(""))).is_err());

        let (body, gif) = validate_message(&request(Some(" hi "), None)).unwrap();
        assert_eq!(body.as_deref(), Some("hi"));
        assert!(gif.is_none());

        let (body, gif) =
            validate_message(&request(None, Some("https://media.example/a.gif"))).unwrap();
        assert!(body.is_none());
        assert!(gif.is_some());
    }

    #[test]
    fn gif_url_must_be_https() {
        assert!(validate_message(&request(None, Some("http://media.example/a.gif"))).is_err());
        assert!(validate_message(&request(None, Some("javascript:alert(1)"))).is_err());
    }
}
