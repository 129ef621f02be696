//! Route handlers organized by resource

use std::sync::Arc;

use axum::middleware;
use axum::Router;
use uuid::Uuid;

use super::server::AppState;
use crate::events::{ChangeAction, ChangeEvent};
use crate::integrations::EmailMessage;
use crate::rate_limit::limit_by_ip;
use crate::store::NewNotification;

pub mod account;
pub mod admin;
pub mod analysis;
pub mod announcements;
pub mod auth;
pub mod communities;
pub mod complaints;
pub mod conversations;
pub mod events;
pub mod feedback;
pub mod gifs;
pub mod health;
pub mod notifications;
pub mod polls;
pub mod verification;

/// All routes. Cheap-to-abuse endpoints sit behind the per-IP limiter.
pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let limited = Router::new()
        .merge(auth::router())
        .merge(communities::code_router())
        .merge(analysis::router())
        .merge(gifs::router())
        .route_layer(middleware::from_fn_with_state(state, limit_by_ip));

    Router::new()
        .merge(health::router())
        .merge(limited)
        .merge(account::router())
        .merge(verification::router())
        .merge(admin::router())
        .merge(communities::router())
        .merge(notifications::router())
        .merge(announcements::router())
        .merge(complaints::router())
        .merge(polls::router())
        .merge(conversations::router())
        .merge(feedback::router())
        .merge(events::router())
}

/// Tell SSE listeners a row changed.
pub(crate) fn publish(
    state: &AppState,
    community_id: Uuid,
    table: &'static str,
    action: ChangeAction,
    id: Uuid,
) {
    state
        .feed
        .publish(ChangeEvent::new(community_id, table, action, id));
}

/// Create notifications; a failure is logged, not returned.
pub(crate) async fn notify(state: &AppState, items: Vec<NewNotification>) {
    if items.is_empty() {
        return;
    }
    let count = items.len();
    if let Err(e) = state.store.create_notifications(items).await {
        tracing::warn!(error = %e, count, "failed to create notifications");
    }
}

/// Send an email; a failure is logged, not returned.
pub(crate) async fn send_email(state: &AppState, message: EmailMessage) {
    let to = message.to.clone();
    if let Err(e) = state.mailer.send(message).await {
        tracing::warn!(error = %e, %to, "failed to send email");
    }
}
