//! Server-Sent Events for a community's change feed

use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::auth::{require_member, CurrentUser};
use crate::events::{ChangeAction, ChangeEvent};
use crate::http::error::ApiError;
use crate::http::extractors::PathParams;
use crate::http::server::AppState;

/// The subscriber's own removal from the community closes their stream.
fn ends_subscription(change: &ChangeEvent, user_id: Uuid) -> bool {
    change.table == "community_members"
        && change.action == ChangeAction::Delete
        && change.id == user_id
}

/// GET /api/communities/{id}/events - members only
///
/// Each event is `event: change` with a JSON `ChangeEvent` payload. The
/// stream ends once the subscriber leaves or is removed.
async fn stream_events(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    PathParams(community_id): PathParams<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    require_member(state.store.as_ref(), community_id, user.id).await?;

    let receiver = state.feed.subscribe();
    let user_id = user.id;
    tracing::debug!(community_id = %community_id, user_id = %user_id, "event stream opened");

    let events = stream::unfold(receiver, move |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(change) if change.community_id != community_id => continue,
                Ok(change) if ends_subscription(&change, user_id) => {
                    tracing::debug!(
                        community_id = %community_id,
                        user_id = %user_id,
                        "member removed, closing event stream"
                    );
                    return None;
                }
                Ok(change) => {
                    let event = Event::default().event("change").json_data(&change);
                    return Some((event, receiver));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event stream lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Event stream routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/communities/{id}/events", get(stream_events))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_own_removal_ends_the_stream() {
        let community = Uuid::new_v4();
        let me = Uuid::new_v4();
        let removed = |id| ChangeEvent::new(community, "community_members", ChangeAction::Delete, id);

        assert!(ends_subscription(&removed(me), me));
        assert!(!ends_subscription(&removed(Uuid::new_v4()), me));
        assert!(!ends_subscription(
            &ChangeEvent::new(community, "community_members", ChangeAction::Update, me),
            me
        ));
        assert!(!ends_subscription(
            &ChangeEvent::new(community, "polls", ChangeAction::Delete, me),
            me
        ));
    }
}
