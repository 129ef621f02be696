//! Membership and role guards
//!
//! Called by handlers right after the session extractor. Non-members and
//! members with the wrong role both get 403; a missing community is 403
//! too, so ids of other tenants are not guessable.

use neighborly_core::Role;
use uuid::Uuid;

use crate::http::ApiError;
use crate::store::{Membership, Store};

/// Caller's membership in the community, else 403.
pub async fn require_member(
    store: &dyn Store,
    community_id: Uuid,
    user_id: Uuid,
) -> Result<Membership, ApiError> {
    store
        .find_membership(community_id, user_id)
        .await?
        .ok_or_else(|| ApiError::forbidden("not a member of this community"))
}

/// Membership with the Admin role, else 403.
pub async fn require_admin(
    store: &dyn Store,
    community_id: Uuid,
    user_id: Uuid,
) -> Result<Membership, ApiError> {
    let membership = require_member(store, community_id, user_id).await?;
    if !membership.role.can_moderate() {
        return Err(ApiError::forbidden("admin role required"));
    }
    Ok(membership)
}

/// Membership with a role that may post and vote (Admin or Resident).
pub async fn require_participant(
    store: &dyn Store,
    community_id: Uuid,
    user_id: Uuid,
) -> Result<Membership, ApiError> {
    let membership = require_member(store, community_id, user_id).await?;
    if !membership.role.can_participate() {
        return Err(ApiError::forbidden(format!(
            "{} members cannot do this",
            Role::Guest
        )));
    }
    Ok(membership)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CommunityStore, MemoryStore, UserStore};
    use axum::http::StatusCode;
    use neighborly_core::{DisplayName, EmailAddress, JoinCode, Title};

    async fn setup() -> (MemoryStore, Uuid, Uuid, Uuid) {
        let store = MemoryStore::new();
        let name = DisplayName::new("Someone").unwrap();
        let admin = store
            .create_user(&EmailAddress::parse("admin@example.com").unwrap(), &name)
            .await
            .unwrap();
        let guest = store
            .create_user(&EmailAddress::parse("guest@example.com").unwrap(), &name)
            .await
            .unwrap();
        let community = store
            .create_community(
                &Title::new("Elm Street").unwrap(),
                &JoinCode::parse("ELMST1").unwrap(),
                None,
                admin.id,
            )
            .await
            .unwrap();
        store
            .add_member(community.id, guest.id, Role::Guest)
            .await
            .unwrap();
        (store, community.id, admin.id, guest.id)
    }

    #[tokio::test]
    async fn admin_passes_every_guard() {
        let (store, community, admin, _) = setup().await;
        assert!(require_member(&store, community, admin).await.is_ok());
        assert!(require_admin(&store, community, admin).await.is_ok());
        assert!(require_participant(&store, community, admin).await.is_ok());
    }

    #[tokio::test]
    async fn guest_is_read_only() {
        let (store, community, _, guest) = setup().await;
        assert!(require_member(&store, community, guest).await.is_ok());

        let err = require_participant(&store, community, guest).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        let err = require_admin(&store, community, guest).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn strangers_are_forbidden() {
        let (store, community, _, _) = setup().await;
        let err = require_member(&store, community, Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = require_member(&store, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }
}
