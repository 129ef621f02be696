//! Persistence layer
//!
//! One async trait per area, combined into [`Store`] and shared by handlers
//! as `Arc<dyn Store>`. Two implementations:
//!
//! - [`PgStore`]: PostgreSQL via a sqlx pool
//! - [`MemoryStore`]: in-process tables for tests and local development
//!
//! Both honor the same semantics: every call is its own consistency
//! boundary, multi-row writes (community + first admin, poll + options,
//! vote replacement) are atomic.

pub mod memory;
pub mod postgres;
pub mod records;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neighborly_core::{
    DisplayName, EmailAddress, JoinCode, Paginated, Pagination, Role, Title, UserStatus,
    VerificationStatus, VoteSelection,
};
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use records::*;

/// Wrong codes tolerated before a login code is burned
pub const MAX_LOGIN_ATTEMPTS: i32 = 5;

/// Store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    #[error("{resource}: {reason}")]
    Conflict { resource: &'static str, reason: String },

    #[error("corrupt {field} value in store: '{value}'")]
    Corrupt { field: &'static str, value: String },
}

impl StoreError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn conflict(resource: &'static str, reason: impl Into<String>) -> Self {
        Self::Conflict {
            resource,
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new `unverified` user. Conflict when the email is taken.
    async fn create_user(
        &self,
        email: &EmailAddress,
        full_name: &DisplayName,
    ) -> Result<User, StoreError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn set_user_status(&self, id: Uuid, status: UserStatus) -> Result<User, StoreError>;

    async fn update_user_name(&self, id: Uuid, full_name: &DisplayName)
        -> Result<User, StoreError>;

    /// Delete the user row. Rows owned by the user go with it; authored
    /// content keeps existing with its author cleared. Sessions are keyed
    /// by email and are not touched.
    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(
        &self,
        token_hash: &str,
        email: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionRecord, StoreError>;

    async fn find_session(&self, token_hash: &str) -> Result<Option<SessionRecord>, StoreError>;

    async fn delete_session(&self, token_hash: &str) -> Result<(), StoreError>;

    /// Store a login code for an email, replacing any earlier one.
    async fn put_login_code(
        &self,
        email: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Check a login code. A match deletes it; a miss counts an attempt and
    /// burns the code after [`MAX_LOGIN_ATTEMPTS`].
    async fn consume_login_code(
        &self,
        email: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait CommunityStore: Send + Sync {
    /// Create a community with `creator_id` as its first Admin.
    async fn create_community(
        &self,
        name: &Title,
        code: &JoinCode,
        description: Option<&str>,
        creator_id: Uuid,
    ) -> Result<Community, StoreError>;

    async fn find_community(&self, id: Uuid) -> Result<Option<Community>, StoreError>;

    async fn find_community_by_code(&self, code: &JoinCode)
        -> Result<Option<Community>, StoreError>;

    async fn list_communities_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<CommunityWithRole>, StoreError>;

    async fn add_member(
        &self,
        community_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Membership, StoreError>;

    async fn find_membership(
        &self,
        community_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, StoreError>;

    async fn list_members(&self, community_id: Uuid) -> Result<Vec<MemberProfile>, StoreError>;

    async fn set_member_role(
        &self,
        community_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Membership, StoreError>;

    async fn remove_member(&self, community_id: Uuid, user_id: Uuid) -> Result<bool, StoreError>;

    async fn remove_memberships_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;

    async fn community_stats(
        &self,
        community_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CommunityStats, StoreError>;
}

#[async_trait]
pub trait VerificationStore: Send + Sync {
    async fn create_verification(&self, new: NewVerification) -> Result<Verification, StoreError>;

    async fn find_verification(&self, id: Uuid) -> Result<Option<Verification>, StoreError>;

    async fn latest_verification_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Verification>, StoreError>;

    async fn list_verifications_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Verification>, StoreError>;

    /// Requests from members of a community, newest first.
    async fn list_verifications_for_community(
        &self,
        community_id: Uuid,
        status: Option<VerificationStatus>,
    ) -> Result<Vec<VerificationWithUser>, StoreError>;

    /// Move a pending request to approved/rejected. Conflict when it was
    /// already reviewed. `approved_at` is only set on approval.
    async fn review_verification(
        &self,
        id: Uuid,
        status: VerificationStatus,
        reviewer_id: Uuid,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Verification, StoreError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create_notifications(&self, items: Vec<NewNotification>) -> Result<u64, StoreError>;

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: u32,
    ) -> Result<Vec<Notification>, StoreError>;

    async fn mark_notification_read(
        &self,
        id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn mark_all_notifications_read(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait AnnouncementStore: Send + Sync {
    async fn create_announcement(&self, new: NewAnnouncement)
        -> Result<Announcement, StoreError>;

    /// Pinned first, then newest first.
    async fn list_announcements(
        &self,
        community_id: Uuid,
        page: Pagination,
    ) -> Result<Paginated<Announcement>, StoreError>;

    async fn find_announcement(&self, id: Uuid) -> Result<Option<Announcement>, StoreError>;

    async fn delete_announcement(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ComplaintStore: Send + Sync {
    async fn create_complaint(&self, new: NewComplaint) -> Result<Complaint, StoreError>;

    async fn list_complaints(
        &self,
        community_id: Uuid,
        filter: ComplaintFilter,
    ) -> Result<Vec<Complaint>, StoreError>;

    async fn find_complaint(&self, id: Uuid) -> Result<Option<Complaint>, StoreError>;

    async fn update_complaint_status(
        &self,
        id: Uuid,
        status: neighborly_core::ComplaintStatus,
        now: DateTime<Utc>,
    ) -> Result<Complaint, StoreError>;
}

#[async_trait]
pub trait PollStore: Send + Sync {
    async fn create_poll(&self, new: NewPoll) -> Result<(Poll, Vec<PollOption>), StoreError>;

    async fn find_poll(&self, id: Uuid) -> Result<Option<Poll>, StoreError>;

    async fn poll_options(&self, poll_id: Uuid) -> Result<Vec<PollOption>, StoreError>;

    async fn poll_summary(
        &self,
        poll_id: Uuid,
        viewer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<PollSummary>, StoreError>;

    async fn list_polls(
        &self,
        community_id: Uuid,
        viewer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<PollSummary>, StoreError>;

    /// Delete the voter's previous ballot and insert the new one atomically.
    async fn replace_votes(
        &self,
        poll_id: Uuid,
        user_id: Uuid,
        selection: &VoteSelection,
    ) -> Result<u64, StoreError>;

    async fn count_user_votes(&self, poll_id: Uuid, user_id: Uuid) -> Result<i64, StoreError>;

    async fn delete_poll(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_conversation(
        &self,
        community_id: Uuid,
        created_by: Uuid,
        participants: &[Uuid],
    ) -> Result<Conversation, StoreError>;

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError>;

    async fn conversation_participants(&self, id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    /// Newest activity first.
    async fn list_conversations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, StoreError>;

    async fn add_message(&self, new: NewMessage) -> Result<Message, StoreError>;

    /// Oldest first within the page.
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        page: Pagination,
    ) -> Result<Paginated<Message>, StoreError>;

    /// Record reads for every message the user has not read yet.
    async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn create_feedback(&self, new: NewFeedback) -> Result<Feedback, StoreError>;

    async fn list_feedback(
        &self,
        community_id: Uuid,
        page: Pagination,
    ) -> Result<Paginated<Feedback>, StoreError>;
}

#[async_trait]
pub trait AnalysisCacheStore: Send + Sync {
    async fn cached_analysis(
        &self,
        kind: AnalysisKind,
        text_hash: &str,
    ) -> Result<Option<serde_json::Value>, StoreError>;

    async fn store_analysis(
        &self,
        kind: AnalysisKind,
        text_hash: &str,
        result: &serde_json::Value,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Cheap reachability check for `/health`.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Everything the HTTP layer needs from persistence
pub trait Store:
    HealthStore
    + UserStore
    + SessionStore
    + CommunityStore
    + VerificationStore
    + NotificationStore
    + AnnouncementStore
    + ComplaintStore
    + PollStore
    + MessageStore
    + FeedbackStore
    + AnalysisCacheStore
{
}

impl<T> Store for T where
    T: HealthStore
        + UserStore
        + SessionStore
        + CommunityStore
        + VerificationStore
        + NotificationStore
        + AnnouncementStore
        + ComplaintStore
        + PollStore
        + MessageStore
        + FeedbackStore
        + AnalysisCacheStore
{
}
