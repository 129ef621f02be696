//! Row types shared by every store implementation

use chrono::{DateTime, Utc};
use neighborly_core::{
    ComplaintStatus, NotificationKind, PollDraft, Role, UserStatus, VerificationStatus,
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Server-side half of a session cookie. Keyed by the token hash; the raw
/// token only ever lives in the client's cookie.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub token_hash: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Community {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommunityWithRole {
    #[serde(flatten)]
    pub community: Community,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct Membership {
    pub community_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberProfile {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub status: UserStatus,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

/// Admin dashboard counters for one community
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommunityStats {
    pub members: i64,
    pub admins: i64,
    pub residents: i64,
    pub guests: i64,
    pub pending_verifications: i64,
    pub open_complaints: i64,
    pub active_polls: i64,
    pub announcements: i64,
    pub feedback_count: i64,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewVerification {
    pub user_id: Uuid,
    pub document_type: String,
    pub document_key: String,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_type: String,
    #[serde(skip_serializing)]
    pub document_key: String,
    pub content_type: String,
    pub status: VerificationStatus,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationWithUser {
    #[serde(flatten)]
    pub verification: Verification,
    pub email: String,
    pub full_name: String,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAnnouncement {
    pub community_id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub body: String,
    pub pinned: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Announcement {
    pub id: Uuid,
    pub community_id: Uuid,
    pub author_id: Option<Uuid>,
    pub title: String,
    pub body: String,
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComplaint {
    pub community_id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Complaint {
    pub id: Uuid,
    pub community_id: Uuid,
    pub author_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub category: String,
    pub status: ComplaintStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ComplaintFilter {
    pub author_id: Option<Uuid>,
    pub status: Option<ComplaintStatus>,
}

#[derive(Debug, Clone)]
pub struct NewPoll {
    pub community_id: Uuid,
    pub author_id: Uuid,
    pub draft: PollDraft,
}

#[derive(Debug, Clone, Serialize)]
pub struct Poll {
    pub id: Uuid,
    pub community_id: Uuid,
    pub author_id: Option<Uuid>,
    pub question: String,
    pub allow_multiple: bool,
    pub closes_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollOption {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub label: String,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollOptionTally {
    pub id: Uuid,
    pub label: String,
    pub position: i32,
    pub votes: i64,
}

/// Poll as shown to one viewer: tallies plus the viewer's own ballot
#[derive(Debug, Clone, Serialize)]
pub struct PollSummary {
    #[serde(flatten)]
    pub poll: Poll,
    pub options: Vec<PollOptionTally>,
    pub voters: i64,
    pub my_votes: Vec<Uuid>,
    pub is_open: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    pub community_id: Uuid,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: Option<String>,
    pub gif_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub body: Option<String>,
    pub gif_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub community_id: Uuid,
    pub participants: Vec<Uuid>,
    pub last_message: Option<Message>,
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub community_id: Uuid,
    pub user_id: Uuid,
    pub category: String,
    pub message: String,
    pub rating: i16,
    pub sentiment: String,
    pub sentiment_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Feedback {
    pub id: Uuid,
    pub community_id: Uuid,
    pub user_id: Option<Uuid>,
    pub category: String,
    pub message: String,
    pub rating: i16,
    pub sentiment: String,
    pub sentiment_score: f64,
    pub created_at: DateTime<Utc>,
}

/// Which memoization table an analysis result lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisKind {
    Topic,
    Sentiment,
}

impl AnalysisKind {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Topic => "topic_cache",
            Self::Sentiment => "sentiment_cache",
        }
    }
}
