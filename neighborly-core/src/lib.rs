//! neighborly-core: domain vocabulary shared by the server and the CLI
//!
//! Everything here is pure: validated newtypes built at the edge,
//! membership roles, poll voting rules, join codes, and the keyword-based
//! text analysis used by the classification endpoints.

pub mod analysis;
pub mod join_code;
pub mod models;
pub mod poll;

pub use analysis::{analyze_sentiment, classify_topic, text_hash, SentimentAnalysis, TopicClassification};
pub use join_code::JoinCode;
pub use models::{
    Body, ComplaintStatus, DisplayName, EmailAddress, NotificationKind, Paginated, Pagination,
    PaginationParams, ReviewDecision, Role, Title, UserStatus, ValidationError,
    VerificationStatus,
};
pub use poll::{PollDraft, VoteSelection};
