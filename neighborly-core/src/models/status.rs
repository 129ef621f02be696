//! Lifecycle status enums stored as lowercase text columns

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ValidationError;

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn all() -> &'static [Self] {
                &[$(Self::$variant),+]
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ValidationError::InvalidVariant {
                        field: $field,
                        value: s.to_owned(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(
    /// Account status, gated by identity verification
    UserStatus, "status" {
        Unverified => "unverified",
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
);

text_enum!(
    /// Review state of a submitted identity document
    VerificationStatus, "status" {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
);

text_enum!(
    ComplaintStatus, "status" {
        Open => "open",
        InProgress => "in_progress",
        Resolved => "resolved",
        Dismissed => "dismissed",
    }
);

text_enum!(
    /// Admin decision on a verification request
    ReviewDecision, "decision" {
        Approve => "approve",
        Reject => "reject",
    }
);

text_enum!(
    NotificationKind, "kind" {
        VerificationSubmitted => "verification_submitted",
        VerificationReviewed => "verification_reviewed",
        Announcement => "announcement",
        ComplaintUpdated => "complaint_updated",
        PollCreated => "poll_created",
        Message => "message",
    }
);

impl ReviewDecision {
    /// Status the verification (and the user) ends up in.
    pub fn verification_status(&self) -> VerificationStatus {
        match self {
            Self::Approve => VerificationStatus::Approved,
            Self::Reject => VerificationStatus::Rejected,
        }
    }

    pub fn user_status(&self) -> UserStatus {
        match self {
            Self::Approve => UserStatus::Approved,
            Self::Reject => UserStatus::Rejected,
        }
    }
}

impl ComplaintStatus {
    /// Resolved and dismissed complaints no longer count as open work.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Resolved | Self::Dismissed)
    }
}
