//! Poll creation and voting rules

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Title, ValidationError};

const MIN_OPTIONS: usize = 2;
const MAX_OPTIONS: usize = 10;
const MAX_OPTION_LEN: usize = 100;

/// Validated poll ready to be stored
#[derive(Debug, Clone)]
pub struct PollDraft {
    pub question: Title,
    pub options: Vec<String>,
    pub allow_multiple: bool,
    pub closes_at: Option<DateTime<Utc>>,
}

impl PollDraft {
    /// Validate a new poll.
    ///
    /// # Rules
    /// - 2 to 10 options, each trimmed, non-empty, at most 100 characters
    /// - Option labels are unique ignoring case
    /// - A closing time, when given, must be in the future
    pub fn new(
        question: &str,
        options: &[String],
        allow_multiple: bool,
        closes_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let question = Title::new(question)?;

        if options.len() < MIN_OPTIONS || options.len() > MAX_OPTIONS {
            return Err(ValidationError::OutOfRange {
                field: "options",
                min: MIN_OPTIONS as i64,
                max: MAX_OPTIONS as i64,
            });
        }

        let mut seen = HashSet::new();
        let mut labels = Vec::with_capacity(options.len());
        for raw in options {
            let label = raw.trim();
            if label.is_empty() {
                return Err(ValidationError::Empty { field: "option" });
            }
            if label.chars().count() > MAX_OPTION_LEN {
                return Err(ValidationError::TooLong {
                    field: "option",
                    max: MAX_OPTION_LEN,
                });
            }
            if !seen.insert(label.to_lowercase()) {
                return Err(ValidationError::InvalidFormat {
                    field: "options",
                    reason: "option labels must be unique",
                });
            }
            labels.push(label.to_owned());
        }

        if let Some(closes_at) = closes_at {
            if closes_at <= now {
                return Err(ValidationError::InvalidFormat {
                    field: "closes_at",
                    reason: "must be in the future",
                });
            }
        }

        Ok(Self {
            question,
            options: labels,
            allow_multiple,
            closes_at,
        })
    }
}

/// A validated set of options a voter picked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteSelection(Vec<Uuid>);

impl VoteSelection {
    /// Check a ballot against the poll's options.
    ///
    /// Repeated ids collapse to one vote, keeping first-seen order.
    pub fn validate(
        option_ids: &[Uuid],
        allow_multiple: bool,
        known_options: &[Uuid],
    ) -> Result<Self, ValidationError> {
        if option_ids.is_empty() {
            return Err(ValidationError::Empty { field: "option_ids" });
        }

        let mut seen = HashSet::new();
        let selection: Vec<Uuid> = option_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        if !allow_multiple && selection.len() > 1 {
            return Err(ValidationError::InvalidFormat {
                field: "option_ids",
                reason: "this poll accepts a single option",
            });
        }

        if let Some(unknown) = selection.iter().find(|id| !known_options.contains(id)) {
            return Err(ValidationError::InvalidVariant {
                field: "option_id",
                value: unknown.to_string(),
            });
        }

        Ok(Self(selection))
    }

    pub fn option_ids(&self) -> &[Uuid] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Whether a poll still accepts votes.
pub fn is_open(closes_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    closes_at.map_or(true, |closes_at| now < closes_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn accepts_valid_draft() {
        let now = Utc::now();
        let draft = PollDraft::new(
            "Pool hours?",
            &labels(&[" Mornings ", "Evenings"]),
            false,
            Some(now + Duration::days(3)),
            now,
        )
        .unwrap();
        assert_eq!(draft.options, vec!["Mornings", "Evenings"]);
    }

    #[test]
    fn rejects_option_counts() {
        let now = Utc::now();
        let err = PollDraft::new("Q", &labels(&["only"]), false, None, now).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));

        let eleven: Vec<String> = (0..11).map(|i| format!("option {}", i)).collect();
        assert!(PollDraft::new("Q", &eleven, false, None, now).is_err());
    }

    #[test]
    fn rejects_duplicate_labels() {
        let err = PollDraft::new("Q", &labels(&["Yes", "yes "]), false, None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn rejects_past_close() {
        let now = Utc::now();
        let err = PollDraft::new(
            "Q",
            &labels(&["a", "b"]),
            false,
            Some(now - Duration::minutes(1)),
            now,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { field: "closes_at", .. }));
    }

    #[test]
    fn single_select_rejects_two_options() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let err = VoteSelection::validate(&[a, b], false, &[a, b]).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn duplicates_collapse_before_single_select_check() {
        let a = Uuid::new_v4();
        let selection = VoteSelection::validate(&[a, a], false, &[a]).unwrap();
        assert_eq!(selection.option_ids(), &[a]);
    }

    #[test]
    fn rejects_unknown_and_empty() {
        let a = Uuid::new_v4();
        assert!(VoteSelection::validate(&[], true, &[a]).is_err());
        assert!(matches!(
            VoteSelection::validate(&[Uuid::new_v4()], true, &[a]),
            Err(ValidationError::InvalidVariant { .. })
        ));
    }

    #[test]
    fn open_until_close_time() {
        let now = Utc::now();
        assert!(is_open(None, now));
        assert!(is_open(Some(now + Duration::seconds(1)), now));
        assert!(!is_open(Some(now), now));
    }
}
