//! Bounded free-text fields
//!
//! Names, titles and bodies share the same rules: trimmed, non-empty,
//! capped in characters (not bytes, so non-ASCII names are not penalized).

use serde::Serialize;

use super::ValidationError;

const MAX_DISPLAY_NAME_LEN: usize = 100;
const MAX_TITLE_LEN: usize = 200;
const MAX_BODY_LEN: usize = 10_000;

fn bounded(s: &str, field: &'static str, max: usize) -> Result<String, ValidationError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(trimmed.to_owned())
}

macro_rules! bounded_text {
    ($(#[$meta:meta])* $name:ident, $field:literal, $max:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: &str) -> Result<Self, ValidationError> {
                bounded(s, $field, $max).map(Self)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

bounded_text!(
    /// A person's display name
    DisplayName,
    "full_name",
    MAX_DISPLAY_NAME_LEN
);

bounded_text!(
    /// Title of an announcement, complaint, poll question or community name
    Title,
    "title",
    MAX_TITLE_LEN
);

bounded_text!(
    /// Long-form text: announcement bodies, complaint descriptions, messages
    Body,
    "body",
    MAX_BODY_LEN
);
