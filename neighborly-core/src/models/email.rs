//! Email address validation
//!
//! Addresses are the identity key for sessions and user lookup, so they are
//! normalized (trimmed, lowercased) before anything touches the store.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::ValidationError;

/// Maximum length for an address (RFC 5321 path limit)
const MAX_EMAIL_LEN: usize = 254;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9\-]+(\.[a-z0-9\-]+)*\.[a-z]{2,}$")
        .expect("invalid email regex")
});

/// Validated, normalized email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Parse and normalize an email address.
    ///
    /// # Example
    /// ```
    /// use neighborly_core::EmailAddress;
    ///
    /// let email = EmailAddress::parse("  Ada@Example.ORG ").unwrap();
    /// assert_eq!(email.as_str(), "ada@example.org");
    /// assert!(EmailAddress::parse("not-an-email").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let normalized = s.trim().to_lowercase();

        if normalized.is_empty() {
            return Err(ValidationError::Empty { field: "email" });
        }

        if normalized.len() > MAX_EMAIL_LEN {
            return Err(ValidationError::TooLong {
                field: "email",
                max: MAX_EMAIL_LEN,
            });
        }

        if !EMAIL_RE.is_match(&normalized) {
            return Err(ValidationError::InvalidFormat {
                field: "email",
                reason: "must look like name@example.com",
            });
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        let email = EmailAddress::parse(" Resident@Block-A.Example.com\n").unwrap();
        assert_eq!(email.as_str(), "resident@block-a.example.com");
    }

    #[test]
    fn rejects_empty() {
        let err = EmailAddress::parse("   ").unwrap_err();
        assert!(matches!(err, ValidationError::Empty { .. }));
    }

    #[test]
    fn rejects_missing_domain() {
        assert!(EmailAddress::parse("resident@").is_err());
        assert!(EmailAddress::parse("resident@localhost").is_err());
        assert!(EmailAddress::parse("@example.com").is_err());
    }

    #[test]
    fn rejects_overlong() {
        let local = "a".repeat(250);
        let err = EmailAddress::parse(&format!("{}@example.com", local)).unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { max: 254, .. }));
    }
}
