//! Community join codes
//!
//! Codes are stored uppercase and compared after normalization, so a
//! resident typing `sunset42` matches a community created with `SUNSET42`.

use rand::Rng;
use serde::Serialize;

use crate::models::ValidationError;

const MIN_CODE_LEN: usize = 4;
const MAX_CODE_LEN: usize = 12;
const GENERATED_LEN: usize = 8;

/// No 0/O or 1/I: codes get read aloud and copied from paper notices.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Normalized community join code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JoinCode(String);

impl JoinCode {
    /// Normalize user input into a join code.
    ///
    /// # Example
    /// ```
    /// use neighborly_core::JoinCode;
    ///
    /// let code = JoinCode::parse(" sunset42 ").unwrap();
    /// assert_eq!(code.as_str(), "SUNSET42");
    /// assert!(JoinCode::parse("no spaces").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let normalized = s.trim().to_ascii_uppercase();

        if normalized.is_empty() {
            return Err(ValidationError::Empty { field: "code" });
        }

        if normalized.len() > MAX_CODE_LEN {
            return Err(ValidationError::TooLong {
                field: "code",
                max: MAX_CODE_LEN,
            });
        }

        if normalized.len() < MIN_CODE_LEN
            || !normalized.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        {
            return Err(ValidationError::InvalidFormat {
                field: "code",
                reason: "must be 4-12 letters or digits",
            });
        }

        Ok(Self(normalized))
    }

    /// Generate a fresh random code.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let code = (0..GENERATED_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for JoinCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercase_matches_stored_uppercase() {
        let typed = JoinCode::parse("maple7").unwrap();
        let stored = JoinCode::parse("MAPLE7").unwrap();
        assert_eq!(typed, stored);
    }

    #[test]
    fn rejects_short_and_symbols() {
        assert!(matches!(
            JoinCode::parse("ab1"),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            JoinCode::parse("ABC-123"),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            JoinCode::parse(""),
            Err(ValidationError::Empty { .. })
        ));
    }

    #[test]
    fn generated_codes_parse() {
        for _ in 0..50 {
            let code = JoinCode::generate();
            assert_eq!(code.as_str().len(), GENERATED_LEN);
            assert_eq!(JoinCode::parse(code.as_str()).unwrap(), code);
        }
    }
}
