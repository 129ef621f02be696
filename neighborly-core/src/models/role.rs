//! Community membership roles

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Role of a user inside one community
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Resident,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Resident => "Resident",
            Self::Guest => "Guest",
        }
    }

    /// Admins moderate: review verifications, publish announcements,
    /// run polls, triage complaints and manage members.
    pub fn can_moderate(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Guests are read-only for complaints and poll votes.
    pub fn can_participate(&self) -> bool {
        matches!(self, Self::Admin | Self::Resident)
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "resident" => Ok(Self::Resident),
            "guest" => Ok(Self::Guest),
            _ => Err(ValidationError::InvalidVariant {
                field: "role",
                value: s.to_owned(),
            }),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
