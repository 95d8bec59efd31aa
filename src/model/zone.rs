//! Zone identifiers
//!
//! A zone is a geographic partition of responsibility (`BLRN`, `BLRS`, ...).
//! Authorities are scoped to exactly one zone; issues are assigned one at
//! creation and never move.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::CivicError;

/// Validated zone code
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Zone(String);

impl Zone {
    /// Parse a zone code. Surrounding whitespace is trimmed; the remainder
    /// must be non-empty ASCII alphanumerics.
    pub fn parse(raw: &str) -> Result<Self, CivicError> {
        let code = raw.trim();
        if code.is_empty() {
            return Err(CivicError::InvalidArgument("Zone must not be empty".into()));
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CivicError::InvalidArgument(format!(
                "Zone '{}' must be alphanumeric",
                code
            )));
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Zone {
    type Error = CivicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Zone::parse(&value)
    }
}

impl From<Zone> for String {
    fn from(zone: Zone) -> Self {
        zone.0
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
