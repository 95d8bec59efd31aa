//! Typed caller identity
//!
//! Tokens carry a loose `{role, zone}` bag. It is converted exactly once, at
//! the transport edge, into [`CallerRole`]; authorization only ever matches on
//! the closed enum.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::Zone;
use crate::types::CivicError;

/// Role claimed by an authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role")]
pub enum CallerRole {
    /// Zonal authority, scoped to exactly one zone
    #[serde(rename = "authority")]
    Authority { zone: Zone },
    /// Unscoped administrator
    #[serde(rename = "superadmin")]
    SuperAdmin,
}

/// Role discriminant used when declaring operation requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    Authority,
    SuperAdmin,
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleKind::Authority => write!(f, "authority"),
            RoleKind::SuperAdmin => write!(f, "superadmin"),
        }
    }
}

impl CallerRole {
    /// Build a role from raw claim values.
    ///
    /// Missing or unrecognised roles, and authorities without a zone, are
    /// treated as unauthenticated.
    pub fn from_claims(role: Option<&str>, zone: Option<&str>) -> Result<Self, CivicError> {
        match role {
            Some("superadmin") => Ok(CallerRole::SuperAdmin),
            Some("authority") => {
                let zone = zone.ok_or_else(|| {
                    CivicError::Unauthenticated("Authority token carries no zone claim".into())
                })?;
                let zone = Zone::parse(zone).map_err(|_| {
                    CivicError::Unauthenticated("Authority token carries an invalid zone".into())
                })?;
                Ok(CallerRole::Authority { zone })
            }
            Some(other) => Err(CivicError::Unauthenticated(format!(
                "Unrecognized role claim '{}'",
                other
            ))),
            None => Err(CivicError::Unauthenticated("Token carries no role claim".into())),
        }
    }

    pub fn kind(&self) -> RoleKind {
        match self {
            CallerRole::Authority { .. } => RoleKind::Authority,
            CallerRole::SuperAdmin => RoleKind::SuperAdmin,
        }
    }

    /// Raw role claim value
    pub fn role_claim(&self) -> &'static str {
        match self {
            CallerRole::Authority { .. } => "authority",
            CallerRole::SuperAdmin => "superadmin",
        }
    }

    /// Raw zone claim value, if any
    pub fn zone_claim(&self) -> Option<&Zone> {
        match self {
            CallerRole::Authority { zone } => Some(zone),
            CallerRole::SuperAdmin => None,
        }
    }
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub uid: String,
    pub role: CallerRole,
}

impl Caller {
    pub fn authority(uid: impl Into<String>, zone: Zone) -> Self {
        Self {
            uid: uid.into(),
            role: CallerRole::Authority { zone },
        }
    }

    pub fn superadmin(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            role: CallerRole::SuperAdmin,
        }
    }
}
