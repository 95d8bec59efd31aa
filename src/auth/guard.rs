//! Authorization guard
//!
//! Every guarded operation declares which roles may call it and whether the
//! caller's zone must match the target issue's zone. The role half runs before
//! any store access; the zone half runs against the document the operation
//! reads, before it writes anything. Zone-scoped reads narrow their query to
//! the caller's zone instead of checking a single document.

use std::fmt;

use crate::auth::{Caller, CallerRole, RoleKind};
use crate::model::Zone;
use crate::types::{CivicError, Result};

/// Roles allowed to act on issues
pub const STAFF: &[RoleKind] = &[RoleKind::Authority, RoleKind::SuperAdmin];

/// Superadmin only
pub const SUPERADMIN_ONLY: &[RoleKind] = &[RoleKind::SuperAdmin];

/// Guarded operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateAuthority,
    ResolveIssue,
    SetIssueStatus,
    RejectIssue,
    GetUserDetails,
    ListIssues,
    ListResolvedIssues,
    FindNearbyIssues,
    GetIssueCounts,
    ListAuthorities,
}

/// What an operation requires of its caller
#[derive(Debug, Clone, Copy)]
pub struct Requirement {
    pub roles: &'static [RoleKind],
    pub zone_scoped: bool,
}

impl Operation {
    pub fn requirement(&self) -> Requirement {
        match self {
            Operation::CreateAuthority => Requirement {
                roles: SUPERADMIN_ONLY,
                zone_scoped: false,
            },
            Operation::ResolveIssue | Operation::SetIssueStatus | Operation::RejectIssue => {
                Requirement {
                    roles: STAFF,
                    zone_scoped: true,
                }
            }
            Operation::GetUserDetails => Requirement {
                roles: STAFF,
                zone_scoped: false,
            },
            Operation::ListIssues
            | Operation::ListResolvedIssues
            | Operation::FindNearbyIssues
            | Operation::GetIssueCounts => Requirement {
                roles: STAFF,
                zone_scoped: true,
            },
            Operation::ListAuthorities => Requirement {
                roles: SUPERADMIN_ONLY,
                zone_scoped: false,
            },
        }
    }

    /// Role check. Must run before the operation touches the store.
    pub fn check_role(&self, caller: &Caller) -> Result<()> {
        authorize(caller, self.requirement().roles, None)
    }

    /// Zone check against the zone of the document being acted on.
    pub fn check_zone(&self, caller: &Caller, target_zone: &Zone) -> Result<()> {
        let requirement = self.requirement();
        if !requirement.zone_scoped {
            return Ok(());
        }
        authorize(caller, requirement.roles, Some(target_zone))
    }

    /// Zone filter for a read.
    ///
    /// An authority always reads its own zone; asking for another zone is
    /// denied. A superadmin reads `requested`, or every zone when `None`.
    pub fn read_scope(&self, caller: &Caller, requested: Option<Zone>) -> Result<Option<Zone>> {
        self.check_role(caller)?;
        if !self.requirement().zone_scoped {
            return Ok(requested);
        }
        match requested {
            Some(zone) => {
                self.check_zone(caller, &zone)?;
                Ok(Some(zone))
            }
            None => Ok(caller.role.zone_claim().cloned()),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::CreateAuthority => "createAuthority",
            Operation::ResolveIssue => "resolveIssue",
            Operation::SetIssueStatus => "setIssueStatus",
            Operation::RejectIssue => "rejectIssue",
            Operation::GetUserDetails => "getUserDetails",
            Operation::ListIssues => "listIssues",
            Operation::ListResolvedIssues => "listResolvedIssues",
            Operation::FindNearbyIssues => "findNearbyIssues",
            Operation::GetIssueCounts => "getIssueCounts",
            Operation::ListAuthorities => "listAuthorities",
        };
        f.write_str(name)
    }
}

/// Check `caller` against a role set and, optionally, a target zone.
///
/// A superadmin passes every zone check; an authority passes only when its
/// claimed zone equals `target_zone`.
pub fn authorize(
    caller: &Caller,
    required: &[RoleKind],
    target_zone: Option<&Zone>,
) -> Result<()> {
    let kind = caller.role.kind();
    if !required.contains(&kind) {
        return Err(CivicError::PermissionDenied(format!(
            "Role '{}' is not permitted to perform this action.",
            kind
        )));
    }

    match (&caller.role, target_zone) {
        (CallerRole::SuperAdmin, _) => Ok(()),
        (CallerRole::Authority { .. }, None) => Ok(()),
        (CallerRole::Authority { zone }, Some(target)) if zone == target => Ok(()),
        (CallerRole::Authority { zone }, Some(target)) => Err(CivicError::PermissionDenied(
            format!(
                "Authority for zone {} cannot act on issues in zone {}.",
                zone, target
            ),
        )),
    }
}
