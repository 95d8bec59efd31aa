//! Issue statuses and which of them a direct status-set may target

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::CivicError;

/// Issue lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueStatus {
    Submitted,
    Approved,
    InProgress,
    OnHold,
    /// Terminal; exists only in the archive
    Resolved,
    /// Terminal; the record is deleted
    Rejected,
}

impl IssueStatus {
    pub const ALL: [IssueStatus; 6] = [
        IssueStatus::Submitted,
        IssueStatus::Approved,
        IssueStatus::InProgress,
        IssueStatus::OnHold,
        IssueStatus::Resolved,
        IssueStatus::Rejected,
    ];

    /// Whether an issue in this status lives in the active collection
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            IssueStatus::Submitted
                | IssueStatus::Approved
                | IssueStatus::InProgress
                | IssueStatus::OnHold
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Whether a direct status-set call may move an issue here.
    ///
    /// Any active issue may go to any of these at any time; there is no
    /// ordering among them.
    pub fn is_directly_settable(&self) -> bool {
        matches!(
            self,
            IssueStatus::Approved | IssueStatus::InProgress | IssueStatus::OnHold
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Submitted => "Submitted",
            IssueStatus::Approved => "Approved",
            IssueStatus::InProgress => "InProgress",
            IssueStatus::OnHold => "OnHold",
            IssueStatus::Resolved => "Resolved",
            IssueStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = CivicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IssueStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CivicError::InvalidArgument(format!("Unknown status '{}'", s)))
    }
}

/// Validate the target of a direct status-set call
pub fn validate_direct_target(target: IssueStatus) -> Result<(), CivicError> {
    match target {
        t if t.is_directly_settable() => Ok(()),
        IssueStatus::Resolved => Err(CivicError::InvalidArgument(
            "Issues are resolved through resolveIssue, not a status update.".into(),
        )),
        IssueStatus::Rejected => Err(CivicError::InvalidArgument(
            "Issues are rejected through rejectIssue, not a status update.".into(),
        )),
        other => Err(CivicError::InvalidArgument(format!(
            "Status '{}' cannot be set directly.",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_partition() {
        let active: Vec<_> = IssueStatus::ALL.iter().filter(|s| s.is_active()).collect();
        assert_eq!(active.len(), 4);
        assert!(IssueStatus::Resolved.is_terminal());
        assert!(IssueStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_direct_targets() {
        assert!(validate_direct_target(IssueStatus::Approved).is_ok());
        assert!(validate_direct_target(IssueStatus::InProgress).is_ok());
        assert!(validate_direct_target(IssueStatus::OnHold).is_ok());

        for status in [
            IssueStatus::Submitted,
            IssueStatus::Resolved,
            IssueStatus::Rejected,
        ] {
            assert!(matches!(
                validate_direct_target(status),
                Err(CivicError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!("OnHold".parse::<IssueStatus>().unwrap(), IssueStatus::OnHold);
        assert!("on_hold".parse::<IssueStatus>().is_err());
    }
}
