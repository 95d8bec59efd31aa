//! Status transitions on active issues
//!
//! Both transitions are last-write-wins: no version token, no check of the
//! current status. The target's zone is read back from the store and checked
//! before anything is written.

use tracing::info;

use crate::auth::{Caller, Operation};
use crate::lifecycle::{validate_direct_target, IssueStatus};
use crate::store::IssueRepository;
use crate::types::{CivicError, Result};

pub(crate) fn require_issue_id(issue_id: &str) -> Result<&str> {
    let issue_id = issue_id.trim();
    if issue_id.is_empty() {
        return Err(CivicError::InvalidArgument("Issue ID is required.".into()));
    }
    Ok(issue_id)
}

/// Move an active issue to `target`.
///
/// `target` must be Approved, InProgress or OnHold. Returns the
/// confirmation message.
pub async fn set_status(
    issues: &dyn IssueRepository,
    caller: &Caller,
    issue_id: &str,
    target: IssueStatus,
) -> Result<String> {
    let op = Operation::SetIssueStatus;
    op.check_role(caller)?;
    let issue_id = require_issue_id(issue_id)?;
    validate_direct_target(target)?;

    let issue = issues
        .get_issue(issue_id)
        .await?
        .ok_or_else(|| CivicError::NotFound(format!("Issue {} not found.", issue_id)))?;
    op.check_zone(caller, &issue.issue_zone)?;

    issues.set_status(issue_id, target).await?;

    info!(
        issue_id,
        from = %issue.status,
        to = %target,
        caller = %caller.uid,
        "Issue status updated"
    );
    Ok(format!("Issue {} status updated to {}.", issue_id, target))
}

/// Permanently delete an active issue.
pub async fn reject(
    issues: &dyn IssueRepository,
    caller: &Caller,
    issue_id: &str,
) -> Result<String> {
    let op = Operation::RejectIssue;
    op.check_role(caller)?;
    let issue_id = require_issue_id(issue_id)?;

    let issue = issues
        .get_issue(issue_id)
        .await?
        .ok_or_else(|| CivicError::NotFound(format!("Issue {} not found.", issue_id)))?;
    op.check_zone(caller, &issue.issue_zone)?;

    issues.delete_issue(issue_id).await?;

    info!(issue_id, zone = %issue.issue_zone, caller = %caller.uid, "Issue rejected");
    Ok(format!("Issue {} rejected and removed.", issue_id))
}
