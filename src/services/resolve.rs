//! Resolve-and-archive
//!
//! Moves an active issue into the append-only archive in one store
//! transaction. The zone check runs against the transaction's own read, so a
//! mismatch aborts before any write.

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::auth::{Caller, Operation};
use crate::lifecycle::require_issue_id;
use crate::model::{ArchivedIssue, Issue};
use crate::store::IssueRepository;
use crate::types::Result;

/// Confirmation returned to the resolver
#[derive(Debug, Clone, Serialize)]
pub struct ResolveOutcome {
    pub result: String,
    pub archived: ArchivedIssue,
}

/// Resolve `issue_id` on behalf of `caller`.
///
/// A second resolve of the same id, or a concurrent resolve that loses the
/// race, yields `NotFound`.
pub async fn resolve(
    issues: &dyn IssueRepository,
    caller: &Caller,
    issue_id: &str,
    notes: Option<&str>,
) -> Result<ResolveOutcome> {
    let op = Operation::ResolveIssue;
    op.check_role(caller)?;
    let issue_id = require_issue_id(issue_id)?;

    let archiver = |issue: Issue| -> Result<ArchivedIssue> {
        op.check_zone(caller, &issue.issue_zone)?;
        Ok(ArchivedIssue::snapshot(issue, caller.uid.as_str(), notes, Utc::now()))
    };

    let archived = issues.archive_issue(issue_id, &archiver).await?;

    info!(
        issue_id,
        zone = %archived.issue.issue_zone,
        resolved_by = %archived.resolved_by,
        "Issue resolved and archived"
    );

    Ok(ResolveOutcome {
        result: format!("Issue {} resolved.", issue_id),
        archived,
    })
}
