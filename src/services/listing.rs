//! Zone-scoped reads for the admin dashboard
//!
//! Authorities only ever see their own zone. A superadmin sees every zone,
//! or narrows to one by naming it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::auth::{Caller, Operation};
use crate::geo::{self, DEFAULT_PRECISION};
use crate::lifecycle::IssueStatus;
use crate::model::{ArchivedIssue, AuthorityEntry, GeoPoint, Issue, Zone};
use crate::store::{IssueFilter, IssueRepository, ProfileRepository};
use crate::types::{CivicError, Result};

/// Geohash cell size used for proximity lookups when none is given
/// (about 1.2 km x 0.6 km)
pub const NEARBY_PRECISION: usize = 6;

/// Dashboard tallies for one zone, or all of them
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCounts {
    pub zone: Option<Zone>,
    pub active: u64,
    pub resolved: u64,
    /// Issues reported since midnight UTC that are still `Submitted`
    pub submitted_today: u64,
}

/// Active issues in the caller's scope, newest first.
///
/// `statuses` must all be active statuses; empty means every active status.
pub async fn list_issues(
    issues: &dyn IssueRepository,
    caller: &Caller,
    zone: Option<Zone>,
    statuses: &[IssueStatus],
) -> Result<Vec<Issue>> {
    let zone = Operation::ListIssues.read_scope(caller, zone)?;
    if let Some(terminal) = statuses.iter().find(|s| s.is_terminal()) {
        return Err(CivicError::InvalidArgument(format!(
            "Status '{}' is not held by active issues.",
            terminal
        )));
    }

    let filter = IssueFilter {
        zone,
        statuses: statuses.to_vec(),
        ..IssueFilter::default()
    };
    let found = issues.find_issues(&filter).await?;
    debug!(caller = %caller.uid, zone = ?filter.zone, count = found.len(), "Issues listed");
    Ok(found)
}

/// Archived issues in the caller's scope, most recently resolved first
pub async fn list_resolved_issues(
    issues: &dyn IssueRepository,
    caller: &Caller,
    zone: Option<Zone>,
) -> Result<Vec<ArchivedIssue>> {
    let zone = Operation::ListResolvedIssues.read_scope(caller, zone)?;
    issues.list_archived(zone.as_ref()).await
}

/// Active issues in the same geohash cell as `near`.
///
/// Issues that were never indexed have no position and are not returned.
pub async fn find_nearby_issues(
    issues: &dyn IssueRepository,
    caller: &Caller,
    zone: Option<Zone>,
    near: GeoPoint,
    precision: Option<usize>,
) -> Result<Vec<Issue>> {
    let zone = Operation::FindNearbyIssues.read_scope(caller, zone)?;

    let precision = precision.unwrap_or(NEARBY_PRECISION);
    if precision == 0 || precision > DEFAULT_PRECISION {
        return Err(CivicError::InvalidArgument(format!(
            "Precision must be between 1 and {}.",
            DEFAULT_PRECISION
        )));
    }
    let cell = geo::encode(near.latitude, near.longitude, precision)?;

    let filter = IssueFilter {
        zone,
        geohash_prefix: Some(cell),
        ..IssueFilter::default()
    };
    issues.find_issues(&filter).await
}

pub async fn get_issue_counts(
    issues: &dyn IssueRepository,
    caller: &Caller,
    zone: Option<Zone>,
) -> Result<IssueCounts> {
    counts_at(issues, caller, zone, Utc::now()).await
}

async fn counts_at(
    issues: &dyn IssueRepository,
    caller: &Caller,
    zone: Option<Zone>,
    now: DateTime<Utc>,
) -> Result<IssueCounts> {
    let zone = Operation::GetIssueCounts.read_scope(caller, zone)?;

    let today = IssueFilter {
        zone: zone.clone(),
        statuses: vec![IssueStatus::Submitted],
        submitted_since: Some(start_of_day(now)),
        ..IssueFilter::default()
    };

    Ok(IssueCounts {
        active: issues.count_issues(&IssueFilter::in_zone(zone.clone())).await?,
        resolved: issues.count_archived(zone.as_ref()).await?,
        submitted_today: issues.count_issues(&today).await?,
        zone,
    })
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

/// Every provisioned authority. Superadmin only.
pub async fn list_authorities(
    profiles: &dyn ProfileRepository,
    caller: &Caller,
) -> Result<Vec<AuthorityEntry>> {
    Operation::ListAuthorities.check_role(caller)?;
    profiles.list_authorities().await
}
