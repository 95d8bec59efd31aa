//! Repository layer
//!
//! Handlers never reach for a global client: they receive the store through
//! these traits. [`MongoStore`] backs production, [`MemoryStore`] backs tests
//! and dev mode with the same optimistic-transaction semantics.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::lifecycle::IssueStatus;
use crate::model::{
    ArchivedIssue, AuthorityEntry, AuthorityProfile, Issue, Position, ReporterProfile, Severity,
    Zone,
};
use crate::types::Result;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Default bound on transaction attempts before giving up
pub const DEFAULT_MAX_TX_ATTEMPTS: u32 = 5;

/// Builds the archive snapshot from the issue read inside the transaction.
///
/// Returning an error aborts the transaction before anything is written.
pub type Archiver<'a> = &'a (dyn Fn(Issue) -> Result<ArchivedIssue> + Send + Sync);

/// A severity change computed by the triage job
#[derive(Debug, Clone, PartialEq)]
pub struct SeverityUpdate {
    pub issue_id: String,
    pub severity: Severity,
}

/// A position computed by the geospatial indexer
#[derive(Debug, Clone, PartialEq)]
pub struct PositionUpdate {
    pub issue_id: String,
    pub position: Position,
}

/// Query over active issues. Unset fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueFilter {
    pub zone: Option<Zone>,
    /// Any of these statuses; empty means every status
    pub statuses: Vec<IssueStatus>,
    /// Prefix of `position.geohash`; issues without a position never match
    pub geohash_prefix: Option<String>,
    /// Reported at or after this instant
    pub submitted_since: Option<DateTime<Utc>>,
}

impl IssueFilter {
    pub fn in_zone(zone: Option<Zone>) -> Self {
        Self {
            zone,
            ..Self::default()
        }
    }

    pub fn matches(&self, issue: &Issue) -> bool {
        if self.zone.as_ref().is_some_and(|z| *z != issue.issue_zone) {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&issue.status) {
            return false;
        }
        if let Some(prefix) = &self.geohash_prefix {
            match &issue.position {
                Some(position) if position.geohash.starts_with(prefix.as_str()) => {}
                _ => return false,
            }
        }
        if let Some(since) = self.submitted_since {
            if issue.timestamp < since {
                return false;
            }
        }
        true
    }
}

/// Active issues and their archive
#[async_trait]
pub trait IssueRepository: Send + Sync {
    /// Insert a newly reported issue
    async fn insert_issue(&self, issue: Issue) -> Result<()>;

    async fn get_issue(&self, issue_id: &str) -> Result<Option<Issue>>;

    /// Every active issue
    async fn list_active(&self) -> Result<Vec<Issue>>;

    /// Overwrite the status of an active issue (last write wins).
    /// `NotFound` if the issue does not exist.
    async fn set_status(&self, issue_id: &str, status: IssueStatus) -> Result<()>;

    /// Permanently delete an active issue. `NotFound` if absent.
    async fn delete_issue(&self, issue_id: &str) -> Result<()>;

    /// Atomically move an issue into the archive.
    ///
    /// Reads the active record inside a transaction, hands it to `archiver`,
    /// then writes the snapshot and deletes the active record in the same
    /// transaction. Conflicting writers cause the whole transaction to be
    /// retried against fresh data; an issue that vanished in the meantime
    /// yields `NotFound`.
    async fn archive_issue(&self, issue_id: &str, archiver: Archiver<'_>) -> Result<ArchivedIssue>;

    async fn get_archived(&self, issue_id: &str) -> Result<Option<ArchivedIssue>>;

    /// Active issues matching `filter`, newest first
    async fn find_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>>;

    async fn count_issues(&self, filter: &IssueFilter) -> Result<u64>;

    /// Archived issues, in one zone or all of them, most recently resolved first
    async fn list_archived(&self, zone: Option<&Zone>) -> Result<Vec<ArchivedIssue>>;

    async fn count_archived(&self, zone: Option<&Zone>) -> Result<u64>;

    /// Apply severity changes as one batch. Issues that no longer exist are
    /// skipped. Returns the number of issues written.
    async fn write_severities(&self, updates: &[SeverityUpdate]) -> Result<usize>;

    /// Apply positions as one batch. Issues that no longer exist are skipped.
    /// Returns the number of issues written.
    async fn write_positions(&self, updates: &[PositionUpdate]) -> Result<usize>;
}

/// Authority and reporter profiles
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn put_authority(&self, uid: &str, profile: AuthorityProfile) -> Result<()>;

    async fn get_authority(&self, uid: &str) -> Result<Option<AuthorityProfile>>;

    async fn get_reporter(&self, uid: &str) -> Result<Option<ReporterProfile>>;

    /// Every authority, ordered by name
    async fn list_authorities(&self) -> Result<Vec<AuthorityEntry>>;
}

/// Time-bounded job leases backing the scheduler's single-flight guard
#[async_trait]
pub trait LeaseRepository: Send + Sync {
    /// Take the lease for `job` if it is free, expired, or already ours.
    async fn try_acquire_lease(&self, job: &str, holder: &str, ttl: Duration) -> Result<bool>;

    /// Release the lease if `holder` still owns it
    async fn release_lease(&self, job: &str, holder: &str) -> Result<()>;
}
