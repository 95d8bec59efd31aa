//! In-memory store
//!
//! Used in dev mode and tests. Every active issue carries a version that is
//! bumped on each write; [`IssueRepository::archive_issue`] reads a versioned
//! snapshot, releases the lock while the snapshot is processed, and commits
//! only if the version is unchanged. That mirrors the optimistic read-set
//! validation of the production store, including abort-and-retry.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::lifecycle::IssueStatus;
use crate::model::{ArchivedIssue, AuthorityEntry, AuthorityProfile, Issue, ReporterProfile, Zone};
use crate::store::{
    Archiver, IssueFilter, IssueRepository, LeaseRepository, PositionUpdate, ProfileRepository,
    SeverityUpdate, DEFAULT_MAX_TX_ATTEMPTS,
};
use crate::types::{CivicError, Result};

struct Versioned<T> {
    version: u64,
    doc: T,
}

#[derive(Default)]
struct Collections {
    issues: HashMap<String, Versioned<Issue>>,
    archived: HashMap<String, ArchivedIssue>,
    authorities: HashMap<String, AuthorityProfile>,
    reporters: HashMap<String, ReporterProfile>,
}

struct Lease {
    holder: String,
    expires_at: Instant,
}

/// In-memory implementation of every repository trait
pub struct MemoryStore {
    inner: RwLock<Collections>,
    leases: DashMap<String, Lease>,
    next_version: AtomicU64,
    max_tx_attempts: u32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TX_ATTEMPTS)
    }
}

impl MemoryStore {
    pub fn new(max_tx_attempts: u32) -> Self {
        Self {
            inner: RwLock::new(Collections::default()),
            leases: DashMap::new(),
            next_version: AtomicU64::new(1),
            max_tx_attempts: max_tx_attempts.max(1),
        }
    }

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst)
    }

    /// Seed a reporter profile. Reporter records are written by the external
    /// sign-up flow; this exists for dev mode and tests.
    pub async fn seed_reporter(&self, uid: &str, profile: ReporterProfile) {
        self.inner
            .write()
            .await
            .reporters
            .insert(uid.to_string(), profile);
    }

    pub async fn active_count(&self) -> usize {
        self.inner.read().await.issues.len()
    }

    pub async fn archived_count(&self) -> usize {
        self.inner.read().await.archived.len()
    }
}

fn issue_not_found(issue_id: &str) -> CivicError {
    CivicError::NotFound(format!("Issue {} not found.", issue_id))
}

#[async_trait]
impl IssueRepository for MemoryStore {
    async fn insert_issue(&self, issue: Issue) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.issues.contains_key(&issue.id) || inner.archived.contains_key(&issue.id) {
            return Err(CivicError::InvalidArgument(format!(
                "Issue {} already exists.",
                issue.id
            )));
        }
        let version = self.bump();
        inner
            .issues
            .insert(issue.id.clone(), Versioned { version, doc: issue });
        Ok(())
    }

    async fn get_issue(&self, issue_id: &str) -> Result<Option<Issue>> {
        Ok(self
            .inner
            .read()
            .await
            .issues
            .get(issue_id)
            .map(|v| v.doc.clone()))
    }

    async fn list_active(&self) -> Result<Vec<Issue>> {
        let inner = self.inner.read().await;
        let mut issues: Vec<Issue> = inner.issues.values().map(|v| v.doc.clone()).collect();
        issues.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(issues)
    }

    async fn set_status(&self, issue_id: &str, status: IssueStatus) -> Result<()> {
        let version = self.bump();
        let mut inner = self.inner.write().await;
        let entry = inner
            .issues
            .get_mut(issue_id)
            .ok_or_else(|| issue_not_found(issue_id))?;
        entry.doc.status = status;
        entry.version = version;
        Ok(())
    }

    async fn delete_issue(&self, issue_id: &str) -> Result<()> {
        self.inner
            .write()
            .await
            .issues
            .remove(issue_id)
            .map(|_| ())
            .ok_or_else(|| issue_not_found(issue_id))
    }

    async fn archive_issue(&self, issue_id: &str, archiver: Archiver<'_>) -> Result<ArchivedIssue> {
        for attempt in 1..=self.max_tx_attempts {
            // Read set
            let (read_version, snapshot) = {
                let inner = self.inner.read().await;
                match inner.issues.get(issue_id) {
                    Some(v) => (v.version, v.doc.clone()),
                    None => return Err(issue_not_found(issue_id)),
                }
            };

            let archived = archiver(snapshot)?;

            // Other writers may interleave here, as they would between a
            // transaction's read and its commit.
            tokio::task::yield_now().await;

            let mut inner = self.inner.write().await;
            let unchanged = inner
                .issues
                .get(issue_id)
                .is_some_and(|v| v.version == read_version);
            if !unchanged {
                debug!(issue_id, attempt, "Archive transaction conflicted, retrying");
                continue;
            }
            if inner.archived.contains_key(issue_id) {
                return Err(CivicError::Internal(format!(
                    "Archive record for {} already exists",
                    issue_id
                )));
            }

            inner.issues.remove(issue_id);
            inner
                .archived
                .insert(issue_id.to_string(), archived.clone());
            return Ok(archived);
        }

        Err(CivicError::Conflict(format!(
            "Archiving {} still conflicted after {} attempts",
            issue_id, self.max_tx_attempts
        )))
    }

    async fn get_archived(&self, issue_id: &str) -> Result<Option<ArchivedIssue>> {
        Ok(self.inner.read().await.archived.get(issue_id).cloned())
    }

    async fn find_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let inner = self.inner.read().await;
        let mut issues: Vec<Issue> = inner
            .issues
            .values()
            .filter(|v| filter.matches(&v.doc))
            .map(|v| v.doc.clone())
            .collect();
        issues.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(issues)
    }

    async fn count_issues(&self, filter: &IssueFilter) -> Result<u64> {
        let inner = self.inner.read().await;
        Ok(inner.issues.values().filter(|v| filter.matches(&v.doc)).count() as u64)
    }

    async fn list_archived(&self, zone: Option<&Zone>) -> Result<Vec<ArchivedIssue>> {
        let inner = self.inner.read().await;
        let mut archived: Vec<ArchivedIssue> = inner
            .archived
            .values()
            .filter(|a| zone.is_none_or(|z| *z == a.issue.issue_zone))
            .cloned()
            .collect();
        archived.sort_by(|a, b| {
            b.resolved_at
                .cmp(&a.resolved_at)
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(archived)
    }

    async fn count_archived(&self, zone: Option<&Zone>) -> Result<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .archived
            .values()
            .filter(|a| zone.is_none_or(|z| *z == a.issue.issue_zone))
            .count() as u64)
    }

    async fn write_severities(&self, updates: &[SeverityUpdate]) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let mut written = 0;
        for update in updates {
            if let Some(entry) = inner.issues.get_mut(&update.issue_id) {
                entry.doc.severity = update.severity;
                entry.version = self.bump();
                written += 1;
            }
        }
        Ok(written)
    }

    async fn write_positions(&self, updates: &[PositionUpdate]) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let mut written = 0;
        for update in updates {
            if let Some(entry) = inner.issues.get_mut(&update.issue_id) {
                entry.doc.position = Some(update.position.clone());
                entry.version = self.bump();
                written += 1;
            }
        }
        Ok(written)
    }
}

#[async_trait]
impl ProfileRepository for MemoryStore {
    async fn put_authority(&self, uid: &str, profile: AuthorityProfile) -> Result<()> {
        self.inner
            .write()
            .await
            .authorities
            .insert(uid.to_string(), profile);
        Ok(())
    }

    async fn get_authority(&self, uid: &str) -> Result<Option<AuthorityProfile>> {
        Ok(self.inner.read().await.authorities.get(uid).cloned())
    }

    async fn get_reporter(&self, uid: &str) -> Result<Option<ReporterProfile>> {
        Ok(self.inner.read().await.reporters.get(uid).cloned())
    }

    async fn list_authorities(&self) -> Result<Vec<AuthorityEntry>> {
        let inner = self.inner.read().await;
        let mut entries: Vec<AuthorityEntry> = inner
            .authorities
            .iter()
            .map(|(uid, profile)| AuthorityEntry {
                uid: uid.clone(),
                profile: profile.clone(),
            })
            .collect();
        entries.sort_by(|a, b| {
            a.profile
                .name
                .cmp(&b.profile.name)
                .then_with(|| a.uid.cmp(&b.uid))
        });
        Ok(entries)
    }
}

#[async_trait]
impl LeaseRepository for MemoryStore {
    async fn try_acquire_lease(&self, job: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).ok_or_else(|| {
            CivicError::InvalidArgument(format!("Lease TTL of {}s is out of range", ttl.as_secs()))
        })?;
        let fresh = Lease {
            holder: holder.to_string(),
            expires_at,
        };

        match self.leases.entry(job.to_string()) {
            Entry::Occupied(mut entry) => {
                let current = entry.get();
                if current.holder == holder || current.expires_at <= now {
                    entry.insert(fresh);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn release_lease(&self, job: &str, holder: &str) -> Result<()> {
        self.leases.remove_if(job, |_, lease| lease.holder == holder);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Severity, Zone};
    use chrono::Utc;

    fn issue(id: &str) -> Issue {
        Issue::submitted(id, "Streetlight", Zone::parse("BLRC").unwrap(), "citizen-1")
    }

    fn snapshot(issue: Issue) -> Result<ArchivedIssue> {
        Ok(ArchivedIssue::snapshot(issue, "tester", None, Utc::now()))
    }

    #[tokio::test]
    async fn test_missing_issue_errors() {
        let store = MemoryStore::default();
        assert!(store
            .set_status("nope", IssueStatus::Approved)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store.delete_issue("nope").await.unwrap_err().is_not_found());
        assert!(store
            .archive_issue("nope", &snapshot)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_archive_moves_record() {
        let store = MemoryStore::default();
        store.insert_issue(issue("a")).await.unwrap();

        let archived = store.archive_issue("a", &snapshot).await.unwrap();
        assert_eq!(archived.id(), "a");
        assert!(store.get_issue("a").await.unwrap().is_none());
        assert!(store.get_archived("a").await.unwrap().is_some());
        assert!(store
            .archive_issue("a", &snapshot)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_archiver_error_aborts_without_writes() {
        let store = MemoryStore::default();
        store.insert_issue(issue("a")).await.unwrap();

        let deny = |_: Issue| -> Result<ArchivedIssue> {
            Err(CivicError::PermissionDenied("no".into()))
        };
        let err = store.archive_issue("a", &deny).await.unwrap_err();
        assert!(matches!(err, CivicError::PermissionDenied(_)));
        assert_eq!(store.active_count().await, 1);
        assert_eq!(store.archived_count().await, 0);
    }

    #[tokio::test]
    async fn test_batch_writes_skip_vanished_issues() {
        let store = MemoryStore::default();
        store.insert_issue(issue("a")).await.unwrap();

        let written = store
            .write_severities(&[
                SeverityUpdate {
                    issue_id: "a".into(),
                    severity: Severity::High,
                },
                SeverityUpdate {
                    issue_id: "gone".into(),
                    severity: Severity::High,
                },
            ])
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(
            store.get_issue("a").await.unwrap().unwrap().severity,
            Severity::High
        );
        assert!(store.get_issue("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = MemoryStore::default();
        store.insert_issue(issue("a")).await.unwrap();
        assert!(matches!(
            store.insert_issue(issue("a")).await,
            Err(CivicError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_lease_exclusive_until_released() {
        let store = MemoryStore::default();
        let ttl = Duration::from_secs(60);

        assert!(store.try_acquire_lease("triage", "node-a", ttl).await.unwrap());
        assert!(!store.try_acquire_lease("triage", "node-b", ttl).await.unwrap());
        // Re-entrant for the holder
        assert!(store.try_acquire_lease("triage", "node-a", ttl).await.unwrap());

        store.release_lease("triage", "node-b").await.unwrap();
        assert!(!store.try_acquire_lease("triage", "node-b", ttl).await.unwrap());

        store.release_lease("triage", "node-a").await.unwrap();
        assert!(store.try_acquire_lease("triage", "node-b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_unrepresentable_lease_ttl_is_rejected() {
        let store = MemoryStore::default();
        let err = store
            .try_acquire_lease("triage", "node-a", Duration::from_secs(u64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, CivicError::InvalidArgument(_)));
        // Nothing was taken
        assert!(store
            .try_acquire_lease("triage", "node-b", Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_find_issues_filters_and_orders() {
        let store = MemoryStore::default();
        let north = Zone::parse("BLRN").unwrap();
        let south = Zone::parse("BLRS").unwrap();
        let base = Utc::now();

        let mut older = Issue::submitted("n-old", "Pothole", north.clone(), "c-1");
        older.timestamp = base - chrono::Duration::hours(2);
        let mut newer = Issue::submitted("n-new", "Garbage", north.clone(), "c-1");
        newer.timestamp = base;
        let other = Issue::submitted("s-1", "Garbage", south.clone(), "c-2");
        for issue in [older, newer, other] {
            store.insert_issue(issue).await.unwrap();
        }
        store.set_status("n-old", IssueStatus::OnHold).await.unwrap();

        let in_north = store
            .find_issues(&IssueFilter::in_zone(Some(north.clone())))
            .await
            .unwrap();
        let ids: Vec<_> = in_north.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["n-new", "n-old"]);

        let on_hold = IssueFilter {
            statuses: vec![IssueStatus::OnHold],
            ..IssueFilter::default()
        };
        assert_eq!(store.count_issues(&on_hold).await.unwrap(), 1);
        assert_eq!(store.count_issues(&IssueFilter::default()).await.unwrap(), 3);

        let recent = IssueFilter {
            zone: Some(north),
            submitted_since: Some(base - chrono::Duration::hours(1)),
            ..IssueFilter::default()
        };
        assert_eq!(store.count_issues(&recent).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_archive_listing_by_zone() {
        let store = MemoryStore::default();
        store.insert_issue(issue("a")).await.unwrap();
        store
            .insert_issue(Issue::submitted("b", "Garbage", Zone::parse("BLRS").unwrap(), "c-1"))
            .await
            .unwrap();
        store.archive_issue("a", &snapshot).await.unwrap();
        store.archive_issue("b", &snapshot).await.unwrap();

        let central = Zone::parse("BLRC").unwrap();
        let listed = store.list_archived(Some(&central)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), "a");
        assert_eq!(store.count_archived(None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken() {
        let store = MemoryStore::default();
        assert!(store
            .try_acquire_lease("triage", "node-a", Duration::ZERO)
            .await
            .unwrap());
        assert!(store
            .try_acquire_lease("triage", "node-b", Duration::from_secs(60))
            .await
            .unwrap());
    }
}
