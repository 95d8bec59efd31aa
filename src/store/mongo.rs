//! MongoDB-backed store
//!
//! Multi-document writes run inside session transactions. A transaction that
//! fails with `TransientTransactionError` (write conflicts included) is rerun
//! from the first read, up to `max_tx_attempts` times. A commit whose outcome
//! is unknown is re-committed rather than rerun.

use async_trait::async_trait;
use bson::{doc, DateTime, Document};
use mongodb::error::{
    Error as MongoError, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT,
};
use mongodb::ClientSession;
use std::time::Duration;
use tracing::{debug, warn};

use crate::db::schemas::{
    ArchivedIssueDoc, AuthorityDoc, IssueDoc, LeaseDoc, ReporterDoc, ARCHIVED_ISSUE_COLLECTION,
    AUTHORITY_COLLECTION, ISSUE_COLLECTION, LEASE_COLLECTION, REPORTER_COLLECTION,
};
use crate::db::{is_duplicate_key, MongoClient, MongoCollection};
use crate::lifecycle::IssueStatus;
use crate::model::{
    ArchivedIssue, AuthorityEntry, AuthorityProfile, Issue, ReporterProfile, Zone,
};
use crate::store::{
    Archiver, IssueFilter, IssueRepository, LeaseRepository, PositionUpdate, ProfileRepository,
    SeverityUpdate,
};
use crate::types::{CivicError, Result};

/// Why a transaction attempt did not commit
enum TxFailure {
    /// Driver error; rerun if labelled transient
    Mongo(MongoError),
    /// Business failure decided inside the transaction; never rerun
    Abort(CivicError),
}

impl From<MongoError> for TxFailure {
    fn from(err: MongoError) -> Self {
        TxFailure::Mongo(err)
    }
}

/// MongoDB implementation of every repository trait
pub struct MongoStore {
    client: MongoClient,
    issues: MongoCollection<IssueDoc>,
    archived: MongoCollection<ArchivedIssueDoc>,
    authorities: MongoCollection<AuthorityDoc>,
    reporters: MongoCollection<ReporterDoc>,
    leases: MongoCollection<LeaseDoc>,
    max_tx_attempts: u32,
}

impl MongoStore {
    /// Open every collection, creating indexes as needed
    pub async fn connect(client: MongoClient, max_tx_attempts: u32) -> Result<Self> {
        Ok(Self {
            issues: client.collection(ISSUE_COLLECTION).await?,
            archived: client.collection(ARCHIVED_ISSUE_COLLECTION).await?,
            authorities: client.collection(AUTHORITY_COLLECTION).await?,
            reporters: client.collection(REPORTER_COLLECTION).await?,
            leases: client.collection(LEASE_COLLECTION).await?,
            client,
            max_tx_attempts: max_tx_attempts.max(1),
        })
    }

    async fn commit(&self, session: &mut ClientSession) -> std::result::Result<(), MongoError> {
        let mut attempt = 1;
        loop {
            match session.commit_transaction().await {
                Ok(()) => return Ok(()),
                Err(e)
                    if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                        && attempt < self.max_tx_attempts =>
                {
                    debug!(attempt, "Commit outcome unknown, retrying commit");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Resolve the outcome of one attempt: `Ok(Some)` on success, `Ok(None)`
    /// when the attempt should be rerun.
    fn settle<T>(
        &self,
        outcome: std::result::Result<T, TxFailure>,
        attempt: u32,
        what: &str,
    ) -> Result<Option<T>> {
        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(TxFailure::Abort(err)) => Err(err),
            Err(TxFailure::Mongo(e))
                if e.contains_label(TRANSIENT_TRANSACTION_ERROR)
                    && attempt < self.max_tx_attempts =>
            {
                warn!(attempt, error = %e, "{} hit a transient conflict, retrying", what);
                Ok(None)
            }
            Err(TxFailure::Mongo(e)) if e.contains_label(TRANSIENT_TRANSACTION_ERROR) => Err(
                CivicError::Conflict(format!("{} gave up after {} attempts: {}", what, attempt, e)),
            ),
            Err(TxFailure::Mongo(e)) => {
                Err(CivicError::Database(format!("{} failed: {}", what, e)))
            }
        }
    }

    async fn archive_in_tx(
        &self,
        session: &mut ClientSession,
        issue_id: &str,
        archiver: Archiver<'_>,
    ) -> std::result::Result<ArchivedIssue, TxFailure> {
        let doc = self
            .issues
            .inner()
            .find_one(doc! { "_id": issue_id })
            .session(&mut *session)
            .await?
            .ok_or_else(|| {
                TxFailure::Abort(CivicError::NotFound(format!("Issue {} not found.", issue_id)))
            })?;

        let archived = archiver(Issue::from(doc)).map_err(TxFailure::Abort)?;

        match self
            .archived
            .inner()
            .insert_one(ArchivedIssueDoc::from(archived.clone()))
            .session(&mut *session)
            .await
        {
            Ok(_) => {}
            Err(e) if is_duplicate_key(&e) => {
                return Err(TxFailure::Abort(CivicError::Internal(format!(
                    "Issue {} is already archived",
                    issue_id
                ))))
            }
            Err(e) => return Err(e.into()),
        }

        let deleted = self
            .issues
            .inner()
            .delete_one(doc! { "_id": issue_id })
            .session(&mut *session)
            .await?;
        if deleted.deleted_count == 0 {
            return Err(TxFailure::Abort(CivicError::NotFound(format!(
                "Issue {} not found.",
                issue_id
            ))));
        }

        Ok(archived)
    }

    async fn archive_once(
        &self,
        session: &mut ClientSession,
        issue_id: &str,
        archiver: Archiver<'_>,
    ) -> std::result::Result<ArchivedIssue, TxFailure> {
        session.start_transaction().await?;
        match self.archive_in_tx(session, issue_id, archiver).await {
            Ok(archived) => {
                self.commit(session).await?;
                Ok(archived)
            }
            Err(failure) => {
                abort_quietly(session).await;
                Err(failure)
            }
        }
    }

    async fn updates_in_tx(
        &self,
        session: &mut ClientSession,
        updates: &[(String, Document)],
    ) -> std::result::Result<usize, TxFailure> {
        let mut written = 0;
        for (issue_id, update) in updates {
            let result = self
                .issues
                .inner()
                .update_one(doc! { "_id": issue_id }, update.clone())
                .session(&mut *session)
                .await?;
            if result.matched_count > 0 {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Apply per-issue `$set` updates in one transaction. Missing issues are
    /// skipped and not counted.
    async fn apply_batch(&self, updates: Vec<(String, Document)>, what: &str) -> Result<usize> {
        if updates.is_empty() {
            return Ok(0);
        }

        let mut session = self.client.start_session().await?;
        let mut attempt = 1;
        loop {
            session.start_transaction().await?;
            let outcome = match self.updates_in_tx(&mut session, &updates).await {
                Ok(written) => self
                    .commit(&mut session)
                    .await
                    .map(|_| written)
                    .map_err(TxFailure::from),
                Err(failure) => {
                    abort_quietly(&mut session).await;
                    Err(failure)
                }
            };
            if let Some(written) = self.settle(outcome, attempt, what)? {
                return Ok(written);
            }
            attempt += 1;
        }
    }
}

/// Query document for `filter`, shaped to hit `zone_status_index` and
/// `geohash_index`
fn issue_query(filter: &IssueFilter) -> Document {
    let mut query = Document::new();
    if let Some(zone) = &filter.zone {
        query.insert("issueZone", zone.as_str());
    }
    if !filter.statuses.is_empty() {
        let statuses: Vec<&str> = filter.statuses.iter().map(|s| s.as_str()).collect();
        query.insert("status", doc! { "$in": statuses });
    }
    if let Some(prefix) = &filter.geohash_prefix {
        query.insert("position.geohash", doc! { "$regex": anchored_prefix(prefix) });
    }
    if let Some(since) = filter.submitted_since {
        query.insert("timestamp", doc! { "$gte": DateTime::from_chrono(since) });
    }
    query
}

/// Anchored regex matching strings that start with `prefix` literally
fn anchored_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    pattern.push('^');
    for c in prefix.chars() {
        if !c.is_ascii_alphanumeric() {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern
}

fn zone_query(zone: Option<&Zone>) -> Document {
    match zone {
        Some(zone) => doc! { "issueZone": zone.as_str() },
        None => Document::new(),
    }
}

async fn abort_quietly(session: &mut ClientSession) {
    if let Err(e) = session.abort_transaction().await {
        debug!(error = %e, "Abort after failed transaction attempt");
    }
}

#[async_trait]
impl IssueRepository for MongoStore {
    async fn insert_issue(&self, issue: Issue) -> Result<()> {
        if self.archived.find_by_id(&issue.id).await?.is_some() {
            return Err(CivicError::InvalidArgument(format!(
                "Issue {} already exists.",
                issue.id
            )));
        }
        let id = issue.id.clone();
        match self.issues.inner().insert_one(IssueDoc::from(issue)).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(CivicError::InvalidArgument(format!(
                "Issue {} already exists.",
                id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_issue(&self, issue_id: &str) -> Result<Option<Issue>> {
        Ok(self.issues.find_by_id(issue_id).await?.map(Issue::from))
    }

    async fn list_active(&self) -> Result<Vec<Issue>> {
        let docs = self.issues.find_many(doc! {}).await?;
        Ok(docs.into_iter().map(Issue::from).collect())
    }

    async fn set_status(&self, issue_id: &str, status: IssueStatus) -> Result<()> {
        let result = self
            .issues
            .update_by_id(issue_id, doc! { "$set": { "status": status.as_str() } })
            .await?;
        if result.matched_count == 0 {
            return Err(CivicError::NotFound(format!("Issue {} not found.", issue_id)));
        }
        Ok(())
    }

    async fn delete_issue(&self, issue_id: &str) -> Result<()> {
        if !self.issues.delete_by_id(issue_id).await? {
            return Err(CivicError::NotFound(format!("Issue {} not found.", issue_id)));
        }
        Ok(())
    }

    async fn archive_issue(
        &self,
        issue_id: &str,
        archiver: Archiver<'_>,
    ) -> Result<ArchivedIssue> {
        let mut session = self.client.start_session().await?;
        let mut attempt = 1;
        loop {
            let outcome = self.archive_once(&mut session, issue_id, archiver).await;
            if let Some(archived) = self.settle(outcome, attempt, "Archive transaction")? {
                return Ok(archived);
            }
            attempt += 1;
        }
    }

    async fn get_archived(&self, issue_id: &str) -> Result<Option<ArchivedIssue>> {
        Ok(self
            .archived
            .find_by_id(issue_id)
            .await?
            .map(ArchivedIssue::from))
    }

    async fn find_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let docs = self
            .issues
            .find_sorted(issue_query(filter), Some(doc! { "timestamp": -1, "_id": 1 }))
            .await?;
        Ok(docs.into_iter().map(Issue::from).collect())
    }

    async fn count_issues(&self, filter: &IssueFilter) -> Result<u64> {
        self.issues.count(issue_query(filter)).await
    }

    async fn list_archived(&self, zone: Option<&Zone>) -> Result<Vec<ArchivedIssue>> {
        let docs = self
            .archived
            .find_sorted(zone_query(zone), Some(doc! { "resolvedAt": -1, "_id": 1 }))
            .await?;
        Ok(docs.into_iter().map(ArchivedIssue::from).collect())
    }

    async fn count_archived(&self, zone: Option<&Zone>) -> Result<u64> {
        self.archived.count(zone_query(zone)).await
    }

    async fn write_severities(&self, updates: &[SeverityUpdate]) -> Result<usize> {
        let updates = updates
            .iter()
            .map(|u| {
                (
                    u.issue_id.clone(),
                    doc! { "$set": { "severity": u.severity.as_str() } },
                )
            })
            .collect();
        self.apply_batch(updates, "Severity batch").await
    }

    async fn write_positions(&self, updates: &[PositionUpdate]) -> Result<usize> {
        let mut docs = Vec::with_capacity(updates.len());
        for u in updates {
            let position = bson::to_bson(&u.position)?;
            docs.push((u.issue_id.clone(), doc! { "$set": { "position": position } }));
        }
        self.apply_batch(docs, "Position batch").await
    }
}

#[async_trait]
impl ProfileRepository for MongoStore {
    async fn put_authority(&self, uid: &str, profile: AuthorityProfile) -> Result<()> {
        self.authorities
            .upsert_by_id(uid, &AuthorityDoc::new(uid, profile))
            .await
    }

    async fn get_authority(&self, uid: &str) -> Result<Option<AuthorityProfile>> {
        Ok(self
            .authorities
            .find_by_id(uid)
            .await?
            .map(AuthorityProfile::from))
    }

    async fn get_reporter(&self, uid: &str) -> Result<Option<ReporterProfile>> {
        Ok(self
            .reporters
            .find_by_id(uid)
            .await?
            .map(ReporterProfile::from))
    }

    async fn list_authorities(&self) -> Result<Vec<AuthorityEntry>> {
        let docs = self
            .authorities
            .find_sorted(doc! {}, Some(doc! { "name": 1, "_id": 1 }))
            .await?;
        Ok(docs
            .into_iter()
            .map(|doc| AuthorityEntry {
                uid: doc.uid.clone(),
                profile: AuthorityProfile::from(doc),
            })
            .collect())
    }
}

#[async_trait]
impl LeaseRepository for MongoStore {
    async fn try_acquire_lease(&self, job: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let now = DateTime::now();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = DateTime::from_millis(now.timestamp_millis().saturating_add(ttl_ms));

        let filter = doc! {
            "_id": job,
            "$or": [
                { "holder": holder },
                { "expires_at": { "$lte": now } },
            ],
        };
        let update = doc! { "$set": { "holder": holder, "expires_at": expires_at } };

        // A live lease held by someone else fails the filter, so the upsert
        // collides with the existing `_id`.
        match self.leases.inner().update_one(filter, update).upsert(true).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn release_lease(&self, job: &str, holder: &str) -> Result<()> {
        self.leases
            .inner()
            .delete_one(doc! { "_id": job, "holder": holder })
            .await?;
        Ok(())
    }
}
