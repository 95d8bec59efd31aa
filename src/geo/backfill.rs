//! Position indexing for issues
//!
//! New issues are indexed as they are stored; [`backfill`] catches up
//! existing ones. Both derive `position` purely from `location`, so re-running
//! yields the same hashes.

use serde::Serialize;
use tracing::{info, warn};

use crate::geo::geohash::{in_range, position_for};
use crate::model::{GeoPoint, Issue};
use crate::store::{IssueRepository, PositionUpdate};
use crate::types::Result;

/// Outcome of a backfill pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub scanned: usize,
    pub indexed: usize,
    pub skipped: usize,
}

/// Location worth indexing. Missing and `(0, 0)` locations count as absent;
/// out-of-range ones are logged and ignored.
fn indexable(issue: &Issue) -> Option<GeoPoint> {
    let location = issue.location?;
    if location.latitude == 0.0 && location.longitude == 0.0 {
        return None;
    }
    if !in_range(location.latitude, location.longitude) {
        warn!(
            issue_id = %issue.id,
            latitude = location.latitude,
            longitude = location.longitude,
            "Skipping issue with out-of-range location"
        );
        return None;
    }
    Some(location)
}

/// Derive `position` for a single issue before it is stored.
/// Returns whether a position was set.
pub fn index_issue(issue: &mut Issue) -> Result<bool> {
    match indexable(issue) {
        Some(location) => {
            issue.position = Some(position_for(location)?);
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Index a new issue and store it
pub async fn insert_indexed(issues: &dyn IssueRepository, mut issue: Issue) -> Result<()> {
    index_issue(&mut issue)?;
    issues.insert_issue(issue).await
}

/// Recompute `position` for every active issue with a usable location and
/// write them as one batch.
pub async fn backfill(issues: &dyn IssueRepository) -> Result<BackfillReport> {
    let active = issues.list_active().await?;

    let mut updates = Vec::new();
    for issue in &active {
        if let Some(location) = indexable(issue) {
            updates.push(PositionUpdate {
                issue_id: issue.id.clone(),
                position: position_for(location)?,
            });
        }
    }

    let indexed = if updates.is_empty() {
        0
    } else {
        issues.write_positions(&updates).await?
    };

    let report = BackfillReport {
        scanned: active.len(),
        indexed,
        skipped: active.len() - updates.len(),
    };
    info!(
        scanned = report.scanned,
        indexed = report.indexed,
        skipped = report.skipped,
        "Geohash backfill complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Zone;
    use crate::store::MemoryStore;

    fn issue(id: &str) -> Issue {
        Issue::submitted(id, "Drainage", Zone::parse("BLRC").unwrap(), "citizen-1")
    }

    #[tokio::test]
    async fn test_backfill_is_idempotent() {
        let store = MemoryStore::default();
        store
            .insert_issue(issue("a").with_location(12.9716, 77.5946))
            .await
            .unwrap();
        store.insert_issue(issue("b")).await.unwrap();
        store
            .insert_issue(issue("c").with_location(0.0, 0.0))
            .await
            .unwrap();
        store
            .insert_issue(issue("d").with_location(123.0, 77.0))
            .await
            .unwrap();

        let first = backfill(&store).await.unwrap();
        assert_eq!(
            first,
            BackfillReport {
                scanned: 4,
                indexed: 1,
                skipped: 3
            }
        );
        let hash = store.get_issue("a").await.unwrap().unwrap().position;

        let second = backfill(&store).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.get_issue("a").await.unwrap().unwrap().position, hash);
        assert!(store.get_issue("b").await.unwrap().unwrap().position.is_none());
    }

    #[tokio::test]
    async fn test_insert_indexed() {
        let store = MemoryStore::default();
        insert_indexed(&store, issue("a").with_location(12.9716, 77.5946))
            .await
            .unwrap();
        assert!(store.get_issue("a").await.unwrap().unwrap().position.is_some());
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = MemoryStore::default();
        assert_eq!(backfill(&store).await.unwrap(), BackfillReport::default());
    }

    #[test]
    fn test_index_issue() {
        let mut located = issue("a").with_location(12.9716, 77.5946);
        assert!(index_issue(&mut located).unwrap());
        assert_eq!(located.position.unwrap().geohash.len(), 10);

        let mut unlocated = issue("b");
        assert!(!index_issue(&mut unlocated).unwrap());
        assert!(unlocated.position.is_none());
    }
}
