//! Resolved-issue archive document schema
//!
//! Append-only: written once inside the resolve transaction and never
//! updated or deleted.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::IssueDoc;
use crate::lifecycle::IssueStatus;
use crate::model::{ArchivedIssue, GeoPoint, Issue, Position, Severity, Zone};

/// Collection name for the archive
pub const ARCHIVED_ISSUE_COLLECTION: &str = "resolved_issues";

/// Archived issue stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedIssueDoc {
    /// Same id as the active issue it replaces
    #[serde(rename = "_id")]
    pub id: String,
    pub issue_type: String,
    pub status: IssueStatus,
    pub issue_zone: Zone,
    #[serde(default)]
    pub upvotes: i64,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default)]
    pub image_url: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    pub timestamp: DateTime,
    pub resolved_at: DateTime,
    pub resolved_by: String,
    pub resolution_details: String,
}

impl From<ArchivedIssue> for ArchivedIssueDoc {
    fn from(archived: ArchivedIssue) -> Self {
        let issue = IssueDoc::from(archived.issue);
        Self {
            id: issue.id,
            issue_type: issue.issue_type,
            status: issue.status,
            issue_zone: issue.issue_zone,
            upvotes: issue.upvotes,
            severity: issue.severity,
            location: issue.location,
            position: issue.position,
            image_url: issue.image_url,
            user_id: issue.user_id,
            user_name: issue.user_name,
            timestamp: issue.timestamp,
            resolved_at: DateTime::from_chrono(archived.resolved_at),
            resolved_by: archived.resolved_by,
            resolution_details: archived.resolution_details,
        }
    }
}

impl From<ArchivedIssueDoc> for ArchivedIssue {
    fn from(doc: ArchivedIssueDoc) -> Self {
        let issue = Issue::from(IssueDoc {
            id: doc.id,
            issue_type: doc.issue_type,
            status: doc.status,
            issue_zone: doc.issue_zone,
            upvotes: doc.upvotes,
            severity: doc.severity,
            location: doc.location,
            position: doc.position,
            image_url: doc.image_url,
            user_id: doc.user_id,
            user_name: doc.user_name,
            timestamp: doc.timestamp,
        });
        Self {
            issue,
            resolved_at: doc.resolved_at.to_chrono(),
            resolved_by: doc.resolved_by,
            resolution_details: doc.resolution_details,
        }
    }
}

impl IntoIndexes for ArchivedIssueDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "issueZone": 1, "resolvedAt": -1 },
            Some(
                IndexOptions::builder()
                    .name("zone_resolved_at_index".to_string())
                    .build(),
            ),
        )]
    }
}
