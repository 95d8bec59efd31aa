//! Active issue document schema

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::lifecycle::IssueStatus;
use crate::model::{GeoPoint, Issue, Position, Severity, Zone};

/// Collection name for active issues
pub const ISSUE_COLLECTION: &str = "issues";

/// Active issue stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct IssueDoc {
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
}

impl From<Issue> for IssueDoc {
    fn from(issue: Issue) -> Self {
        Self {
            id: issue.id,
            issue_type: issue.issue_type,
            status: issue.status,
            issue_zone: issue.issue_zone,
            upvotes: i64::from(issue.upvotes),
            severity: issue.severity,
            location: issue.location,
            position: issue.position,
            image_url: issue.image_url,
            user_id: issue.user_id,
            user_name: issue.user_name,
            timestamp: DateTime::from_chrono(issue.timestamp),
        }
    }
}

impl From<IssueDoc> for Issue {
    fn from(doc: IssueDoc) -> Self {
        Self {
            id: doc.id,
            issue_type: doc.issue_type,
            status: doc.status,
            issue_zone: doc.issue_zone,
            // Counters written by other clients may be negative or oversized
            upvotes: u32::try_from(doc.upvotes.max(0)).unwrap_or(u32::MAX),
            severity: doc.severity,
            location: doc.location,
            position: doc.position,
            image_url: doc.image_url,
            user_id: doc.user_id,
            user_name: doc.user_name,
            timestamp: doc.timestamp.to_chrono(),
        }
    }
}

impl IntoIndexes for IssueDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Dashboard queries: issues in a zone by status
            (
                doc! { "issueZone": 1, "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("zone_status_index".to_string())
                        .build(),
                ),
            ),
            // Proximity lookups by geohash prefix
            (
                doc! { "position.geohash": 1 },
                Some(
                    IndexOptions::builder()
                        .name("geohash_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "timestamp": -1 },
                Some(
                    IndexOptions::builder()
                        .name("timestamp_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_upvotes_clamp() {
        let issue = Issue::submitted("i-1", "Garbage", Zone::parse("BLRW").unwrap(), "u-1");
        let mut doc = IssueDoc::from(issue);
        doc.upvotes = -3;
        assert_eq!(Issue::from(doc).upvotes, 0);
    }

    #[test]
    fn test_bson_shape() {
        let issue = Issue::submitted("i-1", "Garbage", Zone::parse("BLRW").unwrap(), "u-1");
        let bson = bson::to_document(&IssueDoc::from(issue)).unwrap();
        assert_eq!(bson.get_str("_id").unwrap(), "i-1");
        assert_eq!(bson.get_str("issueZone").unwrap(), "BLRW");
        assert_eq!(bson.get_str("status").unwrap(), "Submitted");
        assert!(bson.get_datetime("timestamp").is_ok());
        assert!(!bson.contains_key("position"));
    }
}
