//! Issue records: active and archived

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::lifecycle::IssueStatus;
use crate::model::Zone;

/// Default resolution text when the resolver supplies none
pub const DEFAULT_RESOLUTION_DETAILS: &str = "No details provided.";

/// Relative severity, recomputed periodically from vote share
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Combined geospatial field: geohash index plus the coordinates it encodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub geohash: String,
    pub geopoint: GeoPoint,
}

/// Active issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: String,
    pub issue_type: String,
    pub status: IssueStatus,
    pub issue_zone: Zone,
    #[serde(default)]
    pub upvotes: u32,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub image_url: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
}

impl Issue {
    /// A freshly reported issue
    pub fn submitted(
        id: impl Into<String>,
        issue_type: impl Into<String>,
        issue_zone: Zone,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            issue_type: issue_type.into(),
            status: IssueStatus::Submitted,
            issue_zone,
            upvotes: 0,
            severity: Severity::Low,
            location: None,
            position: None,
            image_url: String::new(),
            user_id: user_id.into(),
            user_name: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.location = Some(GeoPoint::new(latitude, longitude));
        self
    }

    pub fn with_upvotes(mut self, upvotes: u32) -> Self {
        self.upvotes = upvotes;
        self
    }

    pub fn with_reporter_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = name.into();
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = url.into();
        self
    }
}

/// Immutable snapshot of an issue at resolution time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedIssue {
    #[serde(flatten)]
    pub issue: Issue,
    pub resolved_at: DateTime<Utc>,
    pub resolved_by: String,
    pub resolution_details: String,
}

impl ArchivedIssue {
    /// Snapshot `issue` as resolved by `resolved_by`.
    ///
    /// Blank notes fall back to [`DEFAULT_RESOLUTION_DETAILS`].
    pub fn snapshot(
        mut issue: Issue,
        resolved_by: impl Into<String>,
        notes: Option<&str>,
        resolved_at: DateTime<Utc>,
    ) -> Self {
        issue.status = IssueStatus::Resolved;
        let resolution_details = notes
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_RESOLUTION_DETAILS)
            .to_string();

        Self {
            issue,
            resolved_at,
            resolved_by: resolved_by.into(),
            resolution_details,
        }
    }

    pub fn id(&self) -> &str {
        &self.issue.id
    }
}
