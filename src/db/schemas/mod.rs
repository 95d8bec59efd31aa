//! Database schemas for Civic Watch

mod archived_issue;
mod identity;
mod issue;
mod profile;

pub use archived_issue::{ArchivedIssueDoc, ARCHIVED_ISSUE_COLLECTION};
pub use identity::{IdentityDoc, LeaseDoc, IDENTITY_COLLECTION, LEASE_COLLECTION};
pub use issue::{IssueDoc, ISSUE_COLLECTION};
pub use profile::{
    AuthorityDoc, ReporterDoc, AUTHORITY_COLLECTION, REPORTER_COLLECTION,
};
