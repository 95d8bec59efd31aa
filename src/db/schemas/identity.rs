//! Identity and job-lease schemas

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::CallerRole;
use crate::db::mongo::IntoIndexes;

/// Collection name for identities
pub const IDENTITY_COLLECTION: &str = "identities";

/// Collection name for job leases
pub const LEASE_COLLECTION: &str = "job_leases";

/// Identity record managed by the identity provider
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDoc {
    #[serde(rename = "_id")]
    pub uid: String,
    pub email: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<CallerRole>,
    pub created_at: DateTime,
}

impl IdentityDoc {
    pub fn new(uid: String, email: String, display_name: String) -> Self {
        Self {
            uid,
            email,
            display_name,
            claims: None,
            created_at: DateTime::now(),
        }
    }
}

impl IntoIndexes for IdentityDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "email": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("email_unique".to_string())
                    .build(),
            ),
        )]
    }
}

/// Lease held by one node for a periodic job
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LeaseDoc {
    /// Job name
    #[serde(rename = "_id")]
    pub job: String,
    pub holder: String,
    pub expires_at: DateTime,
}

impl IntoIndexes for LeaseDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![]
    }
}
