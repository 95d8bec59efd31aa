//! Authority and reporter profile records

use serde::{Deserialize, Serialize};

use crate::model::Zone;

/// Profile record mirroring a provisioned authority identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityProfile {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub zone: Zone,
}

/// An authority profile together with the identity it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityEntry {
    pub uid: String,
    #[serde(flatten)]
    pub profile: AuthorityProfile,
}

/// Reporter (citizen) profile, read-only for this service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterProfile {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}
