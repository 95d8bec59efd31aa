//! Authority and reporter profile schemas

use bson::Document;
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::model::{AuthorityProfile, ReporterProfile, Zone};

/// Collection name for authority profiles
pub const AUTHORITY_COLLECTION: &str = "authorities";

/// Collection name for reporter profiles (written by the mobile sign-up flow)
pub const REPORTER_COLLECTION: &str = "users";

/// Authority profile, keyed by identity uid
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthorityDoc {
    #[serde(rename = "_id")]
    pub uid: String,
    pub name: String,
    pub email: String,
    /// Stored as an explicit null when absent
    pub phone: Option<String>,
    pub zone: Zone,
}

impl AuthorityDoc {
    pub fn new(uid: &str, profile: AuthorityProfile) -> Self {
        Self {
            uid: uid.to_string(),
            name: profile.name,
            email: profile.email,
            phone: profile.phone,
            zone: profile.zone,
        }
    }
}

impl From<AuthorityDoc> for AuthorityProfile {
    fn from(doc: AuthorityDoc) -> Self {
        Self {
            name: doc.name,
            email: doc.email,
            phone: doc.phone,
            zone: doc.zone,
        }
    }
}

impl IntoIndexes for AuthorityDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![]
    }
}

/// Reporter profile
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReporterDoc {
    #[serde(rename = "_id")]
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl From<ReporterDoc> for ReporterProfile {
    fn from(doc: ReporterDoc) -> Self {
        Self {
            name: doc.name,
            email: doc.email,
            phone: doc.phone,
            address: doc.address,
        }
    }
}

impl IntoIndexes for ReporterDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_phone_is_null() {
        let doc = AuthorityDoc::new(
            "uid-1",
            AuthorityProfile {
                name: "Asha".into(),
                email: "a@x.com".into(),
                phone: None,
                zone: Zone::parse("BLRE").unwrap(),
            },
        );
        let bson = bson::to_document(&doc).unwrap();
        assert_eq!(bson.get("phone"), Some(&bson::Bson::Null));
        assert_eq!(bson.get_str("_id").unwrap(), "uid-1");
    }
}
