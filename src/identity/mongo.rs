//! MongoDB-backed identity provider

use async_trait::async_trait;
use bson::doc;

use crate::auth::CallerRole;
use crate::db::schemas::{IdentityDoc, IDENTITY_COLLECTION};
use crate::db::{is_duplicate_key, MongoClient, MongoCollection};
use crate::identity::{new_uid, Identity, IdentityProvider};
use crate::types::{CivicError, Result};

pub struct MongoIdentityProvider {
    identities: MongoCollection<IdentityDoc>,
}

impl MongoIdentityProvider {
    pub async fn connect(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            identities: client.collection(IDENTITY_COLLECTION).await?,
        })
    }
}

#[async_trait]
impl IdentityProvider for MongoIdentityProvider {
    async fn create_identity(&self, email: &str, display_name: &str) -> Result<String> {
        let uid = new_uid();
        let doc = IdentityDoc::new(
            uid.clone(),
            email.to_lowercase(),
            display_name.to_string(),
        );

        match self.identities.inner().insert_one(doc).await {
            Ok(_) => Ok(uid),
            Err(e) if is_duplicate_key(&e) => Err(CivicError::InvalidArgument(format!(
                "An account with email {} already exists.",
                email
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_claims(&self, uid: &str, role: &CallerRole) -> Result<()> {
        let claims = bson::to_bson(role)?;
        let result = self
            .identities
            .update_by_id(uid, doc! { "$set": { "claims": claims } })
            .await?;
        if result.matched_count == 0 {
            return Err(CivicError::NotFound(format!("Identity {} not found.", uid)));
        }
        Ok(())
    }

    async fn delete_identity(&self, uid: &str) -> Result<()> {
        self.identities.delete_by_id(uid).await?;
        Ok(())
    }

    async fn get_identity(&self, uid: &str) -> Result<Option<Identity>> {
        Ok(self.identities.find_by_id(uid).await?.map(|doc| Identity {
            uid: doc.uid,
            email: doc.email,
            display_name: doc.display_name,
            claims: doc.claims,
        }))
    }
}
