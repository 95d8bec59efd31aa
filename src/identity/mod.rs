//! Identity provider
//!
//! Owns login identities and the role claims minted into their tokens.
//! Provisioning and the ops binary are the only writers.

mod memory;
mod mongo;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::CallerRole;
use crate::types::Result;

pub use memory::MemoryIdentityProvider;
pub use mongo::MongoIdentityProvider;

/// A login identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub claims: Option<CallerRole>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an identity and return its uid.
    /// A duplicate email is `InvalidArgument`.
    async fn create_identity(&self, email: &str, display_name: &str) -> Result<String>;

    /// Replace the custom claims of an existing identity. `NotFound` if absent.
    async fn set_claims(&self, uid: &str, role: &CallerRole) -> Result<()>;

    /// Delete an identity. Deleting an absent identity is not an error.
    async fn delete_identity(&self, uid: &str) -> Result<()>;

    async fn get_identity(&self, uid: &str) -> Result<Option<Identity>>;
}

pub(crate) fn new_uid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
