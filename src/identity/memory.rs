//! In-memory identity provider for dev mode and tests

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::auth::CallerRole;
use crate::identity::{new_uid, Identity, IdentityProvider};
use crate::types::{CivicError, Result};

#[derive(Default)]
pub struct MemoryIdentityProvider {
    identities: DashMap<String, Identity>,
    fail_claims: AtomicBool,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set_claims` fail. Used to exercise rollback.
    pub fn fail_claims(&self, fail: bool) {
        self.fail_claims.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn find_by_email(&self, email: &str) -> Option<Identity> {
        self.identities
            .iter()
            .find(|entry| entry.email.eq_ignore_ascii_case(email))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn create_identity(&self, email: &str, display_name: &str) -> Result<String> {
        if self.find_by_email(email).is_some() {
            return Err(CivicError::InvalidArgument(format!(
                "An account with email {} already exists.",
                email
            )));
        }

        let uid = new_uid();
        self.identities.insert(
            uid.clone(),
            Identity {
                uid: uid.clone(),
                email: email.to_string(),
                display_name: display_name.to_string(),
                claims: None,
            },
        );
        Ok(uid)
    }

    async fn set_claims(&self, uid: &str, role: &CallerRole) -> Result<()> {
        if self.fail_claims.load(Ordering::SeqCst) {
            return Err(CivicError::Internal("claims backend unavailable".into()));
        }
        let mut identity = self
            .identities
            .get_mut(uid)
            .ok_or_else(|| CivicError::NotFound(format!("Identity {} not found.", uid)))?;
        identity.claims = Some(role.clone());
        Ok(())
    }

    async fn delete_identity(&self, uid: &str) -> Result<()> {
        self.identities.remove(uid);
        Ok(())
    }

    async fn get_identity(&self, uid: &str) -> Result<Option<Identity>> {
        Ok(self.identities.get(uid).map(|entry| entry.value().clone()))
    }
}
