//! Authority provisioning
//!
//! Creating an authority touches two systems that share no transaction: the
//! identity provider (identity, then claims) and the profile store. If
//! anything after the identity is created fails, the identity is deleted
//! again so no half-provisioned login is left behind.

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::auth::{Caller, CallerRole, Operation};
use crate::identity::IdentityProvider;
use crate::model::{AuthorityProfile, Zone};
use crate::store::ProfileRepository;
use crate::types::{CivicError, Result};

/// Caller-supplied fields for a new authority
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAuthority {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
}

fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl NewAuthority {
    /// Validate into a profile
    pub fn into_profile(self) -> Result<AuthorityProfile> {
        let (Some(name), Some(email), Some(zone)) = (
            required(self.name.as_deref()),
            required(self.email.as_deref()),
            required(self.zone.as_deref()),
        ) else {
            return Err(CivicError::InvalidArgument(
                "Missing required fields: name, email, and zone are required.".into(),
            ));
        };

        if !email.contains('@') {
            return Err(CivicError::InvalidArgument(format!(
                "'{}' is not a valid email address.",
                email
            )));
        }

        Ok(AuthorityProfile {
            name: name.to_string(),
            email: email.to_string(),
            phone: required(self.phone.as_deref()).map(str::to_string),
            zone: Zone::parse(zone)?,
        })
    }
}

/// Provision a zonal authority. Superadmin only.
pub async fn create_authority(
    identities: &dyn IdentityProvider,
    profiles: &dyn ProfileRepository,
    caller: &Caller,
    request: NewAuthority,
) -> Result<String> {
    Operation::CreateAuthority.check_role(caller)?;
    let profile = request.into_profile()?;

    let uid = identities
        .create_identity(&profile.email, &profile.name)
        .await
        .map_err(|e| match e {
            CivicError::InvalidArgument(_) => e,
            other => CivicError::Internal(format!("Failed to create identity: {}", other)),
        })?;

    let role = CallerRole::Authority {
        zone: profile.zone.clone(),
    };
    let name = profile.name.clone();
    let email = profile.email.clone();
    let zone = profile.zone.clone();

    let finished = match identities.set_claims(&uid, &role).await {
        Ok(()) => profiles.put_authority(&uid, profile).await,
        Err(e) => Err(e),
    };

    if let Err(e) = finished {
        warn!(uid = %uid, error = %e, "Authority provisioning failed, removing identity");
        if let Err(rollback) = identities.delete_identity(&uid).await {
            error!(
                uid = %uid,
                error = %rollback,
                "Rollback failed; identity is orphaned and needs manual cleanup"
            );
        }
        return Err(CivicError::Internal(format!(
            "Failed to provision authority {}: {}",
            uid, e
        )));
    }

    info!(uid = %uid, zone = %zone, created_by = %caller.uid, "Authority provisioned");
    Ok(format!("Successfully created authority {} ({}).", name, email))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MemoryIdentityProvider;
    use crate::store::MemoryStore;

    fn asha() -> NewAuthority {
        NewAuthority {
            name: Some("Asha".into()),
            email: Some("a@x.com".into()),
            phone: None,
            zone: Some("BLRE".into()),
        }
    }

    #[tokio::test]
    async fn test_provision_sets_claims_and_profile() {
        let identities = MemoryIdentityProvider::new();
        let store = MemoryStore::default();
        let admin = Caller::superadmin("root");

        let msg = create_authority(&identities, &store, &admin, asha()).await.unwrap();
        assert_eq!(msg, "Successfully created authority Asha (a@x.com).");

        let identity = identities.find_by_email("a@x.com").unwrap();
        assert_eq!(
            identity.claims,
            Some(CallerRole::Authority {
                zone: Zone::parse("BLRE").unwrap()
            })
        );

        let profile = store.get_authority(&identity.uid).await.unwrap().unwrap();
        assert_eq!(profile.phone, None);
        assert_eq!(profile.zone.as_str(), "BLRE");
    }

    #[tokio::test]
    async fn test_authority_cannot_provision() {
        let identities = MemoryIdentityProvider::new();
        let store = MemoryStore::default();
        let caller = Caller::authority("auth-n", Zone::parse("BLRN").unwrap());

        let err = create_authority(&identities, &store, &caller, asha())
            .await
            .unwrap_err();
        assert!(matches!(err, CivicError::PermissionDenied(_)));
        assert!(identities.is_empty());
    }

    #[tokio::test]
    async fn test_validation() {
        let identities = MemoryIdentityProvider::new();
        let store = MemoryStore::default();
        let admin = Caller::superadmin("root");

        let mut missing_zone = asha();
        missing_zone.zone = Some("  ".into());
        let mut bad_email = asha();
        bad_email.email = Some("not-an-email".into());

        for request in [missing_zone, bad_email, NewAuthority::default()] {
            let err = create_authority(&identities, &store, &admin, request)
                .await
                .unwrap_err();
            assert!(matches!(err, CivicError::InvalidArgument(_)));
        }
        assert!(identities.is_empty());
    }

    #[test]
    fn test_empty_phone_becomes_none() {
        let mut request = asha();
        request.phone = Some(String::new());
        assert_eq!(request.into_profile().unwrap().phone, None);
    }

    #[tokio::test]
    async fn test_claims_failure_rolls_back_identity() {
        let identities = MemoryIdentityProvider::new();
        identities.fail_claims(true);
        let store = MemoryStore::default();
        let admin = Caller::superadmin("root");

        let err = create_authority(&identities, &store, &admin, asha())
            .await
            .unwrap_err();
        assert!(matches!(err, CivicError::Internal(_)));
        assert!(identities.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let identities = MemoryIdentityProvider::new();
        let store = MemoryStore::default();
        let admin = Caller::superadmin("root");

        create_authority(&identities, &store, &admin, asha()).await.unwrap();
        let err = create_authority(&identities, &store, &admin, asha())
            .await
            .unwrap_err();
        assert!(matches!(err, CivicError::InvalidArgument(_)));
        assert_eq!(identities.len(), 1);
    }
}
