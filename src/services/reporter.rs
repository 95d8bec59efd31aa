//! Reporter profile lookup for staff

use tracing::debug;

use crate::auth::{Caller, Operation};
use crate::model::ReporterProfile;
use crate::store::ProfileRepository;
use crate::types::{CivicError, Result};

/// Look up the reporter behind an issue. Reporters are not zone-scoped, so
/// any authority may read any reporter.
pub async fn get_user_details(
    profiles: &dyn ProfileRepository,
    caller: &Caller,
    user_id: &str,
) -> Result<ReporterProfile> {
    Operation::GetUserDetails.check_role(caller)?;

    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(CivicError::InvalidArgument("User ID is required.".into()));
    }

    debug!(user_id, caller = %caller.uid, "Reporter lookup");
    profiles
        .get_reporter(user_id)
        .await?
        .ok_or_else(|| CivicError::NotFound("User not found.".into()))
}
