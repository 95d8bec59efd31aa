//! Issue lifecycle: statuses and the transitions between them

mod status;
mod transitions;

pub use status::{validate_direct_target, IssueStatus};
pub(crate) use transitions::require_issue_id;
pub use transitions::{reject, set_status};
