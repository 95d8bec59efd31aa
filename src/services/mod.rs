//! Operations behind the callable procedures, plus the triage scheduler

pub mod listing;
pub mod provisioning;
pub mod reporter;
pub mod resolve;
pub mod triage;
pub mod verification;

pub use listing::{
    find_nearby_issues, get_issue_counts, list_authorities, list_issues, list_resolved_issues,
    IssueCounts, NEARBY_PRECISION,
};
pub use provisioning::{create_authority, NewAuthority};
pub use reporter::get_user_details;
pub use resolve::{resolve, ResolveOutcome};
pub use triage::{classify, plan_updates, SkipReason, TriageConfig, TriageReport, TriageScheduler};
pub use verification::{
    send_verification_code, CodeDelivery, LogDelivery, OutgoingMail, RelayDelivery,
};
