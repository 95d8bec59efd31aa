//! Domain records shared by the store, the services and the callable surface

mod issue;
mod profile;
mod zone;

pub use issue::{
    ArchivedIssue, GeoPoint, Issue, Position, Severity, DEFAULT_RESOLUTION_DETAILS,
};
pub use profile::{AuthorityEntry, AuthorityProfile, ReporterProfile};
pub use zone::Zone;
