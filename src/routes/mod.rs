//! HTTP routes for Civic Watch

pub mod callable;
pub mod health;

pub use callable::{dispatch, handle_callable};
pub use health::{health_check, version_info};
