//! Civic Watch - issue lifecycle backend
//!
//! Citizens report civic issues; zone-scoped authorities move them through a
//! lifecycle until they are resolved (archived) or rejected (deleted).
//!
//! ## Components
//!
//! - **Auth**: JWT bearer tokens, typed caller roles, the authorization guard
//! - **Lifecycle**: issue statuses and direct status transitions
//! - **Services**: resolve-and-archive, provisioning, reporter lookup,
//!   verification codes, and the periodic severity triage
//! - **Geo**: geohash indexing and backfill
//! - **Store**: repository traits with MongoDB and in-memory backends
//! - **Server**: the callable HTTP surface

pub mod auth;
pub mod config;
pub mod db;
pub mod geo;
pub mod identity;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod routes;
pub mod server;
pub mod services;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{CivicError, Result};
