//! Database layer for Civic Watch
//!
//! MongoDB documents for issues, the resolved-issue archive, authority and
//! reporter profiles, identities and job leases.

pub mod mongo;
pub mod schemas;

pub use mongo::{is_duplicate_key, IntoIndexes, MongoClient, MongoCollection};
