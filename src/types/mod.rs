//! Shared types for Civic Watch

pub mod error;

pub use error::{CivicError, ErrorCode, Result, INTERNAL_MESSAGE};
