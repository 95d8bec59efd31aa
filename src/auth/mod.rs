//! Authentication and authorization for Civic Watch
//!
//! Provides:
//! - JWT token generation and validation
//! - Typed caller roles (`Authority { zone }` / `SuperAdmin`)
//! - The per-operation authorization guard

pub mod claims;
pub mod guard;
pub mod jwt;

pub use claims::{Caller, CallerRole, RoleKind};
pub use guard::{authorize, Operation, Requirement, STAFF, SUPERADMIN_ONLY};
pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput, TokenValidationResult};
