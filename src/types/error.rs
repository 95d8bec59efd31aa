//! Error types for Civic Watch
//!
//! Every operation returns [`CivicError`]. The callable surface collapses the
//! variants into the public codes `PERMISSION_DENIED`, `INVALID_ARGUMENT`,
//! `NOT_FOUND`, `UNAUTHENTICATED` and `INTERNAL`; anything internal is logged
//! server-side and reaches the caller only as a generic message.

use hyper::StatusCode;

/// Generic message returned for every internal failure
pub const INTERNAL_MESSAGE: &str = "Internal error.";

/// Main error type for Civic Watch operations
#[derive(Debug, thiserror::Error)]
pub enum CivicError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Optimistic transaction conflict. Retried by the store, never surfaced
    /// with its own code.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Public error code as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    PermissionDenied,
    InvalidArgument,
    NotFound,
    Unauthenticated,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::InvalidArgument => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl CivicError {
    /// Public code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Unauthenticated(_) => ErrorCode::Unauthenticated,
            Self::Conflict(_)
            | Self::Database(_)
            | Self::Config(_)
            | Self::Auth(_)
            | Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        self.code().status_code()
    }

    /// Message safe to hand back to a caller.
    ///
    /// Authorization, validation and lookup failures are surfaced verbatim;
    /// everything else becomes [`INTERNAL_MESSAGE`].
    pub fn public_message(&self) -> String {
        match self {
            Self::PermissionDenied(msg)
            | Self::InvalidArgument(msg)
            | Self::NotFound(msg)
            | Self::Unauthenticated(msg) => msg.clone(),
            _ => INTERNAL_MESSAGE.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<std::io::Error> for CivicError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<mongodb::error::Error> for CivicError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for CivicError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Database(format!("BSON encode failed: {}", err))
    }
}

/// Result type alias for Civic Watch operations
pub type Result<T> = std::result::Result<T, CivicError>;
