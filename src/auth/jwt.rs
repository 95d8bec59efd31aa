//! JWT token handling for callers of the callable surface
//!
//! Tokens are HS256-signed and carry the caller's uid plus the raw
//! `role`/`zone` claims. Conversion into a typed [`Caller`] happens in
//! [`Claims::caller`], never downstream.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::{Caller, CallerRole};
use crate::types::{CivicError, Result};

/// Payload stored in JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Identity uid
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl Claims {
    /// Typed caller for these claims
    pub fn caller(&self) -> Result<Caller> {
        if self.sub.trim().is_empty() {
            return Err(CivicError::Unauthenticated("Token carries no subject".into()));
        }
        let role = CallerRole::from_claims(self.role.as_deref(), self.zone.as_deref())?;
        Ok(Caller {
            uid: self.sub.clone(),
            role,
        })
    }
}

/// Input for creating a new token
#[derive(Debug, Clone)]
pub struct TokenInput {
    pub uid: String,
    pub email: Option<String>,
    pub role: Option<CallerRole>,
}

/// Result of token validation
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

impl TokenValidationResult {
    pub fn valid(claims: Claims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a new JWT validator
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self> {
        if secret.is_empty() {
            return Err(CivicError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < 32 {
            return Err(CivicError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Create a validator for dev mode (allows empty secret)
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            expiry_seconds: 3600,
        }
    }

    /// Generate a signed token
    pub fn generate_token(&self, input: TokenInput) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| CivicError::Auth(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            sub: input.uid,
            email: input.email,
            role: input.role.as_ref().map(|r| r.role_claim().to_string()),
            zone: input
                .role
                .as_ref()
                .and_then(|r| r.zone_claim())
                .map(|z| z.to_string()),
            iat: now,
            exp: now + self.expiry_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| CivicError::Auth(format!("Failed to generate token: {}", e)))
    }

    /// Verify and decode a JWT token
    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        let validation = Validation::default();

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(token_data) => TokenValidationResult::valid(token_data.claims),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let error_msg = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidToken => "Invalid token",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    _ => "Token validation failed",
                };
                TokenValidationResult::invalid(error_msg)
            }
        }
    }

    /// Resolve an `Authorization` header into a typed caller
    pub fn authenticate(&self, auth_header: Option<&str>) -> Result<Caller> {
        let token = extract_token_from_header(auth_header).ok_or_else(|| {
            CivicError::Unauthenticated("The request carries no bearer token.".into())
        })?;

        let result = self.verify_token(token);
        match result.claims {
            Some(claims) if result.valid => claims.caller(),
            _ => Err(CivicError::Unauthenticated(
                result.error.unwrap_or_else(|| "Invalid token".into()),
            )),
        }
    }
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format (scheme matched case-insensitively) and
/// raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some((scheme, token)) = header.split_once(' ') {
        if scheme.eq_ignore_ascii_case("bearer") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token);
            }
        }
    }

    // Also support raw token (for flexibility)
    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}
