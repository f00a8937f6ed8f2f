//! JWT claims model and HS256 validation.
//!
//! Signature verification and claim-window checks both happen here; the
//! transport layer only extracts the bearer token and hands it over.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use faregate_core::UserId;

use crate::identity::{AuthenticatedIdentity, Role};

/// Claims carried by a Faregate bearer token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user identifier.
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub iss: String,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
    /// Expiration, seconds since epoch.
    pub exp: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("token issuer mismatch")]
    WrongIssuer,

    #[error("token is malformed or has an invalid signature")]
    Invalid,
}

/// Deterministically validate decoded claims against `now`.
///
/// `jsonwebtoken` already enforces `exp`/`iss`; this re-checks the window so
/// the rule is testable without minting real tokens.
pub fn validate_claims(
    claims: &Claims,
    issuer: &str,
    now: DateTime<Utc>,
) -> Result<(), TokenValidationError> {
    if claims.iss != issuer {
        return Err(TokenValidationError::WrongIssuer);
    }
    if now.timestamp() < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now.timestamp() >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

/// HS256 bearer-token validator.
pub struct Hs256JwtValidator {
    decoding: DecodingKey,
    issuer: String,
}

impl Hs256JwtValidator {
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
        }
    }

    /// Verify a token and produce the caller identity.
    pub fn validate(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthenticatedIdentity, TokenValidationError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = false; // window checked below against `now`

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| TokenValidationError::Invalid)?;

        validate_claims(&data.claims, &self.issuer, now)?;

        Ok(AuthenticatedIdentity {
            user_id: UserId::new(data.claims.sub),
            email: data.claims.email,
            role: data.claims.role,
        })
    }
}

/// Mint an HS256 token for an identity (service-to-service calls and tests).
pub fn issue_token(
    secret: &[u8],
    issuer: &str,
    identity: &AuthenticatedIdentity,
    ttl: Duration,
) -> Result<String, TokenValidationError> {
    let now = Utc::now();
    let claims = Claims {
        sub: identity.user_id.to_string(),
        email: identity.email.clone(),
        role: identity.role,
        iss: issuer.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|_| TokenValidationError::Invalid)
}
