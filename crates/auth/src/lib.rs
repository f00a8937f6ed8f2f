//! Caller identity: roles, claims, and HS256 bearer-token validation.

pub mod claims;
pub mod identity;

pub use claims::{Claims, Hs256JwtValidator, TokenValidationError, issue_token};
pub use identity::{AuthenticatedIdentity, Role};
