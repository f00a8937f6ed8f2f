use serde::{Deserialize, Serialize};

use faregate_core::UserId;

/// Role granted to a caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
}

/// The identity the command and query cores consume.
///
/// How it is established (token verification, mesh header injection, ...) is a
/// transport concern; the cores only see this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatedIdentity {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
}

impl AuthenticatedIdentity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
