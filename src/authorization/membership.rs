//! Membership interface consumed by route guards: which grants does a user hold?

use crate::authorization::Grants;
use crate::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Identifier of an (externally managed) user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Suspended memberships and inactive roles/privileges are never reported.
#[async_trait]
pub trait MembershipResolver: Send + Sync {
    async fn active_role_names(&self, user: UserId) -> Result<HashSet<String>, AppError>;

    /// Privileges granted directly plus those aggregated by every active role.
    async fn active_privilege_names(&self, user: UserId) -> Result<HashSet<String>, AppError>;

    async fn grants(&self, user: UserId) -> Result<Grants, AppError> {
        let roles = self.active_role_names(user).await?;
        let privileges = self.active_privilege_names(user).await?;
        Ok(Grants::new(roles, privileges))
    }
}
