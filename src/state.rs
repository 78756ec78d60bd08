//! Shared application state for all routes. Built once at startup; read-only afterwards.

use crate::authorization::MembershipResolver;
use crate::extractors::Authenticator;
use crate::store::SessionFactory;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionFactory>,
    pub authenticator: Arc<dyn Authenticator>,
    /// Source of active roles and privileges for route guards.
    pub memberships: Arc<dyn MembershipResolver>,
}

impl AppState {
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        authenticator: Arc<dyn Authenticator>,
        memberships: Arc<dyn MembershipResolver>,
    ) -> Self {
        AppState {
            sessions,
            authenticator,
            memberships,
        }
    }
}
