//! Pre-handler authorization for one declared route.

use crate::authorization::{AuthorizationEvaluator, Decision, MembershipResolver, UserId};
use crate::error::AppError;
use crate::extractors::{Authenticator, CurrentUser};
use crate::routes::RouteConfig;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Runs a route's authorization checks before its handler.
#[derive(Clone)]
pub struct RouteGuard {
    route: Arc<RouteConfig>,
    authenticator: Arc<dyn Authenticator>,
    memberships: Arc<dyn MembershipResolver>,
}

impl RouteGuard {
    pub fn new(
        route: RouteConfig,
        authenticator: Arc<dyn Authenticator>,
        memberships: Arc<dyn MembershipResolver>,
    ) -> Self {
        RouteGuard {
            route: Arc::new(route),
            authenticator,
            memberships,
        }
    }

    pub fn route(&self) -> &RouteConfig {
        &self.route
    }

    /// Identity of the caller when access is granted.
    ///
    /// Unprotected routes always pass (a malformed identity is ignored there).
    /// Protected routes need an identity (401 otherwise); unlocked routes and routes
    /// without role or privilege requirements need nothing more. Otherwise the
    /// user's active grants must satisfy one check (403 otherwise).
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<Option<UserId>, AppError> {
        if !self.route.is_protected {
            return Ok(self.authenticator.authenticate(headers).await.ok().flatten());
        }
        let user = self
            .authenticator
            .authenticate(headers)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))?;
        if self.route.is_unlocked {
            return Ok(Some(user));
        }
        let checks = self.route.authorization_checks();
        if checks.is_empty() {
            return Ok(Some(user));
        }
        let grants = self.memberships.grants(user).await?;
        match AuthorizationEvaluator::evaluate_checks(&checks, &grants) {
            Decision::Allow => Ok(Some(user)),
            Decision::Deny(reason) => {
                tracing::debug!(user = %user, route = %self.route.route_name, %reason, "access denied");
                Err(AppError::Forbidden(format!("Not authorized: {}", reason)))
            }
        }
    }
}

/// Middleware form of [`RouteGuard::authorize`]; stores [`CurrentUser`] for handlers.
pub async fn authorize_request(
    State(guard): State<RouteGuard>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = guard.authorize(req.headers()).await?;
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::Grants;
    use crate::config::RouteConfigEntry;
    use crate::extractors::{HeaderAuthenticator, USER_ID_HEADER};
    use crate::routes::RouteName;
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use std::collections::HashSet;

    /// Every user holds the same fixed grants.
    struct Fixed(Grants);

    #[async_trait]
    impl MembershipResolver for Fixed {
        async fn active_role_names(&self, _user: UserId) -> Result<HashSet<String>, AppError> {
            Ok(self.0.roles.clone())
        }

        async fn active_privilege_names(&self, _user: UserId) -> Result<HashSet<String>, AppError> {
            Ok(self.0.privileges.clone())
        }
    }

    fn guard_for(entry: RouteConfigEntry, grants: Grants) -> RouteGuard {
        RouteGuard::new(
            RouteConfig::new(entry).unwrap(),
            Arc::new(HeaderAuthenticator),
            Arc::new(Fixed(grants)),
        )
    }

    fn as_user(id: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static(id));
        headers
    }

    #[tokio::test]
    async fn unprotected_routes_need_no_identity() {
        let g = guard_for(RouteConfigEntry::new(RouteName::ReadAll), Grants::default());
        assert_eq!(g.authorize(&HeaderMap::new()).await.unwrap(), None);
        assert_eq!(g.authorize(&as_user("bogus")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn protected_routes_require_identity() {
        let g = guard_for(RouteConfigEntry::new(RouteName::ReadAll).protected(), Grants::default());
        let err = g.authorize(&HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert_eq!(g.authorize(&as_user("3")).await.unwrap(), Some(UserId(3)));
    }

    #[tokio::test]
    async fn missing_grant_is_forbidden() {
        let g = guard_for(
            RouteConfigEntry::new(RouteName::Delete).protected().privileges(["can_delete"]),
            Grants::new(["ADMIN"], Vec::<String>::new()),
        );
        let err = g.authorize(&as_user("3")).await.unwrap_err();
        assert_eq!(err.to_string(), "Not authorized: requires the privilege CAN_DELETE");
    }

    #[tokio::test]
    async fn unlocked_routes_skip_grants() {
        let g = guard_for(
            RouteConfigEntry::new(RouteName::Delete).protected().unlocked().roles(["admin"]),
            Grants::default(),
        );
        assert!(g.authorize(&as_user("3")).await.is_ok());
        assert!(g.authorize(&HeaderMap::new()).await.is_err());
    }
}
