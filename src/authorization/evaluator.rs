//! Allow/deny decisions for a route given a user's resolved grants. Pure: no I/O.

use crate::routes::{normalize_name, RouteConfig};
use std::collections::HashSet;

/// A user's active role names and active privilege names (direct and role-aggregated).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Grants {
    pub roles: HashSet<String>,
    pub privileges: HashSet<String>,
}

impl Grants {
    pub fn new<R, P>(roles: R, privileges: P) -> Self
    where
        R: IntoIterator,
        R::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        Grants {
            roles: roles.into_iter().map(|r| normalize_name(r.as_ref())).collect(),
            privileges: privileges.into_iter().map(|p| normalize_name(p.as_ref())).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// One requirement of a route.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthorizationCheck {
    /// Satisfied by holding any of these roles.
    AnyRole(Vec<String>),
    Privilege(String),
}

impl AuthorizationCheck {
    pub fn evaluate(&self, grants: &Grants) -> Decision {
        match self {
            AuthorizationCheck::AnyRole(roles) => {
                if roles.iter().any(|r| grants.roles.contains(r)) {
                    Decision::Allow
                } else {
                    Decision::Deny(format!("requires one of the roles: {}", roles.join(", ")))
                }
            }
            AuthorizationCheck::Privilege(privilege) => {
                if grants.privileges.contains(privilege) {
                    Decision::Allow
                } else {
                    Decision::Deny(format!("requires the privilege {}", privilege))
                }
            }
        }
    }
}

pub struct AuthorizationEvaluator;

impl AuthorizationEvaluator {
    /// Unlocked routes and routes without requirements are allowed; otherwise one
    /// matching grant is enough.
    pub fn evaluate(route: &RouteConfig, grants: &Grants) -> Decision {
        if route.is_unlocked {
            return Decision::Allow;
        }
        Self::evaluate_checks(&route.authorization_checks(), grants)
    }

    /// Runs checks in order and stops at the first one that grants access. When none
    /// does, the reason of the first failed check is reported.
    pub fn evaluate_checks(checks: &[AuthorizationCheck], grants: &Grants) -> Decision {
        let mut first_denial = None;
        for check in checks {
            match check.evaluate(grants) {
                Decision::Allow => return Decision::Allow,
                Decision::Deny(reason) => {
                    first_denial.get_or_insert(reason);
                }
            }
        }
        match first_denial {
            Some(reason) => Decision::Deny(reason),
            None => Decision::Allow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfigEntry;
    use crate::routes::RouteName;

    fn route(entry: RouteConfigEntry) -> RouteConfig {
        RouteConfig::new(entry.protected()).unwrap()
    }

    #[test]
    fn role_does_not_imply_an_unrelated_privilege() {
        let r = route(RouteConfigEntry::new(RouteName::Delete).privileges(["CAN_DELETE"]));
        let admin = Grants::new(["ADMIN"], Vec::<String>::new());
        assert_eq!(
            AuthorizationEvaluator::evaluate(&r, &admin),
            Decision::Deny("requires the privilege CAN_DELETE".into())
        );
        let admin_with_privilege = Grants::new(["ADMIN"], ["CAN_DELETE"]);
        assert!(AuthorizationEvaluator::evaluate(&r, &admin_with_privilege).is_allowed());
    }

    #[test]
    fn routes_without_requirements_allow_any_identity() {
        let r = route(RouteConfigEntry::new(RouteName::ReadAll));
        assert!(AuthorizationEvaluator::evaluate(&r, &Grants::default()).is_allowed());
    }

    #[test]
    fn one_matching_grant_is_enough() {
        let r = route(
            RouteConfigEntry::new(RouteName::Update)
                .roles(["admin"])
                .privileges(["can_update", "can_write"]),
        );
        let writer = Grants::new(Vec::<String>::new(), ["CAN_WRITE"]);
        assert!(AuthorizationEvaluator::evaluate(&r, &writer).is_allowed());
        let nobody = Grants::default();
        assert_eq!(
            AuthorizationEvaluator::evaluate(&r, &nobody),
            Decision::Deny("requires one of the roles: ADMIN".into())
        );
    }

    #[test]
    fn role_names_match_regardless_of_case() {
        let r = route(RouteConfigEntry::new(RouteName::Create).roles(["admin"]));
        let grants = Grants::new([" Admin"], Vec::<String>::new());
        assert!(AuthorizationEvaluator::evaluate(&r, &grants).is_allowed());
    }

    #[test]
    fn unlocked_routes_bypass_requirements() {
        let r = route(RouteConfigEntry::new(RouteName::Create).roles(["admin"]).unlocked());
        assert!(AuthorizationEvaluator::evaluate(&r, &Grants::default()).is_allowed());
    }
}
