//! Roles, privileges, user memberships and the route authorization decision.

mod evaluator;
mod membership;
mod model;

pub use evaluator::{AuthorizationCheck, AuthorizationEvaluator, Decision, Grants};
pub use membership::{MembershipResolver, UserId};
pub use model::{
    membership_descriptor, principal_descriptor, role_privilege_descriptor, AuthorizationModel, Membership,
    Principal, PrincipalKind, RolePrivilege,
};
