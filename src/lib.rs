//! crudgate: configuration-driven CRUD over PostgreSQL with role and privilege
//! authorization per route.

pub mod authorization;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod migration;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;

pub use authorization::{
    AuthorizationEvaluator, AuthorizationModel, Decision, Grants, MembershipResolver, PrincipalKind, UserId,
};
pub use config::{load_from_dir, resolve, EntityDescriptor, EntityRoutes, FullConfig, ResolvedModel};
pub use error::{error_body, AppError, ConfigError};
pub use extractors::{Authenticator, CurrentUser, HeaderAuthenticator};
pub use middleware::{audit_log_descriptor, RequestMiddleware};
pub use migration::apply_migrations;
pub use response::{success_many, success_one};
pub use routes::{
    authorization_routes, common_routes, common_routes_with_ready, entity_router, entity_routes, RouteConfig,
    RouteGuard, RouteName,
};
pub use service::{CrudEngine, EntityInput};
pub use settings::{init_tracing, Settings};
pub use state::AppState;
pub use store::{ensure_database_exists, MemoryStore, PgSessionFactory, SessionFactory};
