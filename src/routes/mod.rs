//! Route declarations, guards and the axum routers built from them.

mod common;
mod entity;
mod guard;
mod route_config;

pub use common::{common_routes, common_routes_with_ready};
pub use entity::{authorization_routes, entity_router, entity_routes, mount_path, protected_entity_routes};
pub use guard::{authorize_request, RouteGuard};
pub use route_config::{
    default_routes, normalize_name, RouteConfig, RouteName, DEFAULT_ROUTE_NAMES, DETAIL_ROUTES, NO_DETAIL_ROUTES,
};
