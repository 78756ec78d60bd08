//! Entity CRUD routes built from resolved route declarations.
//! Each entity gets its own router with a [`CrudEngine`] as state; every activated
//! protected route carries its own [`RouteGuard`] layer.

use crate::authorization::{AuthorizationModel, PrincipalKind};
use crate::config::{EntityDescriptor, EntityRoutes, ResolvedModel};
use crate::error::ConfigError;
use crate::handlers::entity as handlers;
use crate::routes::{authorize_request, default_routes, RouteConfig, RouteGuard, RouteName};
use crate::service::CrudEngine;
use crate::state::AppState;
use axum::{
    middleware,
    routing::{delete, get, patch, post, put, MethodRouter},
    Router,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Handler for a built-in route; `None` for application-defined routes.
fn method_router(name: &RouteName) -> Option<MethodRouter<CrudEngine>> {
    Some(match name {
        RouteName::Count => get(handlers::count),
        RouteName::ReadAll => get(handlers::read_all),
        RouteName::ReadOne => get(handlers::read_one),
        RouteName::Create => post(handlers::create),
        RouteName::BulkCreate => post(handlers::bulk_create),
        RouteName::BulkDelete => delete(handlers::bulk_delete),
        RouteName::Update => put(handlers::update),
        RouteName::Patch => patch(handlers::patch),
        RouteName::Delete => delete(handlers::delete),
        RouteName::Custom(_) => return None,
    })
}

/// Full mount path of a route under the entity base path.
pub fn mount_path(base_path: &str, route: &RouteConfig) -> String {
    let base = base_path.trim_end_matches('/');
    if route.route_name.is_detail() {
        format!("{}{}/:pk", base, route.route_path)
    } else {
        let path = format!("{}{}", base, route.route_path);
        if path.is_empty() {
            "/".to_string()
        } else {
            path
        }
    }
}

/// Router for one entity. Deactivated routes are not mounted; application-defined
/// routes are left for the caller to mount (guard them with [`RouteGuard`]).
pub fn entity_router(state: &AppState, routes: &EntityRoutes) -> Router {
    let engine = CrudEngine::new(routes.entity.clone(), state.sessions.clone());
    let mut by_path: BTreeMap<String, MethodRouter<CrudEngine>> = BTreeMap::new();
    for route in routes.routes.iter().filter(|r| r.is_activated) {
        let Some(mut handler) = method_router(&route.route_name) else {
            tracing::debug!(entity = %routes.entity.name, route = %route.route_name, "custom route not mounted");
            continue;
        };
        if route.is_protected {
            let g = RouteGuard::new(route.clone(), state.authenticator.clone(), state.memberships.clone());
            handler = handler.route_layer(middleware::from_fn_with_state(g, authorize_request));
        }
        let path = mount_path(&routes.base_path, route);
        tracing::debug!(entity = %routes.entity.name, route = %route.route_name, %path, "route mounted");
        let merged = match by_path.remove(&path) {
            Some(existing) => existing.merge(handler),
            None => handler,
        };
        by_path.insert(path, merged);
    }
    by_path
        .into_iter()
        .fold(Router::new(), |router, (path, handler)| router.route(&path, handler))
        .with_state(engine)
}

/// Routers of every entity with declared routes, merged.
pub fn entity_routes(state: &AppState, model: &ResolvedModel) -> Router {
    model
        .routes
        .iter()
        .fold(Router::new(), |router, routes| router.merge(entity_router(state, routes)))
}

/// Default routes for a descriptor, protected and restricted to `roles`.
pub fn protected_entity_routes(
    entity: Arc<EntityDescriptor>,
    base_path: &str,
    roles: &[&str],
) -> Result<EntityRoutes, ConfigError> {
    let routes = default_routes(true)
        .into_iter()
        .map(|entry| RouteConfig::new(entry.roles(roles.iter().copied())))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(EntityRoutes {
        entity,
        base_path: base_path.to_string(),
        routes,
    })
}

/// Admin routes for the authorization tables, mounted at `/<table>`.
pub fn authorization_routes(model: &AuthorizationModel, roles: &[&str]) -> Result<Vec<EntityRoutes>, ConfigError> {
    [
        model.principals(PrincipalKind::Role),
        model.principals(PrincipalKind::Privilege),
        model.role_privilege_links(),
        model.memberships(PrincipalKind::Role),
        model.memberships(PrincipalKind::Privilege),
    ]
    .into_iter()
    .map(|engine| {
        let entity = Arc::new(engine.entity().clone());
        let base = format!("/{}", entity.table_name);
        protected_entity_routes(entity, &base, roles)
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfigEntry;
    use crate::store::MemoryStore;

    fn resolved(entry: RouteConfigEntry) -> RouteConfig {
        RouteConfig::new(entry).unwrap()
    }

    #[test]
    fn detail_routes_take_a_primary_key_segment() {
        assert_eq!(mount_path("/books", &resolved(RouteConfigEntry::new(RouteName::ReadOne))), "/books/:pk");
        assert_eq!(mount_path("/books/", &resolved(RouteConfigEntry::new(RouteName::Patch))), "/books/:pk");
    }

    #[test]
    fn collection_routes_mount_at_base_or_their_name() {
        assert_eq!(mount_path("/books", &resolved(RouteConfigEntry::new(RouteName::ReadAll))), "/books");
        assert_eq!(mount_path("/books", &resolved(RouteConfigEntry::new(RouteName::Count))), "/books/count");
        assert_eq!(
            mount_path("/books", &resolved(RouteConfigEntry::new(RouteName::BulkCreate))),
            "/books/bulk-create"
        );
    }

    #[test]
    fn authorization_tables_get_admin_only_routes() {
        let model = AuthorizationModel::new(Arc::new(MemoryStore::new()), None);
        let routes = authorization_routes(&model, &["admin"]).unwrap();
        let bases: Vec<&str> = routes.iter().map(|r| r.base_path.as_str()).collect();
        assert_eq!(
            bases,
            vec!["/roles", "/privileges", "/role_privileges", "/user_roles", "/user_privileges"]
        );
        assert!(routes
            .iter()
            .flat_map(|r| r.routes.iter())
            .all(|r| r.is_protected && r.roles == vec!["ADMIN".to_string()]));
    }
}
