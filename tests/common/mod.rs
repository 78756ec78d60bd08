//! Shared fixtures: a `book` entity on the in-memory store and an HTTP harness.
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use crudgate::config::{EntityConfig, EntityRoutesConfig};
use crudgate::{
    audit_log_descriptor, authorization_routes, common_routes_with_ready, entity_routes, resolve, AppState, AuthorizationModel,
    FullConfig, HeaderAuthenticator, MemoryStore, PrincipalKind, RequestMiddleware, ResolvedModel, UserId,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const EDITOR: i64 = 1;
pub const READER: i64 = 2;
pub const ADMIN: i64 = 3;
pub const ARCHIVIST: i64 = 4;

pub fn book_entity() -> EntityConfig {
    serde_json::from_value(json!({
        "name": "book",
        "table": "books",
        "columns": [
            { "name": "id", "type": "integer", "nullable": false, "generated": true },
            { "name": "title", "type": "text", "nullable": false },
            { "name": "pages", "type": "integer" },
            { "name": "published", "type": "boolean", "nullable": false }
        ],
        "create": {
            "title": { "required": true, "min_length": 1 },
            "pages": {},
            "published": { "default": false }
        }
    }))
    .expect("book entity")
}

pub fn book_routes() -> EntityRoutesConfig {
    serde_json::from_value(json!({
        "entity": "book",
        "base_path": "/books",
        "routes": [
            { "route_name": "count", "is_activated": true },
            { "route_name": "list-all", "is_activated": true },
            { "route_name": "read-one", "is_activated": true },
            { "route_name": "create", "is_activated": true, "is_protected": true, "roles": ["editor"] },
            { "route_name": "bulk-create", "is_activated": true, "is_protected": true, "roles": ["editor"] },
            { "route_name": "update", "is_activated": true, "is_protected": true, "roles": ["editor"] },
            { "route_name": "patch", "is_activated": true, "is_protected": true, "is_unlocked": true },
            { "route_name": "delete", "is_activated": true, "is_protected": true, "privileges": ["can_delete"] },
            { "route_name": "bulk-delete", "is_activated": true, "is_protected": true, "roles": [" Admin "] }
        ],
        "authorizations": [
            { "route_name": "delete", "roles": ["admin"] }
        ]
    }))
    .expect("book routes")
}

pub fn book_model() -> ResolvedModel {
    resolve(&FullConfig {
        entities: vec![book_entity()],
        routes: vec![book_routes()],
    })
    .expect("resolve")
}

pub struct TestApp {
    pub store: MemoryStore,
    pub authorization: Arc<AuthorizationModel>,
    pub model: ResolvedModel,
    pub router: Router,
}

async fn boom() -> &'static str {
    panic!("boom")
}

/// Roles in creation order: EDITOR (id 1), ADMIN (2), ARCHIVIST (3).
/// Users: EDITOR holds role EDITOR; READER holds nothing; ADMIN holds role ADMIN;
/// ARCHIVIST holds role ARCHIVIST, which aggregates privilege CAN_DELETE.
pub async fn test_app(audit: bool) -> TestApp {
    let store = MemoryStore::new();
    let sessions = Arc::new(store.clone());
    let authorization = Arc::new(AuthorizationModel::new(sessions.clone(), None));
    seed_grants(&authorization).await;

    let mut model = book_model();
    for routes in authorization_routes(&authorization, &["admin"]).expect("authorization routes") {
        model = model.with_routes(routes);
    }
    let state = AppState::new(sessions.clone(), Arc::new(HeaderAuthenticator), authorization.clone());
    let routes = common_routes_with_ready(state.clone())
        .merge(entity_routes(&state, &model))
        .route("/boom", get(boom));
    let mut middleware = RequestMiddleware::new();
    if audit {
        middleware = middleware.with_audit(audit_log_descriptor(None), sessions);
    }
    TestApp {
        store,
        authorization,
        model,
        router: middleware.apply(routes),
    }
}

async fn seed_grants(m: &AuthorizationModel) {
    let editor = m.create_principal(PrincipalKind::Role, "editor", "writes books").await.expect("role");
    let admin = m.create_principal(PrincipalKind::Role, "admin", "everything").await.expect("role");
    let archivist = m.create_principal(PrincipalKind::Role, "archivist", "").await.expect("role");
    let can_delete = m
        .create_principal(PrincipalKind::Privilege, "can_delete", "")
        .await
        .expect("privilege");
    m.attach_privilege(archivist.id, can_delete.id).await.expect("link");
    m.grant(PrincipalKind::Role, UserId(EDITOR), editor.id).await.expect("grant");
    m.grant(PrincipalKind::Role, UserId(ADMIN), admin.id).await.expect("grant");
    m.grant(PrincipalKind::Role, UserId(ARCHIVIST), archivist.id).await.expect("grant");
}

pub async fn send(router: &Router, method: &str, uri: &str, user: Option<i64>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        req = req.header("X-User-ID", user.to_string());
    }
    let req = match body {
        Some(body) => req
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => req.body(Body::empty()),
    }
    .expect("request");
    let response = router.clone().oneshot(req).await.expect("response");
    let status = response.status();
    (status, read_json(response).await)
}

pub async fn send_raw(router: &Router, method: &str, uri: &str, user: Option<i64>, body: &str) -> (StatusCode, Value) {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        req = req.header("X-User-ID", user.to_string());
    }
    let req = req.body(Body::from(body.to_string())).expect("request");
    let response = router.clone().oneshot(req).await.expect("response");
    let status = response.status();
    (status, read_json(response).await)
}

/// Response body as JSON; `Value::Null` when empty.
pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    }
}
