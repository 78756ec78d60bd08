//! Example consumer: a crudgate server over PostgreSQL.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Entities come from `$CRUDGATE_CONFIG_DIR/entities.json` and `routes.json`; the
//! authorization tables are always mounted, restricted to the ADMIN role.
//! Set `CRUDGATE_ADMIN_USER` to grant that role to a user id at startup.

use crudgate::{
    apply_migrations, audit_log_descriptor, authorization_routes, common_routes_with_ready, ensure_database_exists,
    entity_routes, init_tracing, load_from_dir, resolve, AppState, AuthorizationModel, HeaderAuthenticator,
    PgSessionFactory, RequestMiddleware, ResolvedModel, SessionFactory, Settings, UserId,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing("crudgate=info,example_consumer=info");
    let settings = Settings::from_env()?;

    ensure_database_exists(&settings.database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await?;
    let sessions: Arc<dyn SessionFactory> = Arc::new(PgSessionFactory::new(pool.clone()));

    let mut model = match &settings.config_dir {
        Some(dir) => resolve(&load_from_dir(dir).await?)?,
        None => ResolvedModel::default(),
    };
    let schema = Some(settings.schema.as_str());
    let authorization = Arc::new(AuthorizationModel::new(sessions.clone(), schema));
    for routes in authorization_routes(&authorization, &["admin"])? {
        model = model.with_routes(routes);
    }
    let audit = audit_log_descriptor(schema);

    let authorization_tables = authorization.descriptors();
    let tables = model
        .entities
        .iter()
        .map(|e| e.as_ref())
        .chain(authorization_tables.iter())
        .chain(settings.audit.then_some(&audit));
    apply_migrations(&pool, tables).await?;

    if let Some(user) = settings.admin_user {
        authorization.ensure_role_grant(UserId(user), "admin", "bootstrap administrator").await?;
        tracing::info!(user, "admin role granted");
    }

    let state = AppState::new(sessions.clone(), Arc::new(HeaderAuthenticator), authorization);
    let mut middleware = RequestMiddleware::new();
    if settings.audit {
        middleware = middleware.with_audit(audit, sessions);
    }
    let app = middleware.apply(common_routes_with_ready(state.clone()).merge(entity_routes(&state, &model)));

    let listener = TcpListener::bind(&settings.bind).await?;
    tracing::info!("crudgate listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
