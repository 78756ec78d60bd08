//! Outermost request middleware: panic translation, request logging and audit.

mod audit;

pub use audit::{audit_log_descriptor, AuditLogger, AuditRecord, AUDIT_TABLE};

use crate::config::EntityDescriptor;
use crate::error::{AppError, ErrorDescription};
use crate::store::SessionFactory;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use chrono::Utc;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer};

/// Default cap on request bodies.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Wraps a whole router. Errors are already translated by [`AppError`]'s
/// `IntoResponse`; this layer adds panic translation and, when configured, one
/// audit record per request.
#[derive(Clone)]
pub struct RequestMiddleware {
    audit: Option<AuditLogger>,
    body_limit: usize,
}

impl Default for RequestMiddleware {
    fn default() -> Self {
        RequestMiddleware {
            audit: None,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl RequestMiddleware {
    pub fn new() -> Self {
        RequestMiddleware::default()
    }

    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    pub fn with_audit(mut self, descriptor: EntityDescriptor, sessions: Arc<dyn SessionFactory>) -> Self {
        self.audit = Some(AuditLogger::new(descriptor, sessions));
        self
    }

    pub fn is_auditing(&self) -> bool {
        self.audit.is_some()
    }

    pub fn apply(self, router: Router) -> Router {
        let limit = self.body_limit;
        router.layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn_with_state(self, track))
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(RequestBodyLimitLayer::new(limit)),
        )
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    AppError::Unexpected(detail).into_response()
}

/// Errors answered below the handlers (routing, body limit) come back with an
/// empty or plain-text body; give them the same JSON shape as handler errors.
fn untranslated(status: StatusCode, method: &str, path: &str, body_limit: usize) -> Option<AppError> {
    match status {
        StatusCode::NOT_FOUND => Some(AppError::NotFound(format!("no route for {} {}", method, path))),
        StatusCode::METHOD_NOT_ALLOWED => Some(AppError::MethodNotAllowed(format!(
            "method {} not allowed for {}",
            method, path
        ))),
        StatusCode::PAYLOAD_TOO_LARGE => Some(AppError::PayloadTooLarge(format!(
            "request body exceeds {} bytes",
            body_limit
        ))),
        _ => None,
    }
}

async fn track(State(mw): State<RequestMiddleware>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().to_string();
    let started_at = Utc::now();
    let timer = Instant::now();

    let mut response = next.run(req).await;
    if response.extensions().get::<ErrorDescription>().is_none() {
        if let Some(err) = untranslated(response.status(), &method, &path, mw.body_limit) {
            response = err.into_response();
        }
    }

    let elapsed_ms = timer.elapsed().as_millis() as i64;
    let status = response.status();
    let error = response.extensions().get::<ErrorDescription>().map(|d| d.0.clone());
    tracing::info!(%method, %path, status = status.as_u16(), elapsed_ms, "request");

    if let Some(audit) = &mw.audit {
        audit
            .record(&AuditRecord {
                path,
                method,
                started_at,
                elapsed_ms,
                status_code: status.as_u16(),
                error,
            })
            .await;
    }
    response
}
