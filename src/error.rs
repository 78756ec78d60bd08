//! Typed errors and HTTP mapping.

use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key: entity {entity} column {column}")]
    InvalidPrimaryKey { entity: String, column: String },
    #[error("duplicate {kind}: {name}")]
    Duplicate { kind: &'static str, name: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// CrudEngine operation, carried by storage errors for context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Create,
    BulkCreate,
    Count,
    ReadAll,
    ReadOne,
    Update,
    Delete,
    BulkDelete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Create => "creating",
            Operation::BulkCreate => "bulk creating",
            Operation::Count => "counting",
            Operation::ReadAll => "reading all",
            Operation::ReadOne => "reading",
            Operation::Update => "updating",
            Operation::Delete => "deleting",
            Operation::BulkDelete => "bulk deleting",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    MethodNotAllowed(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("error occurred while {operation} {entity}{}: {source}", pk_suffix(.pk))]
    Storage {
        entity: String,
        operation: Operation,
        pk: Option<String>,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Unexpected(String),
}

fn pk_suffix(pk: &Option<String>) -> String {
    pk.as_ref().map(|pk| format!(" with key {}", pk)).unwrap_or_default()
}

/// Response extension describing the failure; read by the audit middleware.
#[derive(Clone, Debug)]
pub struct ErrorDescription(pub String);

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Storage { .. } | AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Config(_) | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Application-raised errors that carry their own status and detail.
    pub fn is_custom(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_)
                | AppError::NotFound(_)
                | AppError::Unauthorized(_)
                | AppError::Forbidden(_)
                | AppError::MethodNotAllowed(_)
                | AppError::PayloadTooLarge(_)
        )
    }

    pub fn is_store(&self) -> bool {
        matches!(self, AppError::Storage { .. } | AppError::Store(_))
    }

    pub fn description(&self) -> String {
        if self.is_custom() {
            format!("Custom HTTP error: {}", self)
        } else if self.is_store() {
            format!("Database error: {}", self)
        } else {
            format!("Unexpected error: {}", self)
        }
    }

    fn body(&self) -> serde_json::Value {
        if self.is_custom() {
            json!({ "detail": self.to_string() })
        } else if self.is_store() {
            error_body("Database error", self.to_string())
        } else {
            error_body("Unexpected error", self.to_string())
        }
    }
}

pub fn error_body(error: &str, details: String) -> serde_json::Value {
    json!({ "error": error, "details": details })
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        let mut response = (status, Json(self.body())).into_response();
        response.extensions_mut().insert(ErrorDescription(self.description()));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_names_entity_operation_and_key() {
        let err = AppError::Storage {
            entity: "role".into(),
            operation: Operation::Delete,
            pk: Some("7".into()),
            source: StoreError::Unavailable("pool closed".into()),
        };
        assert_eq!(err.to_string(), "error occurred while deleting role with key 7: store unavailable: pool closed");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body()["error"], "Database error");
    }

    #[test]
    fn custom_errors_render_detail() {
        let err = AppError::Forbidden("missing privilege CAN_DELETE".into());
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.body(), json!({ "detail": "missing privilege CAN_DELETE" }));
        assert_eq!(err.description(), "Custom HTTP error: missing privilege CAN_DELETE");
    }

    #[test]
    fn uncategorised_errors_are_unexpected() {
        let err = AppError::Unexpected("boom".into());
        assert_eq!(err.body(), json!({ "error": "Unexpected error", "details": "boom" }));
    }
}
