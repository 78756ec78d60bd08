//! Audit log: one row per request, written through the generic CRUD engine.

use crate::config::{ColumnInfo, EntityDescriptor, FieldType, InputSchema, SchemaVariant};
use crate::service::{CrudEngine, EntityInput};
use crate::store::SessionFactory;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

pub const AUDIT_TABLE: &str = "request_logs";

/// Descriptor of the audit table.
pub fn audit_log_descriptor(schema: Option<&str>) -> EntityDescriptor {
    let columns = vec![
        ColumnInfo::new("id", FieldType::Integer).not_null().generated(),
        ColumnInfo::new("path", FieldType::Text).not_null(),
        ColumnInfo::new("method", FieldType::Text).not_null(),
        ColumnInfo::new("started_at", FieldType::Timestamp).not_null(),
        ColumnInfo::new("elapsed_ms", FieldType::Integer).not_null(),
        ColumnInfo::new("status_code", FieldType::Integer).not_null(),
        ColumnInfo::new("error", FieldType::Text),
    ];
    EntityDescriptor {
        name: "request_log".into(),
        schema_name: schema.map(String::from),
        table_name: AUDIT_TABLE.into(),
        primary_key: "id".into(),
        create: InputSchema::derive(SchemaVariant::Create, &columns),
        update: InputSchema::derive(SchemaVariant::Update, &columns),
        patch: InputSchema::derive(SchemaVariant::Patch, &columns),
        unique_together: Vec::new(),
        columns,
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct AuditRecord {
    pub path: String,
    pub method: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: i64,
    pub status_code: u16,
    /// Error description of a failed request; `None` on success.
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct AuditLogger {
    engine: CrudEngine,
}

impl AuditLogger {
    pub fn new(descriptor: EntityDescriptor, sessions: Arc<dyn SessionFactory>) -> Self {
        AuditLogger {
            engine: CrudEngine::new(Arc::new(descriptor), sessions),
        }
    }

    /// Failures are logged and swallowed: auditing never changes the response.
    pub async fn record(&self, record: &AuditRecord) {
        let body = match serde_json::to_value(record) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "audit record not serializable");
                return;
            }
        };
        let result = match EntityInput::create(body) {
            Ok(input) => self.engine.create(&input).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(path = %record.path, error = %e, "audit write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::{json, Value};

    fn record(error: Option<&str>) -> AuditRecord {
        AuditRecord {
            path: "/books/1".into(),
            method: "GET".into(),
            started_at: Utc::now(),
            elapsed_ms: 3,
            status_code: 404,
            error: error.map(String::from),
        }
    }

    #[tokio::test]
    async fn writes_one_row_per_record() {
        let store = MemoryStore::new();
        let descriptor = audit_log_descriptor(None);
        let logger = AuditLogger::new(descriptor.clone(), Arc::new(store.clone()));
        logger.record(&record(Some("Custom HTTP error: not found"))).await;
        logger.record(&record(None)).await;

        let rows = store.rows(&descriptor).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["status_code"], json!(404));
        assert_eq!(rows[0]["error"], json!("Custom HTTP error: not found"));
        assert_eq!(rows[1]["error"], Value::Null);
    }

    #[tokio::test]
    async fn store_failures_are_swallowed() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let logger = AuditLogger::new(audit_log_descriptor(None), Arc::new(store.clone()));
        logger.record(&record(None)).await;
        store.set_unavailable(false);
        assert!(store.rows(&audit_log_descriptor(None)).await.is_empty());
    }
}
