//! Generic transactional CRUD over one entity type.

use crate::config::{EntityDescriptor, SchemaVariant};
use crate::error::{AppError, Operation};
use crate::service::{EntityInput, RequestValidator};
use crate::store::{Filter, Session, SessionFactory, StoreError};
use serde_json::Value;
use std::sync::Arc;

/// CRUD operations for the entity described by one [`EntityDescriptor`].
///
/// Every call opens its own session and releases it (commit or rollback) before
/// returning. Store failures are rolled back and surfaced as
/// [`AppError::Storage`] carrying the entity name, operation and key.
#[derive(Clone)]
pub struct CrudEngine {
    entity: Arc<EntityDescriptor>,
    sessions: Arc<dyn SessionFactory>,
}

impl CrudEngine {
    pub fn new(entity: Arc<EntityDescriptor>, sessions: Arc<dyn SessionFactory>) -> Self {
        CrudEngine { entity, sessions }
    }

    pub fn entity(&self) -> &EntityDescriptor {
        &self.entity
    }

    pub async fn create(&self, input: &EntityInput) -> Result<Value, AppError> {
        let row = RequestValidator::validate(&self.entity, input, SchemaVariant::Create)?;
        let mut session = self.open(Operation::Create, None).await?;
        let result = session
            .insert(&self.entity, &row)
            .await
            .map_err(|e| self.storage(Operation::Create, None, e));
        let created = self.finish(session.as_mut(), Operation::Create, None, result).await?;
        tracing::debug!(entity = %self.entity.name, "created");
        Ok(created)
    }

    /// All-or-nothing: every element is validated before anything is written, and
    /// all rows are inserted in a single transaction.
    pub async fn bulk_create(&self, inputs: &[EntityInput]) -> Result<Vec<Value>, AppError> {
        let rows = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                RequestValidator::validate(&self.entity, input, SchemaVariant::Create).map_err(|e| {
                    AppError::Validation(format!(
                        "Invalid {} object at index {} for bulk creation: {}",
                        self.entity.name, i, e
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut session = self.open(Operation::BulkCreate, None).await?;
        let mut result = Ok(Vec::with_capacity(rows.len()));
        for row in &rows {
            match session.insert(&self.entity, row).await {
                Ok(created) => {
                    if let Ok(out) = result.as_mut() {
                        out.push(created);
                    }
                }
                Err(e) => {
                    result = Err(self.storage(Operation::BulkCreate, None, e));
                    break;
                }
            }
        }
        let created = self.finish(session.as_mut(), Operation::BulkCreate, None, result).await?;
        tracing::debug!(entity = %self.entity.name, count = created.len(), "bulk created");
        Ok(created)
    }

    pub async fn count(&self) -> Result<u64, AppError> {
        let mut session = self.open(Operation::Count, None).await?;
        let result = session
            .count(&self.entity)
            .await
            .map_err(|e| self.storage(Operation::Count, None, e));
        self.release(session.as_mut(), result).await
    }

    /// Rows in natural storage order, paged. The filter applies only when both the
    /// attribute name and the value are given.
    pub async fn read_all(
        &self,
        filter: Option<&str>,
        value: Option<&Value>,
        skip: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Value>, AppError> {
        let filter = match (filter, value) {
            (Some(column), Some(value)) => Some((column, self.coerce_filter(column, value)?)),
            _ => None,
        };
        let mut session = self.open(Operation::ReadAll, None).await?;
        let result = session
            .select(
                &self.entity,
                filter.as_ref().map(|(column, value)| Filter { column: *column, value }),
                skip,
                limit,
            )
            .await
            .map_err(|e| self.storage(Operation::ReadAll, None, e));
        self.release(session.as_mut(), result).await
    }

    pub async fn read_one(&self, pk: &Value) -> Result<Value, AppError> {
        let pk = self.coerce_pk(pk)?;
        let mut session = self.open(Operation::ReadOne, Some(&pk)).await?;
        let result = self.fetch_one(session.as_mut(), Operation::ReadOne, &pk).await;
        self.release(session.as_mut(), result).await
    }

    /// Full update (`full = true`, update schema) or partial update (`full = false`,
    /// patch schema). A missing row surfaces as the same NotFound as `read_one`.
    pub async fn update(&self, pk: &Value, input: &EntityInput, full: bool) -> Result<Value, AppError> {
        let expected = if full { SchemaVariant::Update } else { SchemaVariant::Patch };
        let changes = RequestValidator::validate(&self.entity, input, expected)?;
        let pk = self.coerce_pk(pk)?;
        let mut session = self.open(Operation::Update, Some(&pk)).await?;
        let result = match self.fetch_one(session.as_mut(), Operation::Update, &pk).await {
            Ok(existing) if changes.is_empty() => Ok(existing),
            Ok(_) => match session.update(&self.entity, &pk, &changes).await {
                Ok(Some(row)) => Ok(row),
                Ok(None) => Err(self.not_found(&pk)),
                Err(e) => Err(self.storage(Operation::Update, Some(&pk), e)),
            },
            Err(e) => Err(e),
        };
        self.finish(session.as_mut(), Operation::Update, Some(&pk), result).await
    }

    /// Delete every row whose primary key is listed, in one transaction.
    pub async fn bulk_delete(&self, pks: &[Value]) -> Result<u64, AppError> {
        let pks = pks.iter().map(|pk| self.coerce_pk(pk)).collect::<Result<Vec<_>, _>>()?;
        let mut session = self.open(Operation::BulkDelete, None).await?;
        let result = session
            .delete(&self.entity, &pks)
            .await
            .map_err(|e| self.storage(Operation::BulkDelete, None, e));
        let deleted = self.finish(session.as_mut(), Operation::BulkDelete, None, result).await?;
        tracing::debug!(entity = %self.entity.name, deleted, "bulk deleted");
        Ok(deleted)
    }

    pub async fn delete(&self, pk: &Value) -> Result<(), AppError> {
        let pk = self.coerce_pk(pk)?;
        let mut session = self.open(Operation::Delete, Some(&pk)).await?;
        let result = match self.fetch_one(session.as_mut(), Operation::Delete, &pk).await {
            Ok(_) => session
                .delete(&self.entity, std::slice::from_ref(&pk))
                .await
                .map(|_| ())
                .map_err(|e| self.storage(Operation::Delete, Some(&pk), e)),
            Err(e) => Err(e),
        };
        self.finish(session.as_mut(), Operation::Delete, Some(&pk), result).await
    }

    /// Exactly one row by resolved primary key, or the canonical NotFound.
    async fn fetch_one(&self, session: &mut dyn Session, op: Operation, pk: &Value) -> Result<Value, AppError> {
        let filter = Filter {
            column: &self.entity.primary_key,
            value: pk,
        };
        match session.find(&self.entity, filter).await {
            Ok(Some(row)) => Ok(row),
            Ok(None) => Err(self.not_found(pk)),
            Err(e) => Err(self.storage(op, Some(pk), e)),
        }
    }

    async fn open(&self, op: Operation, pk: Option<&Value>) -> Result<Box<dyn Session>, AppError> {
        self.sessions.open().await.map_err(|e| self.storage(op, pk, e))
    }

    /// Commit on success, roll back on failure.
    async fn finish<T>(
        &self,
        session: &mut dyn Session,
        op: Operation,
        pk: Option<&Value>,
        result: Result<T, AppError>,
    ) -> Result<T, AppError> {
        match result {
            Ok(v) => match session.commit().await {
                Ok(()) => Ok(v),
                Err(e) => {
                    self.rollback(session).await;
                    Err(self.storage(op, pk, e))
                }
            },
            Err(e) => {
                self.rollback(session).await;
                Err(e)
            }
        }
    }

    /// Read-only sessions are always rolled back.
    async fn release<T>(&self, session: &mut dyn Session, result: Result<T, AppError>) -> Result<T, AppError> {
        self.rollback(session).await;
        result
    }

    async fn rollback(&self, session: &mut dyn Session) {
        match session.rollback().await {
            Ok(()) | Err(StoreError::Closed) => {}
            Err(e) => tracing::warn!(entity = %self.entity.name, error = %e, "rollback failed"),
        }
    }

    fn coerce_pk(&self, pk: &Value) -> Result<Value, AppError> {
        let ty = self.entity.pk_type();
        match ty.coerce(pk) {
            Some(v) if !v.is_null() => Ok(v),
            _ => Err(AppError::Validation(format!(
                "{} {} must be {}",
                self.entity.name,
                self.entity.primary_key,
                ty.name()
            ))),
        }
    }

    fn coerce_filter(&self, column: &str, value: &Value) -> Result<Value, AppError> {
        let col = self.entity.column(column).ok_or_else(|| {
            AppError::Validation(format!("Invalid filter {} for entity {}", column, self.entity.name))
        })?;
        col.field_type.coerce(value).ok_or_else(|| {
            AppError::Validation(format!(
                "Invalid value for filter {} of entity {}: must be {}",
                column,
                self.entity.name,
                col.field_type.name()
            ))
        })
    }

    fn not_found(&self, pk: &Value) -> AppError {
        AppError::NotFound(format!(
            "{} with {} {} not found",
            self.entity.name,
            self.entity.primary_key,
            display_pk(pk)
        ))
    }

    fn storage(&self, operation: Operation, pk: Option<&Value>, source: StoreError) -> AppError {
        AppError::Storage {
            entity: self.entity.name.clone(),
            operation,
            pk: pk.map(display_pk),
            source,
        }
    }
}

fn display_pk(pk: &Value) -> String {
    match pk {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
