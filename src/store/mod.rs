//! Session abstraction over the transactional data store.
//!
//! A [`SessionFactory`] hands out one [`Session`] per unit of work. A session is a
//! single transaction: it ends with exactly one `commit` or `rollback`, and a session
//! dropped without either is rolled back.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{ensure_database_exists, PgSession, PgSessionFactory};

use crate::config::EntityDescriptor;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("session already closed")]
    Closed,
}

/// Equality filter on one column.
#[derive(Clone, Copy, Debug)]
pub struct Filter<'a> {
    pub column: &'a str,
    pub value: &'a Value,
}

#[async_trait]
pub trait Session: Send {
    /// Insert one row and return it as stored, including store-assigned columns.
    async fn insert(&mut self, entity: &EntityDescriptor, row: &Map<String, Value>) -> Result<Value, StoreError>;

    /// First row where `filter.column` equals `filter.value`.
    async fn find(&mut self, entity: &EntityDescriptor, filter: Filter<'_>) -> Result<Option<Value>, StoreError>;

    /// Rows in natural storage order, optionally filtered, paged by skip/limit.
    async fn select(
        &mut self,
        entity: &EntityDescriptor,
        filter: Option<Filter<'_>>,
        skip: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Value>, StoreError>;

    async fn count(&mut self, entity: &EntityDescriptor) -> Result<u64, StoreError>;

    /// Apply `changes` to the row with primary key `pk`; returns the refreshed row.
    async fn update(
        &mut self,
        entity: &EntityDescriptor,
        pk: &Value,
        changes: &Map<String, Value>,
    ) -> Result<Option<Value>, StoreError>;

    /// Delete rows whose primary key is in `pks`; returns the number removed.
    async fn delete(&mut self, entity: &EntityDescriptor, pks: &[Value]) -> Result<u64, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Session>, StoreError>;
}
