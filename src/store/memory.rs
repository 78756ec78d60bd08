//! In-process transactional store. Sessions are serialized: each one holds the store
//! lock for its lifetime and works on a staged copy that replaces the committed state
//! on commit.

use crate::config::{EntityDescriptor, FieldType};
use crate::store::{Filter, Session, SessionFactory, StoreError};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Row = Map<String, Value>;

#[derive(Clone, Debug, Default)]
struct Table {
    rows: Vec<Row>,
    next_key: i64,
}

type Tables = HashMap<String, Table>;

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// When set, `open` fails as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Committed rows of an entity, for inspection.
    pub async fn rows(&self, entity: &EntityDescriptor) -> Vec<Value> {
        let tables = self.tables.lock().await;
        tables
            .get(&entity.qualified_name())
            .map(|t| t.rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionFactory for MemoryStore {
    async fn open(&self) -> Result<Box<dyn Session>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemorySession {
            guard: Some(guard),
            staged,
        }))
    }
}

pub struct MemorySession {
    guard: Option<OwnedMutexGuard<Tables>>,
    staged: Tables,
}

impl MemorySession {
    fn table(&mut self, entity: &EntityDescriptor) -> Result<&mut Table, StoreError> {
        if self.guard.is_none() {
            return Err(StoreError::Closed);
        }
        Ok(self.staged.entry(entity.qualified_name()).or_default())
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn matches(row: &Row, filter: Option<Filter<'_>>) -> bool {
    match filter {
        Some(f) => row.get(f.column).map(|v| value_eq(v, f.value)).unwrap_or(false),
        None => true,
    }
}

/// Not-null, primary key and unique checks for `row` at position `skip` (None for a new row).
fn check_constraints(entity: &EntityDescriptor, table: &Table, row: &Row, skip: Option<usize>) -> Result<(), StoreError> {
    for c in &entity.columns {
        let v = row.get(&c.name).unwrap_or(&Value::Null);
        if v.is_null() {
            if !c.nullable || c.name == entity.primary_key {
                return Err(StoreError::Constraint(format!(
                    "null value in column \"{}\" of \"{}\" violates not-null constraint",
                    c.name,
                    entity.qualified_name()
                )));
            }
            continue;
        }
        if !(c.unique || c.name == entity.primary_key) {
            continue;
        }
        let clash = table
            .rows
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip)
            .any(|(_, other)| other.get(&c.name).map(|o| value_eq(o, v)).unwrap_or(false));
        if clash {
            return Err(StoreError::Constraint(format!(
                "duplicate key value violates unique constraint on \"{}\".\"{}\" ({})",
                entity.qualified_name(),
                c.name,
                v
            )));
        }
    }
    for group in &entity.unique_together {
        // NULLs never clash, as in SQL.
        let values: Option<Vec<&Value>> = group.iter().map(|c| row.get(c).filter(|v| !v.is_null())).collect();
        let Some(values) = values else { continue };
        let clash = table
            .rows
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip)
            .any(|(_, other)| {
                group
                    .iter()
                    .zip(&values)
                    .all(|(c, v)| other.get(c).map(|o| value_eq(o, v)).unwrap_or(false))
            });
        if clash {
            return Err(StoreError::Constraint(format!(
                "duplicate key value violates unique constraint on \"{}\" ({})",
                entity.qualified_name(),
                group.join(", ")
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl Session for MemorySession {
    async fn insert(&mut self, entity: &EntityDescriptor, row: &Map<String, Value>) -> Result<Value, StoreError> {
        let table = self.table(entity)?;
        let mut record = Row::new();
        for c in &entity.columns {
            let supplied = row.get(&c.name).filter(|v| !v.is_null()).cloned();
            let v = match supplied {
                Some(v) => {
                    if c.field_type == FieldType::Integer && c.generated {
                        if let Some(n) = v.as_i64() {
                            table.next_key = table.next_key.max(n);
                        }
                    }
                    v
                }
                None if c.generated => match c.field_type {
                    FieldType::Integer => {
                        table.next_key += 1;
                        Value::Number(table.next_key.into())
                    }
                    FieldType::Uuid => Value::String(uuid::Uuid::new_v4().to_string()),
                    FieldType::Timestamp => Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
                    _ => Value::Null,
                },
                None => Value::Null,
            };
            record.insert(c.name.clone(), v);
        }
        check_constraints(entity, table, &record, None)?;
        table.rows.push(record.clone());
        Ok(Value::Object(record))
    }

    async fn find(&mut self, entity: &EntityDescriptor, filter: Filter<'_>) -> Result<Option<Value>, StoreError> {
        let table = self.table(entity)?;
        Ok(table
            .rows
            .iter()
            .find(|r| matches(r, Some(filter)))
            .cloned()
            .map(Value::Object))
    }

    async fn select(
        &mut self,
        entity: &EntityDescriptor,
        filter: Option<Filter<'_>>,
        skip: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Value>, StoreError> {
        let table = self.table(entity)?;
        let rows = table
            .rows
            .iter()
            .filter(|r| matches(r, filter))
            .skip(skip as usize)
            .take(limit.map(|l| l as usize).unwrap_or(usize::MAX))
            .cloned()
            .map(Value::Object)
            .collect();
        Ok(rows)
    }

    async fn count(&mut self, entity: &EntityDescriptor) -> Result<u64, StoreError> {
        Ok(self.table(entity)?.rows.len() as u64)
    }

    async fn update(
        &mut self,
        entity: &EntityDescriptor,
        pk: &Value,
        changes: &Map<String, Value>,
    ) -> Result<Option<Value>, StoreError> {
        let table = self.table(entity)?;
        let pk_filter = Filter {
            column: &entity.primary_key,
            value: pk,
        };
        let Some(idx) = table.rows.iter().position(|r| matches(r, Some(pk_filter))) else {
            return Ok(None);
        };
        let mut updated = table.rows[idx].clone();
        for (k, v) in changes {
            if *k == entity.primary_key || entity.column(k).is_none() {
                continue;
            }
            updated.insert(k.clone(), v.clone());
        }
        check_constraints(entity, table, &updated, Some(idx))?;
        table.rows[idx] = updated.clone();
        Ok(Some(Value::Object(updated)))
    }

    async fn delete(&mut self, entity: &EntityDescriptor, pks: &[Value]) -> Result<u64, StoreError> {
        let pk = entity.primary_key.clone();
        let table = self.table(entity)?;
        let before = table.rows.len();
        table
            .rows
            .retain(|r| !pks.iter().any(|k| r.get(&pk).map(|v| value_eq(v, k)).unwrap_or(false)));
        Ok((before - table.rows.len()) as u64)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let mut guard = self.guard.take().ok_or(StoreError::Closed)?;
        *guard = std::mem::take(&mut self.staged);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.guard.take().ok_or(StoreError::Closed)?;
        self.staged.clear();
        Ok(())
    }
}
