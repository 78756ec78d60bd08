//! PostgreSQL sessions: one sqlx transaction per session.

use crate::config::{ColumnInfo, EntityDescriptor, FieldType};
use crate::sql::{self, QueryBuf};
use crate::store::{Filter, Session, SessionFactory, StoreError};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{ConnectOptions, PgPool, Postgres, Row, Transaction};
use std::str::FromStr;

#[derive(Clone)]
pub struct PgSessionFactory {
    pool: PgPool,
}

impl PgSessionFactory {
    pub fn new(pool: PgPool) -> Self {
        PgSessionFactory { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SessionFactory for PgSessionFactory {
    async fn open(&self) -> Result<Box<dyn Session>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSession { tx: Some(tx) }))
    }
}

/// A transaction that is rolled back by sqlx when dropped uncommitted.
pub struct PgSession {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::Closed)
    }

    async fn fetch_optional(&mut self, entity: &EntityDescriptor, q: &QueryBuf) -> Result<Option<Value>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in q.bind_values() {
            query = query.bind(p);
        }
        let row = query.fetch_optional(&mut **self.tx()?).await?;
        Ok(row.map(|r| row_to_json(entity, &r)))
    }

    async fn fetch_all(&mut self, entity: &EntityDescriptor, q: &QueryBuf) -> Result<Vec<Value>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in q.bind_values() {
            query = query.bind(p);
        }
        let rows = query.fetch_all(&mut **self.tx()?).await?;
        Ok(rows.iter().map(|r| row_to_json(entity, r)).collect())
    }
}

#[async_trait]
impl Session for PgSession {
    async fn insert(&mut self, entity: &EntityDescriptor, row: &Map<String, Value>) -> Result<Value, StoreError> {
        let q = sql::insert(entity, row);
        self.fetch_optional(entity, &q)
            .await?
            .ok_or_else(|| StoreError::Db(sqlx::Error::RowNotFound))
    }

    async fn find(&mut self, entity: &EntityDescriptor, filter: Filter<'_>) -> Result<Option<Value>, StoreError> {
        let q = sql::select_by_column(entity, filter.column, filter.value);
        self.fetch_optional(entity, &q).await
    }

    async fn select(
        &mut self,
        entity: &EntityDescriptor,
        filter: Option<Filter<'_>>,
        skip: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Value>, StoreError> {
        let q = sql::select_list(entity, filter.map(|f| (f.column, f.value)), skip, limit);
        self.fetch_all(entity, &q).await
    }

    async fn count(&mut self, entity: &EntityDescriptor) -> Result<u64, StoreError> {
        let q = sql::count(entity);
        tracing::debug!(sql = %q.sql, "query");
        let n: i64 = sqlx::query_scalar(&q.sql).fetch_one(&mut **self.tx()?).await?;
        Ok(n.max(0) as u64)
    }

    async fn update(
        &mut self,
        entity: &EntityDescriptor,
        pk: &Value,
        changes: &Map<String, Value>,
    ) -> Result<Option<Value>, StoreError> {
        let q = sql::update(entity, pk, changes);
        self.fetch_optional(entity, &q).await
    }

    async fn delete(&mut self, entity: &EntityDescriptor, pks: &[Value]) -> Result<u64, StoreError> {
        let q = sql::delete_in(entity, pks);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in q.bind_values() {
            query = query.bind(p);
        }
        let done = query.execute(&mut **self.tx()?).await?;
        Ok(done.rows_affected())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Closed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Closed)?;
        tx.rollback().await?;
        Ok(())
    }
}

fn row_to_json(entity: &EntityDescriptor, row: &PgRow) -> Value {
    let mut map = Map::new();
    for col in &entity.columns {
        map.insert(col.name.clone(), cell_to_value(row, col));
    }
    Value::Object(map)
}

fn cell_to_value(row: &PgRow, col: &ColumnInfo) -> Value {
    let name = col.name.as_str();
    match col.field_type {
        FieldType::Integer => {
            if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
                return Value::Number(n.into());
            }
            if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
                return Value::Number(n.into());
            }
            Value::Null
        }
        FieldType::Float => row
            .try_get::<Option<f64>, _>(name)
            .ok()
            .flatten()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        FieldType::Text => row
            .try_get::<Option<String>, _>(name)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
        FieldType::Boolean => row
            .try_get::<Option<bool>, _>(name)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        FieldType::Uuid => row
            .try_get::<Option<uuid::Uuid>, _>(name)
            .ok()
            .flatten()
            .map(|u| Value::String(u.to_string()))
            .unwrap_or(Value::Null),
        FieldType::Timestamp => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)
            .ok()
            .flatten()
            .map(|d| Value::String(d.to_rfc3339_opts(SecondsFormat::Micros, true)))
            .unwrap_or(Value::Null),
        FieldType::Json => row
            .try_get::<Option<Value>, _>(name)
            .ok()
            .flatten()
            .unwrap_or(Value::Null),
    }
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), StoreError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", sql::quoted(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), StoreError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| StoreError::Unavailable("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    let admin_url = format!("{}postgres", base);
    Ok((admin_url, db_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_url_points_at_postgres_database() {
        let (admin, db) = parse_db_name_from_url("postgres://u:p@localhost:5432/crudgate?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres");
        assert_eq!(db, "crudgate");
    }
}
