//! Apply descriptors to the database: DDL for schemas and tables.
//! Idempotent (IF NOT EXISTS); existing tables are left untouched.

use crate::config::{ColumnInfo, EntityDescriptor, FieldType};
use crate::error::AppError;
use crate::sql::{qualified_table, quoted};
use crate::store::StoreError;
use sqlx::PgPool;
use std::collections::BTreeSet;

/// CREATE SCHEMA for every schema referenced, then CREATE TABLE per descriptor.
pub async fn apply_migrations<'a, I>(pool: &PgPool, entities: I) -> Result<(), AppError>
where
    I: IntoIterator<Item = &'a EntityDescriptor>,
{
    let entities: Vec<&EntityDescriptor> = entities.into_iter().collect();
    let schemas: BTreeSet<&str> = entities.iter().filter_map(|e| e.schema_name.as_deref()).collect();
    for schema in schemas {
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema));
        tracing::debug!(%sql, "migration");
        sqlx::query(&sql).execute(pool).await.map_err(StoreError::from)?;
    }
    for entity in &entities {
        let sql = create_table_sql(entity);
        tracing::debug!(%sql, "migration");
        sqlx::query(&sql).execute(pool).await.map_err(StoreError::from)?;
    }
    tracing::info!(tables = entities.len(), "migrations applied");
    Ok(())
}

pub fn create_table_sql(entity: &EntityDescriptor) -> String {
    let mut defs: Vec<String> = entity.columns.iter().map(column_def).collect();
    defs.push(format!("PRIMARY KEY ({})", quoted(&entity.primary_key)));
    for group in &entity.unique_together {
        let cols: Vec<String> = group.iter().map(|c| quoted(c)).collect();
        defs.push(format!("UNIQUE ({})", cols.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        qualified_table(entity),
        defs.join(",\n  ")
    )
}

fn column_def(c: &ColumnInfo) -> String {
    let typ = match (c.field_type, c.generated) {
        (FieldType::Integer, true) => "BIGSERIAL".to_string(),
        (t, _) => t.pg_type().to_uppercase(),
    };
    let mut def = format!("{} {}", quoted(&c.name), typ);
    if !c.nullable {
        def.push_str(" NOT NULL");
    }
    if c.generated {
        match c.field_type {
            FieldType::Uuid => def.push_str(" DEFAULT gen_random_uuid()"),
            FieldType::Timestamp => def.push_str(" DEFAULT NOW()"),
            _ => {}
        }
    }
    if c.unique {
        def.push_str(" UNIQUE");
    }
    def
}
