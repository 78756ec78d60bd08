//! Builds parameterized INSERT, SELECT, UPDATE, DELETE from an entity descriptor.

use crate::config::{ColumnInfo, EntityDescriptor, FieldType};
use crate::sql::PgBindValue;
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL (safe: only from config).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(entity: &EntityDescriptor) -> String {
    match &entity.schema_name {
        Some(schema) => format!("{}.{}", quoted(schema), quoted(&entity.table_name)),
        None => quoted(&entity.table_name),
    }
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
    /// Declared type of the column each param is compared with or written to.
    pub param_types: Vec<Option<FieldType>>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
            param_types: Vec::new(),
        }
    }

    /// Params ready to bind, typed by their column.
    pub fn bind_values(&self) -> impl Iterator<Item = PgBindValue> + '_ {
        self.params
            .iter()
            .zip(&self.param_types)
            .map(|(v, t)| PgBindValue::for_column(v, *t))
    }

    /// Push a value and return its cast placeholder, e.g. `$2::bigint`.
    fn push_param(&mut self, v: Value, column: Option<&ColumnInfo>) -> String {
        self.params.push(v);
        self.param_types.push(column.map(|c| c.field_type));
        let n = self.params.len();
        match column {
            Some(c) => format!("${}::{}", n, c.field_type.pg_type()),
            None => format!("${}", n),
        }
    }
}

fn select_column_list(entity: &EntityDescriptor) -> String {
    entity
        .columns
        .iter()
        .map(|c| quoted(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// SELECT the first row where `column` equals the single bound value.
pub fn select_by_column(entity: &EntityDescriptor, column: &str, value: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.push_param(value.clone(), entity.column(column));
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {} ORDER BY {} LIMIT 1",
        select_column_list(entity),
        qualified_table(entity),
        quoted(column),
        ph,
        quoted(&entity.primary_key)
    );
    q
}

/// SELECT list with an optional equality filter, ORDER BY pk, OFFSET/LIMIT.
pub fn select_list(
    entity: &EntityDescriptor,
    filter: Option<(&str, &Value)>,
    skip: u64,
    limit: Option<u64>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = match filter {
        Some((col, val)) => {
            let ph = q.push_param(val.clone(), entity.column(col));
            format!(" WHERE {} = {}", quoted(col), ph)
        }
        None => String::new(),
    };
    let order_clause = format!(" ORDER BY {}", quoted(&entity.primary_key));
    let offset_clause = if skip > 0 { format!(" OFFSET {}", skip) } else { String::new() };
    let limit_clause = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}{}",
        select_column_list(entity),
        qualified_table(entity),
        where_clause,
        order_clause,
        offset_clause,
        limit_clause
    );
    q
}

pub fn count(entity: &EntityDescriptor) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "SELECT COUNT({}) FROM {}",
        quoted(&entity.primary_key),
        qualified_table(entity)
    );
    q
}

/// INSERT: one placeholder per column supplied in `row`; generated columns left to the
/// database when absent.
pub fn insert(entity: &EntityDescriptor, row: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &entity.columns {
        let val = row.get(&c.name).filter(|v| !v.is_null()).cloned();
        if val.is_none() && c.generated {
            continue;
        }
        let ph = q.push_param(val.unwrap_or(Value::Null), Some(c));
        cols.push(quoted(&c.name));
        placeholders.push(ph);
    }
    let table = qualified_table(entity);
    let returning = select_column_list(entity);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by pk: SET only known, non-key columns present in `changes`.
/// With nothing to set, degrades to a SELECT of the row.
pub fn update(entity: &EntityDescriptor, pk: &Value, changes: &Map<String, Value>) -> QueryBuf {
    let mut sets = Vec::new();
    let mut q = QueryBuf::new();
    for c in &entity.columns {
        if c.name == entity.primary_key {
            continue;
        }
        let Some(v) = changes.get(&c.name) else { continue };
        let ph = q.push_param(v.clone(), Some(c));
        sets.push(format!("{} = {}", quoted(&c.name), ph));
    }
    if sets.is_empty() {
        return select_by_column(entity, &entity.primary_key, pk);
    }
    let pk_ph = q.push_param(pk.clone(), entity.pk_column());
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        qualified_table(entity),
        sets.join(", "),
        quoted(&entity.primary_key),
        pk_ph,
        select_column_list(entity)
    );
    q
}

/// DELETE WHERE pk IN ($1, $2, ...).
pub fn delete_in(entity: &EntityDescriptor, pks: &[Value]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(entity);
    if pks.is_empty() {
        q.sql = format!("DELETE FROM {} WHERE 1 = 0", table);
        return q;
    }
    let pk_col = entity.pk_column();
    let placeholders: Vec<String> = pks.iter().map(|v| q.push_param(v.clone(), pk_col)).collect();
    q.sql = format!(
        "DELETE FROM {} WHERE {} IN ({})",
        table,
        quoted(&entity.primary_key),
        placeholders.join(", ")
    );
    q
}
