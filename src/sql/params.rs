//! Convert serde_json::Value to types that sqlx can bind.

use crate::config::FieldType;
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

/// A value that can be bound to a PostgreSQL query. Placeholders carry an explicit
/// cast to the column type, so strings bound as TEXT convert on the server side.
#[derive(Clone, Debug)]
pub enum PgBindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Json(Value),
}

impl PgBindValue {
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            Value::Bool(b) => PgBindValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => PgBindValue::I64(i),
                None => PgBindValue::F64(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => PgBindValue::String(s.clone()),
            Value::Array(_) | Value::Object(_) => PgBindValue::Json(v.clone()),
        }
    }

    /// JSON columns take every non-null value as a JSON document; scalars bound
    /// as INT8/BOOL/TEXT would not cast to jsonb.
    pub fn for_column(v: &Value, field_type: Option<FieldType>) -> Self {
        match (field_type, v) {
            (_, Value::Null) => PgBindValue::Null,
            (Some(FieldType::Json), _) => PgBindValue::Json(v.clone()),
            _ => PgBindValue::from_json(v),
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgBindValue::Null => IsNull::Yes,
            PgBindValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf)?,
            PgBindValue::I64(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::F64(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::String(s) => <&str as Encode<Postgres>>::encode_by_ref(&s.as_str(), buf)?,
            PgBindValue::Json(v) => <Value as Encode<Postgres>>::encode_by_ref(v, buf)?,
        })
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(match self {
            PgBindValue::Null | PgBindValue::String(_) => PgTypeInfo::with_name("TEXT"),
            PgBindValue::Bool(_) => PgTypeInfo::with_name("BOOL"),
            PgBindValue::I64(_) => PgTypeInfo::with_name("INT8"),
            PgBindValue::F64(_) => PgTypeInfo::with_name("FLOAT8"),
            PgBindValue::Json(_) => PgTypeInfo::with_name("JSONB"),
        })
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }

    fn compatible(_ty: &PgTypeInfo) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_bind_as_integers_when_exact() {
        assert!(matches!(PgBindValue::from_json(&json!(7)), PgBindValue::I64(7)));
        assert!(matches!(PgBindValue::from_json(&json!(1.5)), PgBindValue::F64(f) if f == 1.5));
        assert!(matches!(PgBindValue::from_json(&json!({"a": 1})), PgBindValue::Json(_)));
    }

    #[test]
    fn json_columns_bind_scalars_as_documents() {
        let json_col = Some(FieldType::Json);
        assert!(matches!(PgBindValue::for_column(&json!(5), json_col), PgBindValue::Json(ref v) if *v == json!(5)));
        assert!(matches!(PgBindValue::for_column(&json!(true), json_col), PgBindValue::Json(_)));
        assert!(matches!(PgBindValue::for_column(&json!("abc"), json_col), PgBindValue::Json(ref v) if *v == json!("abc")));
        assert!(matches!(PgBindValue::for_column(&Value::Null, json_col), PgBindValue::Null));
        assert!(matches!(PgBindValue::for_column(&json!(5), Some(FieldType::Integer)), PgBindValue::I64(5)));
        assert!(matches!(PgBindValue::for_column(&json!("x"), None), PgBindValue::String(_)));
    }
}
