//! Raw config types matching the JSON files (entities.json + routes.json).

use crate::routes::RouteName;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Declared type of a column. Drives input coercion and the PostgreSQL cast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Float,
    Text,
    Boolean,
    Uuid,
    Timestamp,
    Json,
}

impl FieldType {
    pub fn pg_type(&self) -> &'static str {
        match self {
            FieldType::Integer => "bigint",
            FieldType::Float => "double precision",
            FieldType::Text => "text",
            FieldType::Boolean => "boolean",
            FieldType::Uuid => "uuid",
            FieldType::Timestamp => "timestamptz",
            FieldType::Json => "jsonb",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Integer => "an integer",
            FieldType::Float => "a number",
            FieldType::Text => "a string",
            FieldType::Boolean => "a boolean",
            FieldType::Uuid => "a UUID",
            FieldType::Timestamp => "an RFC 3339 timestamp",
            FieldType::Json => "JSON",
        }
    }

    /// Coerce a value to this type. Strings (from paths and query strings) are parsed.
    /// Null passes through; callers decide whether null is allowed.
    pub fn coerce(&self, v: &Value) -> Option<Value> {
        if v.is_null() {
            return Some(Value::Null);
        }
        match self {
            FieldType::Integer => match v {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| is_whole_i64(*f)).map(|f| f as i64))
                    .map(|i| Value::Number(i.into())),
                Value::String(s) => s.trim().parse::<i64>().ok().map(|i| Value::Number(i.into())),
                _ => None,
            },
            FieldType::Float => match v {
                Value::Number(_) => Some(v.clone()),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number),
                _ => None,
            },
            FieldType::Text => v.as_str().map(|s| Value::String(s.to_string())),
            FieldType::Boolean => match v {
                Value::Bool(_) => Some(v.clone()),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Some(Value::Bool(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Some(Value::Bool(false)),
                _ => None,
            },
            FieldType::Uuid => v
                .as_str()
                .and_then(|s| uuid::Uuid::parse_str(s.trim()).ok())
                .map(|u| Value::String(u.to_string())),
            FieldType::Timestamp => v
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
                .map(|d| Value::String(d.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Micros, true))),
            FieldType::Json => Some(v.clone()),
        }
    }
}

/// `i64::MAX as f64` rounds up to 2^63, hence the open upper bound.
fn is_whole_i64(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Trim surrounding whitespace and upper-case (role and privilege names).
    UpperTrim,
}

impl Normalization {
    pub fn apply(&self, v: Value) -> Value {
        match (self, v) {
            (Normalization::UpperTrim, Value::String(s)) => Value::String(s.trim().to_uppercase()),
            (_, other) => other,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: FieldType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Value assigned by the store when absent (serial keys, uuid keys, timestamps).
    #[serde(default)]
    pub generated: bool,
    #[serde(default)]
    pub unique: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

/// Per-field rule of one input schema variant.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub normalize: Option<Normalization>,
    #[serde(flatten)]
    pub rule: ValidationRule,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub table: String,
    /// Defaults to "id".
    #[serde(default)]
    pub primary_key: Option<String>,
    pub columns: Vec<ColumnConfig>,
    /// Column groups that must be unique together, e.g. `[["user_id", "role_id"]]`.
    #[serde(default)]
    pub unique_together: Vec<Vec<String>>,
    /// Explicit create-input fields; derived from columns when absent.
    #[serde(default)]
    pub create: Option<HashMap<String, FieldConfig>>,
    #[serde(default)]
    pub update: Option<HashMap<String, FieldConfig>>,
    #[serde(default)]
    pub patch: Option<HashMap<String, FieldConfig>>,
}

/// One route declaration, before path resolution and name normalization.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteConfigEntry {
    pub route_name: RouteName,
    #[serde(default)]
    pub route_path: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_activated: bool,
    #[serde(default)]
    pub is_protected: bool,
    #[serde(default)]
    pub is_unlocked: bool,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub privileges: Vec<String>,
}

impl RouteConfigEntry {
    pub fn new(route_name: RouteName) -> Self {
        RouteConfigEntry {
            route_name,
            route_path: None,
            summary: None,
            description: None,
            is_activated: false,
            is_protected: false,
            is_unlocked: false,
            roles: Vec::new(),
            privileges: Vec::new(),
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.route_path = Some(path.into());
        self
    }

    pub fn activated(mut self) -> Self {
        self.is_activated = true;
        self
    }

    pub fn protected(mut self) -> Self {
        self.is_protected = true;
        self
    }

    pub fn unlocked(mut self) -> Self {
        self.is_unlocked = true;
        self
    }

    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn privileges<I, S>(mut self, privileges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.privileges.extend(privileges.into_iter().map(Into::into));
        self
    }
}

/// Extra role/privilege requirements merged into a route entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    pub route_name: RouteName,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub privileges: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityRoutesConfig {
    /// Entity name as declared in entities.json.
    pub entity: String,
    /// Mount point, e.g. "/roles".
    pub base_path: String,
    #[serde(default)]
    pub routes: Vec<RouteConfigEntry>,
    #[serde(default)]
    pub authorizations: Vec<AuthorizationConfig>,
}

/// All config in one struct for in-memory loading.
#[derive(Clone, Debug, Default)]
pub struct FullConfig {
    pub entities: Vec<EntityConfig>,
    pub routes: Vec<EntityRoutesConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_query_strings_to_declared_types() {
        assert_eq!(FieldType::Integer.coerce(&json!("42")), Some(json!(42)));
        assert_eq!(FieldType::Integer.coerce(&json!(3.0)), Some(json!(3)));
        assert_eq!(FieldType::Integer.coerce(&json!("four")), None);
        assert_eq!(FieldType::Integer.coerce(&json!(1e20)), None);
        assert_eq!(FieldType::Integer.coerce(&json!(u64::MAX)), None);
        assert_eq!(FieldType::Integer.coerce(&json!(-9.5e18)), None);
        assert_eq!(FieldType::Integer.coerce(&json!(i64::MIN)), Some(json!(i64::MIN)));
        assert_eq!(FieldType::Boolean.coerce(&json!("TRUE")), Some(json!(true)));
        assert_eq!(FieldType::Text.coerce(&json!(5)), None);
        assert_eq!(FieldType::Uuid.coerce(&json!("not-a-uuid")), None);
        assert_eq!(FieldType::Float.coerce(&json!("1.5")), Some(json!(1.5)));
    }

    #[test]
    fn timestamps_are_normalized_to_utc() {
        let v = FieldType::Timestamp.coerce(&json!("2024-05-01T12:00:00+02:00"));
        assert_eq!(v, Some(json!("2024-05-01T10:00:00.000000Z")));
    }

    #[test]
    fn upper_trim_normalizes_names() {
        assert_eq!(Normalization::UpperTrim.apply(json!(" admin ")), json!("ADMIN"));
        assert_eq!(Normalization::UpperTrim.apply(json!(1)), json!(1));
    }

    #[test]
    fn route_entry_deserializes_with_defaults() {
        let entry: RouteConfigEntry = serde_json::from_value(json!({
            "route_name": "read-one",
            "is_activated": true,
            "roles": ["admin"]
        }))
        .unwrap();
        assert_eq!(entry.route_name, RouteName::ReadOne);
        assert!(entry.is_activated);
        assert!(!entry.is_protected);
        assert_eq!(entry.roles, vec!["admin".to_string()]);
    }
}
