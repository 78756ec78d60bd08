//! Input validation against an entity's create/update/patch schemas.

use crate::config::{EntityDescriptor, FieldRule, SchemaVariant, ValidationRule};
use crate::error::AppError;
use regex::Regex;
use serde_json::{Map, Value};

/// An input object tagged with the schema variant it claims to conform to.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityInput {
    pub variant: SchemaVariant,
    pub fields: Map<String, Value>,
}

impl EntityInput {
    pub fn new(variant: SchemaVariant, body: Value) -> Result<Self, AppError> {
        match body {
            Value::Object(fields) => Ok(EntityInput { variant, fields }),
            _ => Err(AppError::Validation("body must be a JSON object".into())),
        }
    }

    pub fn create(body: Value) -> Result<Self, AppError> {
        Self::new(SchemaVariant::Create, body)
    }

    pub fn update(body: Value) -> Result<Self, AppError> {
        Self::new(SchemaVariant::Update, body)
    }

    pub fn patch(body: Value) -> Result<Self, AppError> {
        Self::new(SchemaVariant::Patch, body)
    }
}

pub struct RequestValidator;

impl RequestValidator {
    /// Check `input` against the `expected` variant of the entity and return the cleaned
    /// fields: coerced to column types, normalized, with create defaults applied.
    pub fn validate(
        entity: &EntityDescriptor,
        input: &EntityInput,
        expected: SchemaVariant,
    ) -> Result<Map<String, Value>, AppError> {
        if input.variant != expected {
            return Err(AppError::Validation(format!(
                "Invalid {} object for {}: expected {} input, got {}",
                entity.name,
                operation_name(expected),
                expected,
                input.variant
            )));
        }
        let schema = entity.schema(expected);
        if let Some(unknown) = input.fields.keys().find(|k| !schema.fields.contains_key(k.as_str())) {
            return Err(AppError::Validation(format!(
                "{} is not an accepted field for {} {}",
                unknown,
                entity.name,
                operation_name(expected)
            )));
        }

        let mut out = Map::new();
        for (name, rule) in &schema.fields {
            let supplied = input.fields.get(name).cloned();
            let value = match supplied {
                Some(v) => v,
                None => match (&rule.default, expected) {
                    (Some(d), SchemaVariant::Create) => d.clone(),
                    _ if rule.required => {
                        return Err(AppError::Validation(format!("{} is required", name)));
                    }
                    _ => continue,
                },
            };
            let value = clean_field(entity, name, rule, value)?;
            out.insert(name.clone(), value);
        }
        Ok(out)
    }
}

fn operation_name(variant: SchemaVariant) -> &'static str {
    match variant {
        SchemaVariant::Create => "creation",
        SchemaVariant::Update => "update",
        SchemaVariant::Patch => "partial update",
    }
}

fn clean_field(entity: &EntityDescriptor, name: &str, rule: &FieldRule, value: Value) -> Result<Value, AppError> {
    let column = entity
        .column(name)
        .ok_or_else(|| AppError::Validation(format!("{} is not a column of {}", name, entity.name)))?;
    if value.is_null() {
        if rule.required || !column.nullable {
            return Err(AppError::Validation(format!("{} must not be null", name)));
        }
        return Ok(Value::Null);
    }
    let value = column
        .field_type
        .coerce(&value)
        .ok_or_else(|| AppError::Validation(format!("{} must be {}", name, column.field_type.name())))?;
    let value = match rule.normalize {
        Some(n) => n.apply(value),
        None => value,
    };
    validate_field(name, &value, &rule.rule)?;
    Ok(value)
}

fn validate_field(col: &str, v: &Value, rule: &ValidationRule) -> Result<(), AppError> {
    if let Some(format) = &rule.format {
        validate_format(col, v, format)?;
    }
    if let Some(max) = rule.max_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() > max as usize {
                return Err(AppError::Validation(format!(
                    "{} must be at most {} characters",
                    col, max
                )));
            }
        }
    }
    if let Some(min) = rule.min_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() < min as usize {
                return Err(AppError::Validation(format!(
                    "{} must be at least {} characters",
                    col, min
                )));
            }
        }
    }
    if let Some(ref pattern) = rule.pattern {
        let re = Regex::new(pattern).map_err(|_| AppError::Validation(format!("invalid pattern for {}", col)))?;
        if let Some(s) = v.as_str() {
            if !re.is_match(s) {
                return Err(AppError::Validation(format!("{} does not match required pattern", col)));
            }
        }
    }
    if let Some(ref allowed) = rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(AppError::Validation(format!(
                "{} must be one of: {:?}",
                col,
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    if let Some(min) = rule.minimum {
        if let Some(n) = v.as_f64() {
            if n < min {
                return Err(AppError::Validation(format!("{} must be at least {}", col, min)));
            }
        }
    }
    if let Some(max) = rule.maximum {
        if let Some(n) = v.as_f64() {
            if n > max {
                return Err(AppError::Validation(format!("{} must be at most {}", col, max)));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(col: &str, v: &Value, format: &str) -> Result<(), AppError> {
    match format.to_lowercase().as_str() {
        "email" => {
            if let Some(s) = v.as_str() {
                if !s.contains('@') || s.len() < 3 {
                    return Err(AppError::Validation(format!("{} must be a valid email", col)));
                }
            }
        }
        "uuid" => {
            if let Some(s) = v.as_str() {
                if uuid::Uuid::parse_str(s).is_err() {
                    return Err(AppError::Validation(format!("{} must be a valid UUID", col)));
                }
            }
        }
        _ => {}
    }
    Ok(())
}
