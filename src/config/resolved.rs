//! Resolved entity model: config validated and flattened for runtime use.

use crate::config::{FieldType, Normalization, ValidationRule};
use crate::routes::RouteConfig;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Conventional primary key attribute when none is declared.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub generated: bool,
    pub unique: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        ColumnInfo {
            name: name.into(),
            field_type,
            nullable: true,
            generated: false,
            unique: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Which of the three input shapes an input claims to conform to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SchemaVariant {
    Create,
    Update,
    Patch,
}

impl fmt::Display for SchemaVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchemaVariant::Create => "create",
            SchemaVariant::Update => "update",
            SchemaVariant::Patch => "patch",
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldRule {
    pub required: bool,
    pub default: Option<Value>,
    pub normalize: Option<Normalization>,
    pub rule: ValidationRule,
}

impl FieldRule {
    pub fn required() -> Self {
        FieldRule {
            required: true,
            ..Default::default()
        }
    }

    pub fn optional() -> Self {
        FieldRule::default()
    }

    pub fn with_default(mut self, v: Value) -> Self {
        self.default = Some(v);
        self
    }

    pub fn normalized(mut self, n: Normalization) -> Self {
        self.normalize = Some(n);
        self
    }

    pub fn min_length(mut self, n: u32) -> Self {
        self.rule.min_length = Some(n);
        self
    }
}

/// One input shape (create, full update or partial update) of an entity.
#[derive(Clone, Debug, PartialEq)]
pub struct InputSchema {
    pub variant: SchemaVariant,
    pub fields: HashMap<String, FieldRule>,
}

impl InputSchema {
    /// Derive a variant from columns: store-generated columns are not accepted;
    /// create requires non-nullable columns, update requires all, patch requires none.
    pub fn derive(variant: SchemaVariant, columns: &[ColumnInfo]) -> Self {
        let fields = columns
            .iter()
            .filter(|c| !c.generated)
            .map(|c| {
                let required = match variant {
                    SchemaVariant::Create => !c.nullable,
                    SchemaVariant::Update => true,
                    SchemaVariant::Patch => false,
                };
                (
                    c.name.clone(),
                    FieldRule {
                        required,
                        ..Default::default()
                    },
                )
            })
            .collect();
        InputSchema { variant, fields }
    }
}

/// Static metadata of one entity type. Immutable after construction.
#[derive(Clone, Debug)]
pub struct EntityDescriptor {
    pub name: String,
    pub schema_name: Option<String>,
    pub table_name: String,
    pub primary_key: String,
    pub columns: Vec<ColumnInfo>,
    /// Composite unique constraints, each a group of column names.
    pub unique_together: Vec<Vec<String>>,
    pub create: InputSchema,
    pub update: InputSchema,
    pub patch: InputSchema,
}

impl EntityDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Primary key column. Presence is checked when the descriptor is resolved.
    pub fn pk_column(&self) -> Option<&ColumnInfo> {
        self.column(&self.primary_key)
    }

    pub fn with_unique_together<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_together.push(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn pk_type(&self) -> FieldType {
        self.pk_column().map(|c| c.field_type).unwrap_or(FieldType::Integer)
    }

    pub fn schema(&self, variant: SchemaVariant) -> &InputSchema {
        match variant {
            SchemaVariant::Create => &self.create,
            SchemaVariant::Update => &self.update,
            SchemaVariant::Patch => &self.patch,
        }
    }

    /// Schema-qualified table key, e.g. "public.roles".
    pub fn qualified_name(&self) -> String {
        match &self.schema_name {
            Some(s) => format!("{}.{}", s, self.table_name),
            None => self.table_name.clone(),
        }
    }
}

/// Resolved routes of one entity, mounted at base_path.
#[derive(Clone, Debug)]
pub struct EntityRoutes {
    pub entity: Arc<EntityDescriptor>,
    pub base_path: String,
    pub routes: Vec<RouteConfig>,
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedModel {
    pub entities: Vec<Arc<EntityDescriptor>>,
    pub entity_by_name: HashMap<String, Arc<EntityDescriptor>>,
    pub routes: Vec<EntityRoutes>,
}

impl ResolvedModel {
    pub fn entity(&self, name: &str) -> Option<&Arc<EntityDescriptor>> {
        self.entity_by_name.get(name)
    }

    /// Register a descriptor built in code (e.g. the authorization entities).
    pub fn with_entity(mut self, entity: EntityDescriptor) -> Self {
        let entity = Arc::new(entity);
        self.entity_by_name.insert(entity.name.clone(), entity.clone());
        self.entities.push(entity);
        self
    }

    pub fn with_routes(mut self, routes: EntityRoutes) -> Self {
        self.routes.push(routes);
        self
    }
}
