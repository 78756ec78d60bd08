//! Load config from a directory of JSON files and resolve it into runtime descriptors.

use crate::config::resolved::{
    ColumnInfo, EntityDescriptor, EntityRoutes, FieldRule, InputSchema, ResolvedModel, SchemaVariant,
    DEFAULT_PRIMARY_KEY,
};
use crate::config::types::*;
use crate::config::{validate, validate_entity};
use crate::error::ConfigError;
use crate::routes::RouteConfig;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Build resolved model from full config (validates first).
pub fn resolve(config: &FullConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;
    let mut model = ResolvedModel::default();
    for e in &config.entities {
        model = model.with_entity(resolve_entity(e)?);
    }
    for r in &config.routes {
        let entity = model
            .entity(&r.entity)
            .cloned()
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "entity",
                id: r.entity.clone(),
            })?;
        let routes = resolve_routes(&r.routes, &r.authorizations)?;
        model = model.with_routes(EntityRoutes {
            entity,
            base_path: r.base_path.clone(),
            routes,
        });
    }
    Ok(model)
}

/// Resolve one entity config: primary key defaulted, input variants derived or converted.
pub fn resolve_entity(config: &EntityConfig) -> Result<EntityDescriptor, ConfigError> {
    validate_entity(config)?;
    let columns: Vec<ColumnInfo> = config
        .columns
        .iter()
        .map(|c| ColumnInfo {
            name: c.name.clone(),
            field_type: c.type_,
            nullable: c.nullable,
            generated: c.generated,
            unique: c.unique,
        })
        .collect();
    let schema = |variant: SchemaVariant, fields: &Option<HashMap<String, FieldConfig>>| match fields {
        Some(fields) => InputSchema {
            variant,
            fields: fields
                .iter()
                .map(|(name, f)| {
                    let required = f.required.unwrap_or(variant == SchemaVariant::Update);
                    (
                        name.clone(),
                        FieldRule {
                            required: required && variant != SchemaVariant::Patch,
                            default: f.default.clone(),
                            normalize: f.normalize,
                            rule: f.rule.clone(),
                        },
                    )
                })
                .collect(),
        },
        None => InputSchema::derive(variant, &columns),
    };
    Ok(EntityDescriptor {
        name: config.name.clone(),
        schema_name: config.schema.clone(),
        table_name: config.table.clone(),
        primary_key: config
            .primary_key
            .clone()
            .unwrap_or_else(|| DEFAULT_PRIMARY_KEY.to_string()),
        create: schema(SchemaVariant::Create, &config.create),
        update: schema(SchemaVariant::Update, &config.update),
        patch: schema(SchemaVariant::Patch, &config.patch),
        unique_together: config.unique_together.clone(),
        columns,
    })
}

/// Merge authorization overrides into route entries, then resolve each entry.
pub fn resolve_routes(
    entries: &[RouteConfigEntry],
    authorizations: &[AuthorizationConfig],
) -> Result<Vec<RouteConfig>, ConfigError> {
    entries
        .iter()
        .map(|entry| {
            let mut entry = entry.clone();
            for auth in authorizations.iter().filter(|a| a.route_name == entry.route_name) {
                entry.roles.extend(auth.roles.iter().cloned());
                entry.privileges.extend(auth.privileges.iter().cloned());
            }
            RouteConfig::new(entry)
        })
        .collect()
}

/// Load `entities.json` and (optional) `routes.json` from a directory.
pub async fn load_from_dir(dir: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let dir = dir.as_ref();
    let entities: Vec<EntityConfig> = read_json(&dir.join("entities.json")).await?;
    let routes: Vec<EntityRoutesConfig> = match tokio::fs::try_exists(dir.join("routes.json")).await {
        Ok(true) => read_json(&dir.join("routes.json")).await?,
        _ => Vec::new(),
    };
    tracing::info!(entities = entities.len(), routes = routes.len(), dir = %dir.display(), "config loaded");
    Ok(FullConfig { entities, routes })
}

async fn read_json<T>(path: &Path) -> Result<T, ConfigError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}
