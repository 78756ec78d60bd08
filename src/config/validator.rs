//! Config validation: referential integrity and route consistency.

use crate::config::{EntityConfig, FieldConfig, FullConfig};
use crate::config::resolved::DEFAULT_PRIMARY_KEY;
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

pub fn validate_entity(entity: &EntityConfig) -> Result<(), ConfigError> {
    if entity.name.trim().is_empty() || entity.table.trim().is_empty() {
        return Err(ConfigError::Validation("entity name and table are required".into()));
    }
    let mut column_names = HashSet::new();
    for c in &entity.columns {
        if !column_names.insert(c.name.as_str()) {
            return Err(ConfigError::Duplicate {
                kind: "column",
                name: format!("{}.{}", entity.name, c.name),
            });
        }
    }
    let pk = entity.primary_key.as_deref().unwrap_or(DEFAULT_PRIMARY_KEY);
    if !column_names.contains(pk) {
        return Err(ConfigError::InvalidPrimaryKey {
            entity: entity.name.clone(),
            column: pk.to_string(),
        });
    }
    for group in &entity.unique_together {
        if group.is_empty() {
            return Err(ConfigError::Validation(format!("empty unique group on entity {}", entity.name)));
        }
        if let Some(missing) = group.iter().find(|c| !column_names.contains(c.as_str())) {
            return Err(ConfigError::MissingReference {
                kind: "column",
                id: format!("{}.{}", entity.name, missing),
            });
        }
    }
    for fields in [&entity.create, &entity.update, &entity.patch].into_iter().flatten() {
        validate_fields(entity, &column_names, fields)?;
    }
    Ok(())
}

fn validate_fields(
    entity: &EntityConfig,
    column_names: &HashSet<&str>,
    fields: &HashMap<String, FieldConfig>,
) -> Result<(), ConfigError> {
    for (name, field) in fields {
        if !column_names.contains(name.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "column",
                id: format!("{}.{}", entity.name, name),
            });
        }
        if let Some(pattern) = &field.rule.pattern {
            regex::Regex::new(pattern)
                .map_err(|e| ConfigError::Validation(format!("invalid pattern for {}.{}: {}", entity.name, name, e)))?;
        }
    }
    Ok(())
}

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let mut entity_names = HashSet::new();
    for e in &config.entities {
        validate_entity(e)?;
        if !entity_names.insert(e.name.as_str()) {
            return Err(ConfigError::Duplicate {
                kind: "entity",
                name: e.name.clone(),
            });
        }
    }

    let mut base_paths = HashSet::new();
    for r in &config.routes {
        if !entity_names.contains(r.entity.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "entity",
                id: r.entity.clone(),
            });
        }
        if !base_paths.insert(r.base_path.as_str()) {
            return Err(ConfigError::Duplicate {
                kind: "base path",
                name: r.base_path.clone(),
            });
        }
        let mut route_names = HashSet::new();
        for route in &r.routes {
            if !route_names.insert(route.route_name.as_str()) {
                return Err(ConfigError::Duplicate {
                    kind: "route",
                    name: format!("{} {}", r.entity, route.route_name),
                });
            }
            check_names(&route.roles, "role")?;
            check_names(&route.privileges, "privilege")?;
        }
        for auth in &r.authorizations {
            check_names(&auth.roles, "role")?;
            check_names(&auth.privileges, "privilege")?;
        }
    }
    Ok(())
}

/// Role and privilege names must be non-empty after trimming.
pub fn check_names(names: &[String], kind: &str) -> Result<(), ConfigError> {
    if names.iter().any(|n| n.trim().is_empty()) {
        return Err(ConfigError::Validation(format!("{} names must not be empty", kind)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnConfig, EntityRoutesConfig, FieldType, RouteConfigEntry};
    use crate::routes::RouteName;

    fn entity(pk: Option<&str>) -> EntityConfig {
        EntityConfig {
            name: "book".into(),
            schema: None,
            table: "books".into(),
            primary_key: pk.map(String::from),
            columns: vec![
                ColumnConfig {
                    name: "id".into(),
                    type_: FieldType::Integer,
                    nullable: false,
                    generated: true,
                    unique: false,
                },
                ColumnConfig {
                    name: "title".into(),
                    type_: FieldType::Text,
                    nullable: false,
                    generated: false,
                    unique: false,
                },
            ],
            unique_together: Vec::new(),
            create: None,
            update: None,
            patch: None,
        }
    }

    #[test]
    fn unique_groups_must_name_columns() {
        let mut e = entity(None);
        e.unique_together = vec![vec!["id".into(), "title".into()]];
        assert!(validate_entity(&e).is_ok());
        e.unique_together = vec![vec!["title".into(), "author".into()]];
        assert!(matches!(
            validate_entity(&e),
            Err(ConfigError::MissingReference { ref id, .. }) if id == "book.author"
        ));
        e.unique_together = vec![vec![]];
        assert!(matches!(validate_entity(&e), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn primary_key_defaults_to_id() {
        assert!(validate_entity(&entity(None)).is_ok());
        assert!(matches!(
            validate_entity(&entity(Some("isbn"))),
            Err(ConfigError::InvalidPrimaryKey { .. })
        ));
    }

    #[test]
    fn rejects_blank_role_names() {
        let config = FullConfig {
            entities: vec![entity(None)],
            routes: vec![EntityRoutesConfig {
                entity: "book".into(),
                base_path: "/books".into(),
                routes: vec![RouteConfigEntry::new(RouteName::Create).roles(["  "])],
                authorizations: vec![],
            }],
        };
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_routes_for_unknown_entities() {
        let config = FullConfig {
            entities: vec![entity(None)],
            routes: vec![EntityRoutesConfig {
                entity: "author".into(),
                base_path: "/authors".into(),
                routes: vec![],
                authorizations: vec![],
            }],
        };
        assert!(matches!(validate(&config), Err(ConfigError::MissingReference { .. })));
    }
}
