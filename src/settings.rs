//! Process settings from the environment, and tracing setup.

use crate::error::ConfigError;
use std::path::PathBuf;

pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost/crudgate";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    /// Schema of the authorization and audit tables.
    pub schema: String,
    pub max_connections: u32,
    pub bind: String,
    /// Directory holding `entities.json` and `routes.json`.
    pub config_dir: Option<PathBuf>,
    pub audit: bool,
    /// User granted the admin role at startup, so the authorization tables are reachable.
    pub admin_user: Option<i64>,
}

impl Settings {
    /// Reads `DATABASE_URL` and the `CRUDGATE_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let max_connections = match get("CRUDGATE_MAX_CONNECTIONS") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::Load(format!("CRUDGATE_MAX_CONNECTIONS must be a positive integer, got {}", v)))?,
            None => 5,
        };
        let audit = match get("CRUDGATE_AUDIT").map(|v| v.to_lowercase()) {
            None => true,
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
            Some(v) => return Err(ConfigError::Load(format!("CRUDGATE_AUDIT must be a boolean, got {}", v))),
        };
        let admin_user = match get("CRUDGATE_ADMIN_USER") {
            Some(v) => Some(
                v.parse()
                    .map_err(|_| ConfigError::Load(format!("CRUDGATE_ADMIN_USER must be a user id, got {}", v)))?,
            ),
            None => None,
        };
        Ok(Settings {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            schema: get("CRUDGATE_SCHEMA").unwrap_or_else(|| "public".into()),
            max_connections,
            bind: get("CRUDGATE_BIND").unwrap_or_else(|| "0.0.0.0:3000".into()),
            config_dir: get("CRUDGATE_CONFIG_DIR").map(PathBuf::from),
            audit,
            admin_user,
        })
    }
}

/// Install the global fmt subscriber; `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(s.schema, "public");
        assert_eq!(s.max_connections, 5);
        assert_eq!(s.bind, "0.0.0.0:3000");
        assert_eq!(s.config_dir, None);
        assert!(s.audit);
        assert_eq!(s.admin_user, None);
    }

    #[test]
    fn values_are_read_and_parsed() {
        let s = settings(&[
            ("CRUDGATE_MAX_CONNECTIONS", "12"),
            ("CRUDGATE_AUDIT", "off"),
            ("CRUDGATE_CONFIG_DIR", "/etc/crudgate"),
            ("CRUDGATE_ADMIN_USER", "1"),
        ])
        .unwrap();
        assert_eq!(s.admin_user, Some(1));
        assert_eq!(s.max_connections, 12);
        assert!(!s.audit);
        assert_eq!(s.config_dir, Some(PathBuf::from("/etc/crudgate")));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        assert!(settings(&[("CRUDGATE_MAX_CONNECTIONS", "many")]).is_err());
        assert!(settings(&[("CRUDGATE_AUDIT", "maybe")]).is_err());
        assert!(settings(&[("CRUDGATE_ADMIN_USER", "root")]).is_err());
    }
}
