//! Route declarations: logical route names, path resolution and authorization requirements.

use crate::authorization::AuthorizationCheck;
use crate::config::{check_names, RouteConfigEntry};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical operation exposed for an entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RouteName {
    Count,
    ReadAll,
    ReadOne,
    Create,
    BulkCreate,
    BulkDelete,
    Update,
    Patch,
    Delete,
    /// Application-defined route mounted by the caller, e.g. "export".
    Custom(String),
}

/// Routes addressing one row; mounted at `{path}/:pk`.
pub const DETAIL_ROUTES: [RouteName; 4] = [RouteName::Delete, RouteName::Update, RouteName::ReadOne, RouteName::Patch];

/// Collection-root routes; mounted at the entity base path.
pub const NO_DETAIL_ROUTES: [RouteName; 2] = [RouteName::ReadAll, RouteName::Create];

/// Every built-in route, in mounting order.
pub const DEFAULT_ROUTE_NAMES: [RouteName; 9] = [
    RouteName::Count,
    RouteName::ReadAll,
    RouteName::ReadOne,
    RouteName::Create,
    RouteName::BulkCreate,
    RouteName::BulkDelete,
    RouteName::Update,
    RouteName::Patch,
    RouteName::Delete,
];

impl RouteName {
    pub fn as_str(&self) -> &str {
        match self {
            RouteName::Count => "count",
            RouteName::ReadAll => "read-all",
            RouteName::ReadOne => "read-one",
            RouteName::Create => "create",
            RouteName::BulkCreate => "bulk-create",
            RouteName::BulkDelete => "bulk-delete",
            RouteName::Update => "update",
            RouteName::Patch => "patch",
            RouteName::Delete => "delete",
            RouteName::Custom(name) => name,
        }
    }

    pub fn is_detail(&self) -> bool {
        DETAIL_ROUTES.contains(self)
    }

    pub fn is_no_detail(&self) -> bool {
        NO_DETAIL_ROUTES.contains(self)
    }

    pub fn default_summary(&self, entity: &str) -> String {
        match self {
            RouteName::Count => format!("Get count of {}", entity),
            RouteName::ReadAll => format!("Get all {}", entity),
            RouteName::ReadOne => format!("Retrieve {}", entity),
            RouteName::Create => format!("Create {}", entity),
            RouteName::BulkCreate => format!("Create {} in bulk", entity),
            RouteName::BulkDelete => format!("Delete {} in bulk", entity),
            RouteName::Update => format!("Update {}", entity),
            RouteName::Patch => format!("Patch {}", entity),
            RouteName::Delete => format!("Delete {}", entity),
            RouteName::Custom(name) => format!("{} {}", name, entity),
        }
    }

    pub fn default_description(&self, entity: &str) -> String {
        match self {
            RouteName::Count => format!("Return the total number of {} rows", entity),
            RouteName::ReadAll => format!("List {} rows, optionally filtered and paged", entity),
            RouteName::ReadOne => format!("Retrieve one {} by primary key", entity),
            RouteName::Create => format!("Create a new {}", entity),
            RouteName::BulkCreate => format!("Create several {} rows atomically", entity),
            RouteName::BulkDelete => format!("Delete several {} rows atomically", entity),
            RouteName::Update => format!("Replace all fields of one {}", entity),
            RouteName::Patch => format!("Update some fields of one {}", entity),
            RouteName::Delete => format!("Delete one {}", entity),
            RouteName::Custom(name) => format!("{} for {}", name, entity),
        }
    }
}

impl From<String> for RouteName {
    fn from(s: String) -> Self {
        match s.as_str() {
            "count" => RouteName::Count,
            "read-all" | "list-all" | "list" => RouteName::ReadAll,
            "read-one" => RouteName::ReadOne,
            "create" => RouteName::Create,
            "bulk-create" => RouteName::BulkCreate,
            "bulk-delete" => RouteName::BulkDelete,
            "update" => RouteName::Update,
            "patch" => RouteName::Patch,
            "delete" => RouteName::Delete,
            _ => RouteName::Custom(s),
        }
    }
}

impl From<&str> for RouteName {
    fn from(s: &str) -> Self {
        RouteName::from(s.to_string())
    }
}

impl From<RouteName> for String {
    fn from(r: RouteName) -> Self {
        r.as_str().to_string()
    }
}

impl fmt::Display for RouteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved route: final path and normalized requirements. Read-only after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteConfig {
    pub route_name: RouteName,
    pub route_path: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub is_activated: bool,
    pub is_protected: bool,
    pub is_unlocked: bool,
    /// Upper-cased, trimmed, deduplicated.
    pub roles: Vec<String>,
    pub privileges: Vec<String>,
}

impl RouteConfig {
    pub fn new(entry: RouteConfigEntry) -> Result<Self, ConfigError> {
        check_names(&entry.roles, "role")?;
        check_names(&entry.privileges, "privilege")?;
        Ok(RouteConfig {
            route_path: Self::resolve_path(&entry.route_name, entry.route_path.as_deref()),
            route_name: entry.route_name,
            summary: entry.summary,
            description: entry.description,
            is_activated: entry.is_activated,
            is_protected: entry.is_protected,
            is_unlocked: entry.is_unlocked,
            roles: normalize_names(&entry.roles),
            privileges: normalize_names(&entry.privileges),
        })
    }

    /// Explicit path wins; detail and no-detail routes mount at the base path;
    /// anything else at `/<route_name>`.
    pub fn resolve_path(route_name: &RouteName, route_path: Option<&str>) -> String {
        match route_path {
            Some(p) if !p.is_empty() => p.to_string(),
            _ if route_name.is_detail() || route_name.is_no_detail() => String::new(),
            _ => format!("/{}", route_name),
        }
    }

    /// Ordered checks: one for the role set (any role), then one per privilege.
    pub fn authorization_checks(&self) -> Vec<AuthorizationCheck> {
        let mut checks = Vec::with_capacity(self.privileges.len() + 1);
        if !self.roles.is_empty() {
            checks.push(AuthorizationCheck::AnyRole(self.roles.clone()));
        }
        checks.extend(self.privileges.iter().cloned().map(AuthorizationCheck::Privilege));
        checks
    }

    pub fn summary_for(&self, entity: &str) -> String {
        self.summary
            .clone()
            .unwrap_or_else(|| self.route_name.default_summary(entity))
    }

    pub fn description_for(&self, entity: &str) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| self.route_name.default_description(entity))
    }
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_uppercase()
}

fn normalize_names(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for n in names.iter().map(|n| normalize_name(n)) {
        if !out.contains(&n) {
            out.push(n);
        }
    }
    out
}

/// Every built-in route, activated, with the given protection.
pub fn default_routes(is_protected: bool) -> Vec<RouteConfigEntry> {
    DEFAULT_ROUTE_NAMES
        .iter()
        .cloned()
        .map(|name| {
            let mut entry = RouteConfigEntry::new(name).activated();
            entry.is_protected = is_protected;
            entry
        })
        .collect()
}
