//! Role and privilege entities, their user memberships and role→privilege aggregation.
//! All persistence goes through [`CrudEngine`] like any other entity.

use crate::authorization::{MembershipResolver, UserId};
use crate::config::{ColumnInfo, EntityDescriptor, FieldRule, FieldType, InputSchema, Normalization, SchemaVariant};
use crate::error::AppError;
use crate::service::{CrudEngine, EntityInput};
use crate::store::SessionFactory;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// The two kinds of named, describable, activatable, user-linkable authorization unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrincipalKind {
    Role,
    Privilege,
}

impl PrincipalKind {
    pub fn entity_name(&self) -> &'static str {
        match self {
            PrincipalKind::Role => "role",
            PrincipalKind::Privilege => "privilege",
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            PrincipalKind::Role => "roles",
            PrincipalKind::Privilege => "privileges",
        }
    }

    pub fn membership_table(&self) -> &'static str {
        match self {
            PrincipalKind::Role => "user_roles",
            PrincipalKind::Privilege => "user_privileges",
        }
    }

    /// Foreign key column of memberships and role links.
    pub fn key_column(&self) -> &'static str {
        match self {
            PrincipalKind::Role => "role_id",
            PrincipalKind::Privilege => "privilege_id",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub is_active: bool,
}

/// A user's grant of a role or privilege; suspended when `is_active` is false.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Membership {
    pub id: i64,
    pub kind: PrincipalKind,
    pub user_id: i64,
    pub principal_id: i64,
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePrivilege {
    pub id: i64,
    pub role_id: i64,
    pub privilege_id: i64,
    pub is_active: bool,
}

impl Serialize for PrincipalKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.entity_name())
    }
}

fn from_row<T: for<'de> Deserialize<'de>>(entity: &str, row: Value) -> Result<T, AppError> {
    serde_json::from_value(row).map_err(|e| AppError::Unexpected(format!("malformed {} row: {}", entity, e)))
}

impl Membership {
    fn from_row(kind: PrincipalKind, row: &Value) -> Result<Self, AppError> {
        let int = |col: &str| {
            row.get(col)
                .and_then(Value::as_i64)
                .ok_or_else(|| AppError::Unexpected(format!("malformed {} row: missing {}", kind.membership_table(), col)))
        };
        Ok(Membership {
            id: int("id")?,
            kind,
            user_id: int("user_id")?,
            principal_id: int(kind.key_column())?,
            is_active: row.get("is_active").and_then(Value::as_bool).unwrap_or(false),
        })
    }
}

fn serial_id() -> ColumnInfo {
    ColumnInfo::new("id", FieldType::Integer).not_null().generated()
}

fn is_active() -> ColumnInfo {
    ColumnInfo::new("is_active", FieldType::Boolean).not_null()
}

fn descriptor(name: &str, schema: Option<&str>, table: &str, columns: Vec<ColumnInfo>, create: InputSchema) -> EntityDescriptor {
    EntityDescriptor {
        name: name.to_string(),
        schema_name: schema.map(String::from),
        table_name: table.to_string(),
        primary_key: "id".to_string(),
        update: InputSchema::derive(SchemaVariant::Update, &columns),
        patch: InputSchema::derive(SchemaVariant::Patch, &columns),
        create,
        unique_together: Vec::new(),
        columns,
    }
}

/// Roles and privileges: name unique and stored trimmed upper-case.
pub fn principal_descriptor(kind: PrincipalKind, schema: Option<&str>) -> EntityDescriptor {
    let columns = vec![
        serial_id(),
        ColumnInfo::new("name", FieldType::Text).not_null().unique(),
        ColumnInfo::new("description", FieldType::Text).not_null(),
        is_active(),
    ];
    let name = || FieldRule::required().normalized(Normalization::UpperTrim).min_length(1);
    let mut d = descriptor(
        kind.entity_name(),
        schema,
        kind.table_name(),
        columns,
        InputSchema {
            variant: SchemaVariant::Create,
            fields: [
                ("name".to_string(), name()),
                ("description".to_string(), FieldRule::required()),
                ("is_active".to_string(), FieldRule::optional().with_default(json!(true))),
            ]
            .into_iter()
            .collect(),
        },
    );
    d.update.fields.insert("name".into(), name());
    d.patch.fields.insert("name".into(), FieldRule { required: false, ..name() });
    d
}

pub fn role_privilege_descriptor(schema: Option<&str>) -> EntityDescriptor {
    let columns = vec![
        serial_id(),
        ColumnInfo::new("role_id", FieldType::Integer).not_null(),
        ColumnInfo::new("privilege_id", FieldType::Integer).not_null(),
        is_active(),
    ];
    let mut create = InputSchema::derive(SchemaVariant::Create, &columns);
    create.fields.insert("is_active".into(), FieldRule::optional().with_default(json!(true)));
    descriptor("role_privilege", schema, "role_privileges", columns, create)
        .with_unique_together(["role_id", "privilege_id"])
}

pub fn membership_descriptor(kind: PrincipalKind, schema: Option<&str>) -> EntityDescriptor {
    let columns = vec![
        serial_id(),
        ColumnInfo::new("user_id", FieldType::Integer).not_null(),
        ColumnInfo::new(kind.key_column(), FieldType::Integer).not_null(),
        is_active(),
    ];
    let mut create = InputSchema::derive(SchemaVariant::Create, &columns);
    create.fields.insert("is_active".into(), FieldRule::optional().with_default(json!(true)));
    let name = match kind {
        PrincipalKind::Role => "user_role",
        PrincipalKind::Privilege => "user_privilege",
    };
    descriptor(name, schema, kind.membership_table(), columns, create)
        .with_unique_together(["user_id", kind.key_column()])
}

/// Persistence and queries for roles, privileges and their memberships.
#[derive(Clone)]
pub struct AuthorizationModel {
    roles: CrudEngine,
    privileges: CrudEngine,
    role_privileges: CrudEngine,
    user_roles: CrudEngine,
    user_privileges: CrudEngine,
}

impl AuthorizationModel {
    pub fn new(sessions: Arc<dyn SessionFactory>, schema: Option<&str>) -> Self {
        let engine = |d: EntityDescriptor| CrudEngine::new(Arc::new(d), sessions.clone());
        AuthorizationModel {
            roles: engine(principal_descriptor(PrincipalKind::Role, schema)),
            privileges: engine(principal_descriptor(PrincipalKind::Privilege, schema)),
            role_privileges: engine(role_privilege_descriptor(schema)),
            user_roles: engine(membership_descriptor(PrincipalKind::Role, schema)),
            user_privileges: engine(membership_descriptor(PrincipalKind::Privilege, schema)),
        }
    }

    pub fn principals(&self, kind: PrincipalKind) -> &CrudEngine {
        match kind {
            PrincipalKind::Role => &self.roles,
            PrincipalKind::Privilege => &self.privileges,
        }
    }

    pub fn memberships(&self, kind: PrincipalKind) -> &CrudEngine {
        match kind {
            PrincipalKind::Role => &self.user_roles,
            PrincipalKind::Privilege => &self.user_privileges,
        }
    }

    pub fn role_privilege_links(&self) -> &CrudEngine {
        &self.role_privileges
    }

    /// Every descriptor owned by the model, for migrations and route mounting.
    pub fn descriptors(&self) -> Vec<EntityDescriptor> {
        [
            &self.roles,
            &self.privileges,
            &self.role_privileges,
            &self.user_roles,
            &self.user_privileges,
        ]
        .iter()
        .map(|e| e.entity().clone())
        .collect()
    }

    pub async fn create_principal(&self, kind: PrincipalKind, name: &str, description: &str) -> Result<Principal, AppError> {
        let input = EntityInput::create(json!({ "name": name, "description": description }))?;
        let row = self.principals(kind).create(&input).await?;
        from_row(kind.entity_name(), row)
    }

    pub async fn principal(&self, kind: PrincipalKind, id: i64) -> Result<Principal, AppError> {
        let row = self.principals(kind).read_one(&json!(id)).await?;
        from_row(kind.entity_name(), row)
    }

    /// Lookup by name, compared case-insensitively.
    pub async fn find_principal(&self, kind: PrincipalKind, name: &str) -> Result<Option<Principal>, AppError> {
        let name = json!(name.trim().to_uppercase());
        let rows = self.principals(kind).read_all(Some("name"), Some(&name), 0, Some(1)).await?;
        rows.into_iter().next().map(|r| from_row(kind.entity_name(), r)).transpose()
    }

    /// Grant the named role to `user`, creating or re-activating the role first.
    /// Safe to run on every startup.
    pub async fn ensure_role_grant(&self, user: UserId, name: &str, description: &str) -> Result<Membership, AppError> {
        let role = match self.find_principal(PrincipalKind::Role, name).await? {
            Some(role) if role.is_active => role,
            Some(role) => self.set_principal_active(PrincipalKind::Role, role.id, true).await?,
            None => self.create_principal(PrincipalKind::Role, name, description).await?,
        };
        self.grant(PrincipalKind::Role, user, role.id).await
    }

    pub async fn set_principal_active(&self, kind: PrincipalKind, id: i64, active: bool) -> Result<Principal, AppError> {
        let input = EntityInput::patch(json!({ "is_active": active }))?;
        let row = self.principals(kind).update(&json!(id), &input, false).await?;
        from_row(kind.entity_name(), row)
    }

    /// Make `privilege_id` part of what `role_id` grants. Re-activates an existing link.
    pub async fn attach_privilege(&self, role_id: i64, privilege_id: i64) -> Result<RolePrivilege, AppError> {
        self.principal(PrincipalKind::Role, role_id).await?;
        self.principal(PrincipalKind::Privilege, privilege_id).await?;
        let existing = self
            .links_of(role_id)
            .await?
            .into_iter()
            .find(|l| l.privilege_id == privilege_id);
        let row = match existing {
            Some(link) => {
                let input = EntityInput::patch(json!({ "is_active": true }))?;
                self.role_privileges.update(&json!(link.id), &input, false).await?
            }
            None => {
                let input = EntityInput::create(json!({ "role_id": role_id, "privilege_id": privilege_id }))?;
                self.role_privileges.create(&input).await?
            }
        };
        from_row("role_privilege", row)
    }

    pub async fn set_link_active(&self, link_id: i64, active: bool) -> Result<RolePrivilege, AppError> {
        let input = EntityInput::patch(json!({ "is_active": active }))?;
        let row = self.role_privileges.update(&json!(link_id), &input, false).await?;
        from_row("role_privilege", row)
    }

    async fn links_of(&self, role_id: i64) -> Result<Vec<RolePrivilege>, AppError> {
        self.role_privileges
            .read_all(Some("role_id"), Some(&json!(role_id)), 0, None)
            .await?
            .into_iter()
            .map(|r| from_row("role_privilege", r))
            .collect()
    }

    /// Active privileges aggregated by a role through active links.
    pub async fn privileges_of_role(&self, role_id: i64) -> Result<Vec<Principal>, AppError> {
        let mut out = Vec::new();
        for link in self.links_of(role_id).await?.into_iter().filter(|l| l.is_active) {
            if let Some(p) = self.active_principal(PrincipalKind::Privilege, link.privilege_id).await? {
                out.push(p);
            }
        }
        Ok(out)
    }

    /// Grant a role or privilege to a user. Re-activates a suspended grant instead of
    /// creating a second one.
    pub async fn grant(&self, kind: PrincipalKind, user: UserId, principal_id: i64) -> Result<Membership, AppError> {
        self.principal(kind, principal_id).await?;
        let existing = self
            .memberships_of(kind, user)
            .await?
            .into_iter()
            .find(|m| m.principal_id == principal_id);
        let row = match existing {
            Some(m) => {
                let input = EntityInput::patch(json!({ "is_active": true }))?;
                self.memberships(kind).update(&json!(m.id), &input, false).await?
            }
            None => {
                let mut body = serde_json::Map::new();
                body.insert("user_id".into(), json!(user.0));
                body.insert(kind.key_column().into(), json!(principal_id));
                let input = EntityInput::create(Value::Object(body))?;
                self.memberships(kind).create(&input).await?
            }
        };
        Membership::from_row(kind, &row)
    }

    /// Suspend (`false`) or restore (`true`) a grant without deleting it.
    pub async fn set_membership_active(&self, kind: PrincipalKind, membership_id: i64, active: bool) -> Result<Membership, AppError> {
        let input = EntityInput::patch(json!({ "is_active": active }))?;
        let row = self.memberships(kind).update(&json!(membership_id), &input, false).await?;
        Membership::from_row(kind, &row)
    }

    pub async fn memberships_of(&self, kind: PrincipalKind, user: UserId) -> Result<Vec<Membership>, AppError> {
        self.memberships(kind)
            .read_all(Some("user_id"), Some(&json!(user.0)), 0, None)
            .await?
            .iter()
            .map(|r| Membership::from_row(kind, r))
            .collect()
    }

    /// Users linked to a role or privilege, suspended grants included.
    pub async fn members(&self, kind: PrincipalKind, principal_id: i64) -> Result<Vec<Membership>, AppError> {
        self.memberships(kind)
            .read_all(Some(kind.key_column()), Some(&json!(principal_id)), 0, None)
            .await?
            .iter()
            .map(|r| Membership::from_row(kind, r))
            .collect()
    }

    async fn active_principal(&self, kind: PrincipalKind, id: i64) -> Result<Option<Principal>, AppError> {
        match self.principal(kind, id).await {
            Ok(p) if p.is_active => Ok(Some(p)),
            Ok(_) | Err(AppError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn active_principals(&self, kind: PrincipalKind, user: UserId) -> Result<Vec<Principal>, AppError> {
        let mut out = Vec::new();
        for m in self.memberships_of(kind, user).await?.into_iter().filter(|m| m.is_active) {
            if let Some(p) = self.active_principal(kind, m.principal_id).await? {
                out.push(p);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl MembershipResolver for AuthorizationModel {
    async fn active_role_names(&self, user: UserId) -> Result<HashSet<String>, AppError> {
        Ok(self
            .active_principals(PrincipalKind::Role, user)
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect())
    }

    async fn active_privilege_names(&self, user: UserId) -> Result<HashSet<String>, AppError> {
        let mut names: HashSet<String> = self
            .active_principals(PrincipalKind::Privilege, user)
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect();
        for role in self.active_principals(PrincipalKind::Role, user).await? {
            names.extend(self.privileges_of_role(role.id).await?.into_iter().map(|p| p.name));
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn model() -> AuthorizationModel {
        AuthorizationModel::new(Arc::new(MemoryStore::new()), None)
    }

    #[tokio::test]
    async fn names_are_stored_trimmed_and_upper_cased() {
        let m = model();
        let role = m.create_principal(PrincipalKind::Role, " admin ", "administrators").await.unwrap();
        assert_eq!(role.name, "ADMIN");
        assert!(role.is_active);
        let found = m.find_principal(PrincipalKind::Role, "Admin").await.unwrap();
        assert_eq!(found, Some(role));
    }

    #[tokio::test]
    async fn duplicate_names_differing_in_case_are_rejected() {
        let m = model();
        m.create_principal(PrincipalKind::Privilege, "can_read", "").await.unwrap();
        let dup = m.create_principal(PrincipalKind::Privilege, "CAN_READ ", "").await;
        assert!(matches!(dup, Err(AppError::Storage { .. })));
    }

    #[tokio::test]
    async fn blank_names_are_invalid() {
        let m = model();
        let err = m.create_principal(PrincipalKind::Role, "   ", "").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn regranting_reactivates_the_existing_membership() {
        let m = model();
        let role = m.create_principal(PrincipalKind::Role, "editor", "").await.unwrap();
        let first = m.grant(PrincipalKind::Role, UserId(7), role.id).await.unwrap();
        m.set_membership_active(PrincipalKind::Role, first.id, false).await.unwrap();
        let again = m.grant(PrincipalKind::Role, UserId(7), role.id).await.unwrap();
        assert_eq!(again.id, first.id);
        assert!(again.is_active);
        assert_eq!(m.members(PrincipalKind::Role, role.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn granting_an_unknown_principal_is_not_found() {
        let m = model();
        let err = m.grant(PrincipalKind::Privilege, UserId(1), 42).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn role_privileges_skip_inactive_links_and_privileges() {
        let m = model();
        let role = m.create_principal(PrincipalKind::Role, "ops", "").await.unwrap();
        let read = m.create_principal(PrincipalKind::Privilege, "can_read", "").await.unwrap();
        let write = m.create_principal(PrincipalKind::Privilege, "can_write", "").await.unwrap();
        let purge = m.create_principal(PrincipalKind::Privilege, "can_purge", "").await.unwrap();
        m.attach_privilege(role.id, read.id).await.unwrap();
        let link = m.attach_privilege(role.id, write.id).await.unwrap();
        m.attach_privilege(role.id, purge.id).await.unwrap();
        m.set_link_active(link.id, false).await.unwrap();
        m.set_principal_active(PrincipalKind::Privilege, purge.id, false).await.unwrap();

        let names: Vec<String> = m.privileges_of_role(role.id).await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["CAN_READ".to_string()]);
    }

    #[tokio::test]
    async fn ensure_role_grant_is_idempotent() {
        let m = model();
        let first = m.ensure_role_grant(UserId(1), "admin", "bootstrap").await.unwrap();
        let role = m.find_principal(PrincipalKind::Role, "ADMIN").await.unwrap().unwrap();
        m.set_principal_active(PrincipalKind::Role, role.id, false).await.unwrap();
        m.set_membership_active(PrincipalKind::Role, first.id, false).await.unwrap();

        let again = m.ensure_role_grant(UserId(1), "admin", "bootstrap").await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(m.active_role_names(UserId(1)).await.unwrap(), HashSet::from(["ADMIN".to_string()]));
    }

    #[tokio::test]
    async fn duplicate_links_and_memberships_are_rejected_by_the_store() {
        let m = model();
        let role = m.create_principal(PrincipalKind::Role, "ops", "").await.unwrap();
        let read = m.create_principal(PrincipalKind::Privilege, "can_read", "").await.unwrap();
        let link = EntityInput::create(json!({ "role_id": role.id, "privilege_id": read.id })).unwrap();
        m.role_privilege_links().create(&link).await.unwrap();
        let dup = m.role_privilege_links().create(&link).await;
        assert!(matches!(dup, Err(AppError::Storage { .. })));

        let grant = EntityInput::create(json!({ "user_id": 3, "role_id": role.id })).unwrap();
        m.memberships(PrincipalKind::Role).create(&grant).await.unwrap();
        let dup = m.memberships(PrincipalKind::Role).create(&grant).await;
        assert!(matches!(dup, Err(AppError::Storage { .. })));
    }

    #[test]
    fn descriptors_cover_every_authorization_table() {
        let tables: Vec<String> = model().descriptors().into_iter().map(|d| d.table_name).collect();
        assert_eq!(
            tables,
            vec!["roles", "privileges", "role_privileges", "user_roles", "user_privileges"]
        );
    }
}
