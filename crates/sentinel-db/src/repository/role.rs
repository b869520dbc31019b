//! SurrealDB implementation of [`RoleRepository`].

use chrono::{DateTime, Utc};
use sentinel_core::error::SentinelResult;
use sentinel_core::models::role::{CreateRole, Role, UpdateRole, role_key};
use sentinel_core::repository::RoleRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct RoleRow {
    name: String,
    description: String,
    is_system: bool,
    permissions: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct RoleRowWithId {
    record_id: String,
    name: String,
    description: String,
    is_system: bool,
    permissions: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RoleRow {
    fn into_role(self, id: Uuid) -> Role {
        Role {
            id,
            name: self.name,
            description: self.description,
            is_system: self.is_system,
            permissions: self.permissions,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl RoleRowWithId {
    fn try_into_role(self) -> Result<Role, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Decode(format!("invalid role UUID: {e}")))?;
        Ok(Role {
            id,
            name: self.name,
            description: self.description,
            is_system: self.is_system,
            permissions: self.permissions,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn role_not_found(id: impl Into<String>) -> DbError {
    DbError::NotFound {
        entity: "role".into(),
        id: id.into(),
    }
}

/// SurrealDB implementation of the Role repository.
#[derive(Clone)]
pub struct SurrealRoleRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealRoleRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn find_row_by_key(&self, key: String) -> Result<Option<RoleRowWithId>, DbError> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM role WHERE name_key = $key LIMIT 1")
            .bind(("key", key))
            .await?;
        let rows: Vec<RoleRowWithId> = result.take(0)?;
        Ok(rows.into_iter().next())
    }
}

impl<C: Connection> RoleRepository for SurrealRoleRepository<C> {
    async fn find_by_name(&self, name: &str) -> SentinelResult<Role> {
        let key = role_key(name);
        let row = self
            .find_row_by_key(key.clone())
            .await?
            .ok_or_else(|| role_not_found(format!("name={key}")))?;
        Ok(row.try_into_role()?)
    }

    async fn list_all(&self) -> SentinelResult<Vec<Role>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM role ORDER BY name_key ASC")
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRowWithId> = result.take(0).map_err(DbError::from)?;

        let roles = rows
            .into_iter()
            .map(|row| row.try_into_role())
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(roles)
    }

    async fn create(&self, input: CreateRole) -> SentinelResult<Role> {
        let key = role_key(&input.name);
        if self.find_row_by_key(key.clone()).await?.is_some() {
            return Err(DbError::Conflict {
                entity: "role".into(),
                name: input.name,
            }
            .into());
        }

        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('role', $id) SET \
                 name = $name, name_key = $name_key, \
                 description = $description, \
                 is_system = $is_system, \
                 permissions = $permissions",
            )
            .bind(("id", id_str.clone()))
            .bind(("name", input.name.trim().to_string()))
            .bind(("name_key", key))
            .bind(("description", input.description))
            .bind(("is_system", input.is_system))
            .bind(("permissions", input.permissions))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| role_not_found(id_str))?;

        Ok(row.into_role(id))
    }

    async fn update(&self, id: Uuid, input: UpdateRole) -> SentinelResult<Role> {
        let id_str = id.to_string();

        if let Some(name) = &input.name {
            let key = role_key(name);
            if let Some(existing) = self.find_row_by_key(key).await? {
                if existing.record_id != id_str {
                    return Err(DbError::Conflict {
                        entity: "role".into(),
                        name: name.clone(),
                    }
                    .into());
                }
            }
        }

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name, name_key = $name_key");
        }
        if input.description.is_some() {
            sets.push("description = $description");
        }
        if input.is_system.is_some() {
            sets.push("is_system = $is_system");
        }
        if input.permissions.is_some() {
            sets.push("permissions = $permissions");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('role', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));

        if let Some(name) = input.name {
            builder = builder
                .bind(("name_key", role_key(&name)))
                .bind(("name", name.trim().to_string()));
        }
        if let Some(description) = input.description {
            builder = builder.bind(("description", description));
        }
        if let Some(is_system) = input.is_system {
            builder = builder.bind(("is_system", is_system));
        }
        if let Some(permissions) = input.permissions {
            builder = builder.bind(("permissions", permissions));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| role_not_found(id_str))?;

        Ok(row.into_role(id))
    }

    async fn delete(&self, id: Uuid) -> SentinelResult<()> {
        let id_str = id.to_string();

        let result = self
            .db
            .query("DELETE type::record('role', $id) RETURN BEFORE")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(role_not_found(id_str).into());
        }
        Ok(())
    }
}
