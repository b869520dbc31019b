//! SurrealDB implementation of [`CredentialRepository`].
//!
//! Passwords arrive already hashed; this layer never sees plaintext.
//! Usernames and emails are matched case-insensitively through the
//! lower-cased `username_key` / `email_key` columns.

use chrono::{DateTime, Utc};
use sentinel_core::error::SentinelResult;
use sentinel_core::models::user::{CreateCredential, CredentialRecord, LoginAttempts};
use sentinel_core::repository::CredentialRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

/// Row returned by CREATE/UPDATE, where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct UserRow {
    username: String,
    email: String,
    password_hash: String,
    active: bool,
    failed_login_attempts: u32,
    last_failed_login_at: Option<DateTime<Utc>>,
    last_login_at: Option<DateTime<Utc>>,
    roles: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct UserRowWithId {
    record_id: String,
    username: String,
    email: String,
    password_hash: String,
    active: bool,
    failed_login_attempts: u32,
    last_failed_login_at: Option<DateTime<Utc>>,
    last_login_at: Option<DateTime<Utc>>,
    roles: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_record(self, id: Uuid) -> CredentialRecord {
        CredentialRecord {
            id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            active: self.active,
            failed_login_attempts: self.failed_login_attempts,
            last_failed_login_at: self.last_failed_login_at,
            last_login_at: self.last_login_at,
            roles: self.roles,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl UserRowWithId {
    fn try_into_record(self) -> Result<CredentialRecord, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Decode(format!("invalid user UUID: {e}")))?;
        Ok(UserRow {
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            active: self.active,
            failed_login_attempts: self.failed_login_attempts,
            last_failed_login_at: self.last_failed_login_at,
            last_login_at: self.last_login_at,
            roles: self.roles,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_record(id))
    }
}

fn key(value: &str) -> String {
    value.trim().to_lowercase()
}

fn user_not_found(id: impl Into<String>) -> DbError {
    DbError::NotFound {
        entity: "user".into(),
        id: id.into(),
    }
}

/// SurrealDB implementation of the credential store.
#[derive(Clone)]
pub struct SurrealCredentialRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCredentialRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Register a user. Username and email must be unique,
    /// case-insensitively, and neither may match any existing username or
    /// email, so an identifier always names at most one account.
    pub async fn create(&self, input: CreateCredential) -> SentinelResult<CredentialRecord> {
        let username_key = key(&input.username);
        let email_key = key(&input.email);

        if self.identifier_taken(&username_key).await? {
            return Err(DbError::Conflict {
                entity: "user".into(),
                name: input.username,
            }
            .into());
        }
        if self.identifier_taken(&email_key).await? {
            return Err(DbError::Conflict {
                entity: "user".into(),
                name: input.email,
            }
            .into());
        }

        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('user', $id) SET \
                 username = $username, username_key = $username_key, \
                 email = $email, email_key = $email_key, \
                 password_hash = $password_hash, \
                 active = $active, \
                 failed_login_attempts = 0, \
                 last_failed_login_at = NONE, \
                 last_login_at = NONE, \
                 roles = $roles",
            )
            .bind(("id", id_str.clone()))
            .bind(("username", input.username))
            .bind(("username_key", username_key))
            .bind(("email", input.email))
            .bind(("email_key", email_key))
            .bind(("password_hash", input.password_hash))
            .bind(("active", input.active))
            .bind(("roles", input.roles))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| user_not_found(id_str))?;

        Ok(row.into_record(id))
    }

    /// Activate or deactivate an account.
    pub async fn set_active(&self, id: Uuid, active: bool) -> SentinelResult<CredentialRecord> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET \
                 active = $active, updated_at = time::now()",
            )
            .bind(("id", id_str.clone()))
            .bind(("active", active))
            .await
            .map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| user_not_found(id_str))?;

        Ok(row.into_record(id))
    }

    /// Replace the user's role names.
    pub async fn set_roles(&self, id: Uuid, roles: Vec<String>) -> SentinelResult<CredentialRecord> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET \
                 roles = $roles, updated_at = time::now()",
            )
            .bind(("id", id_str.clone()))
            .bind(("roles", roles))
            .await
            .map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| user_not_found(id_str))?;

        Ok(row.into_record(id))
    }

    async fn identifier_taken(&self, identifier: &str) -> Result<bool, DbError> {
        Ok(self.find_by_key("username_key", identifier).await?.is_some()
            || self.find_by_key("email_key", identifier).await?.is_some())
    }

    async fn find_by_key(
        &self,
        column: &'static str,
        value: &str,
    ) -> Result<Option<UserRowWithId>, DbError> {
        let mut result = self
            .db
            .query(format!(
                "SELECT meta::id(id) AS record_id, * FROM user WHERE {column} = $value LIMIT 1"
            ))
            .bind(("value", value.to_string()))
            .await?;
        let rows: Vec<UserRowWithId> = result.take(0)?;
        Ok(rows.into_iter().next())
    }
}

impl<C: Connection> CredentialRepository for SurrealCredentialRepository<C> {
    /// Usernames win over emails for rows that predate the cross-column
    /// uniqueness check in `create`.
    async fn find_by_identifier(&self, identifier: &str) -> SentinelResult<CredentialRecord> {
        let identifier = key(identifier);

        let row = match self.find_by_key("username_key", &identifier).await? {
            Some(row) => row,
            None => self
                .find_by_key("email_key", &identifier)
                .await?
                .ok_or_else(|| user_not_found(format!("identifier={identifier}")))?,
        };

        Ok(row.try_into_record()?)
    }

    async fn find_by_id(&self, id: Uuid) -> SentinelResult<CredentialRecord> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('user', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| user_not_found(id_str))?;

        Ok(row.into_record(id))
    }

    async fn update_login_attempts(&self, id: Uuid, attempts: LoginAttempts) -> SentinelResult<()> {
        let id_str = id.to_string();

        let mut sets = vec!["failed_login_attempts = $failed_login_attempts"];
        sets.push(match attempts.last_failed_login_at {
            Some(_) => "last_failed_login_at = $last_failed_login_at",
            None => "last_failed_login_at = NONE",
        });
        sets.push(match attempts.last_login_at {
            Some(_) => "last_login_at = $last_login_at",
            None => "last_login_at = NONE",
        });
        sets.push("updated_at = time::now()");

        let query = format!("UPDATE type::record('user', $id) SET {}", sets.join(", "));

        let mut builder = self
            .db
            .query(&query)
            .bind(("id", id_str.clone()))
            .bind(("failed_login_attempts", attempts.failed_attempts));

        if let Some(last_failed_login_at) = attempts.last_failed_login_at {
            builder = builder.bind(("last_failed_login_at", last_failed_login_at));
        }
        if let Some(last_login_at) = attempts.last_login_at {
            builder = builder.bind(("last_login_at", last_login_at));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(user_not_found(id_str).into());
        }
        Ok(())
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: String) -> SentinelResult<()> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET \
                 password_hash = $password_hash, updated_at = time::now()",
            )
            .bind(("id", id_str.clone()))
            .bind(("password_hash", password_hash))
            .await
            .map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(user_not_found(id_str).into());
        }
        Ok(())
    }
}
