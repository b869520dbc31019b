//! Credential record domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's credentials and login bookkeeping, as kept by the credential
/// store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub active: bool,
    pub failed_login_attempts: u32,
    pub last_failed_login_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// Projection safe to hand back to callers.
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            roles: self.roles.clone(),
            last_login_at: self.last_login_at,
        }
    }
}

/// Caller-visible view of a user. Never carries the hash or the lockout
/// counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCredential {
    pub username: String,
    pub email: String,
    /// Already-hashed password (see `sentinel_auth::password::hash_password`).
    pub password_hash: String,
    pub active: bool,
    pub roles: Vec<String>,
}

/// New values for the login bookkeeping fields. All three are written
/// together; `None` clears a timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAttempts {
    pub failed_attempts: u32,
    pub last_failed_login_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl LoginAttempts {
    /// The record's current bookkeeping.
    pub fn of(record: &CredentialRecord) -> Self {
        Self {
            failed_attempts: record.failed_login_attempts,
            last_failed_login_at: record.last_failed_login_at,
            last_login_at: record.last_login_at,
        }
    }

    /// Counters cleared, last successful login preserved.
    pub fn cleared(self) -> Self {
        Self {
            failed_attempts: 0,
            last_failed_login_at: None,
            ..self
        }
    }
}
