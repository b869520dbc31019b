//! Collaborator traits the auth core consumes.
//!
//! Implementations live outside this crate (`sentinel-db` provides the
//! SurrealDB ones). All operations are async; "not found" is reported as
//! [`SentinelError::NotFound`](crate::error::SentinelError::NotFound).

use uuid::Uuid;

use crate::error::SentinelResult;
use crate::models::{
    audit::AuditEvent,
    role::{CreateRole, Role, UpdateRole},
    user::{CredentialRecord, LoginAttempts},
};

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

pub trait CredentialRepository: Send + Sync {
    /// Look a user up by username or email. `identifier` is already
    /// trimmed and lower-cased; matching is case-insensitive.
    fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> impl Future<Output = SentinelResult<CredentialRecord>> + Send;

    fn find_by_id(&self, id: Uuid) -> impl Future<Output = SentinelResult<CredentialRecord>> + Send;

    fn update_login_attempts(
        &self,
        id: Uuid,
        attempts: LoginAttempts,
    ) -> impl Future<Output = SentinelResult<()>> + Send;

    fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: String,
    ) -> impl Future<Output = SentinelResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

pub trait RoleRepository: Send + Sync {
    /// Case-insensitive lookup.
    fn find_by_name(&self, name: &str) -> impl Future<Output = SentinelResult<Role>> + Send;
    fn list_all(&self) -> impl Future<Output = SentinelResult<Vec<Role>>> + Send;
    fn create(&self, input: CreateRole) -> impl Future<Output = SentinelResult<Role>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateRole,
    ) -> impl Future<Output = SentinelResult<Role>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = SentinelResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

pub trait AuditSink: Send + Sync {
    /// Record one event. Callers log a failure and carry on.
    fn record(&self, event: AuditEvent) -> impl Future<Output = SentinelResult<()>> + Send;
}
