//! Permission checks against a session's role snapshot.

use std::sync::Arc;

use sentinel_core::error::{SentinelError, SentinelResult};
use sentinel_core::models::audit::{AuditEvent, AuditEventKind, AuditOutcome};
use sentinel_core::models::role::role_key;
use sentinel_core::models::session::Session;
use sentinel_core::repository::{AuditSink, RoleRepository};
use sentinel_core::{SharedClock, SystemClock};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::catalog::{ADMIN_ROLE, PermissionCatalog};
use crate::seed::SeededCatalog;

/// Answers "may this session do X?".
///
/// Roles are resolved from the repository on every check, so edits to a
/// role take effect immediately for sessions that hold it. The session's
/// list of role *names* is the login-time snapshot.
pub struct PermissionResolver<R, A> {
    catalog: Arc<PermissionCatalog>,
    roles: R,
    audit: A,
    clock: SharedClock,
}

impl<R: RoleRepository, A: AuditSink> PermissionResolver<R, A> {
    pub fn new(seeded: &SeededCatalog, roles: R, audit: A) -> Self {
        Self {
            catalog: seeded.shared(),
            roles,
            audit,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    /// Whether the session may exercise `capability`.
    ///
    /// `resource_owner_id` only matters for owner-scoped capabilities. The
    /// `admin` role passes every check, owner-scoped ones included.
    pub async fn has_permission(
        &self,
        session: Option<&Session>,
        capability: &str,
        resource_owner_id: Option<Uuid>,
    ) -> SentinelResult<bool> {
        let session = session.ok_or(SentinelError::Unauthorized)?;

        let Some(def) = self.catalog.get(capability) else {
            error!(capability, "permission check for a capability outside the catalog");
            return Err(SentinelError::Configuration(format!(
                "unknown capability '{capability}'"
            )));
        };

        if is_admin(session) {
            return Ok(true);
        }

        for name in &session.roles {
            let role = match self.roles.find_by_name(name).await {
                Ok(role) => role,
                Err(e) if e.is_not_found() => {
                    debug!(role = %name, "role in session snapshot no longer exists");
                    continue;
                }
                Err(e) => {
                    error!(role = %name, error = %e, "role lookup failed");
                    return Err(e);
                }
            };

            if !role.grants(capability) {
                continue;
            }
            if !def.owner_scoped || resource_owner_id == Some(session.user_id) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Case-insensitive membership in the session's role snapshot.
    pub fn has_role(&self, session: Option<&Session>, role: &str) -> SentinelResult<bool> {
        let session = session.ok_or(SentinelError::Unauthorized)?;
        let wanted = role_key(role);
        Ok(session.roles.iter().any(|r| role_key(r) == wanted))
    }

    pub async fn check_permission(
        &self,
        session: Option<&Session>,
        capability: &str,
        resource_owner_id: Option<Uuid>,
    ) -> SentinelResult<()> {
        if self
            .has_permission(session, capability, resource_owner_id)
            .await?
        {
            return Ok(());
        }

        if let Some(session) = session {
            self.record_denial(session, capability).await;
        }
        Err(SentinelError::PermissionDenied {
            reason: format!("missing permission '{capability}'"),
        })
    }

    pub async fn check_role(&self, session: Option<&Session>, role: &str) -> SentinelResult<()> {
        if self.has_role(session, role)? {
            return Ok(());
        }

        if let Some(session) = session {
            self.record_denial(session, &format!("role:{}", role_key(role)))
                .await;
        }
        Err(SentinelError::PermissionDenied {
            reason: format!("missing role '{role}'"),
        })
    }

    async fn record_denial(&self, session: &Session, required: &str) {
        debug!(
            user_id = %session.user_id,
            session = %session.id_prefix(),
            required,
            "permission denied"
        );

        let event = AuditEvent::new(
            AuditEventKind::PermissionDenied,
            AuditOutcome::Denied,
            self.clock.now(),
        )
        .actor(session.user_id, session.username.clone())
        .origin(session.ip_address.clone(), session.user_agent.clone())
        .detail(serde_json::json!({ "required": required }));

        if let Err(e) = self.audit.record(event).await {
            warn!(error = %e, "failed to record audit event");
        }
    }
}

fn is_admin(session: &Session) -> bool {
    session.roles.iter().any(|r| role_key(r) == ADMIN_ROLE)
}
