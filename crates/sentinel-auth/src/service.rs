//! Authentication service: login, lockout and logout orchestration.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sentinel_core::clock::SharedClock;
use sentinel_core::error::{SentinelError, SentinelResult};
use sentinel_core::models::audit::{AuditEvent, AuditEventKind, AuditOutcome};
use sentinel_core::models::session::{NewSession, session_id_prefix};
use sentinel_core::models::user::{CredentialRecord, LoginAttempts, PublicUser};
use sentinel_core::repository::{AuditSink, CredentialRepository};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::password;
use crate::session::SessionStore;

const GENERIC_FAILURE: &str = "Invalid username or password.";

/// Input for the login flow.
#[derive(Debug, Clone)]
pub struct LoginInput {
    /// Username or email.
    pub identifier: String,
    pub password: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Why a login was turned away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Identifier or password was empty.
    MissingCredentials,
    /// Unknown user or wrong password; the two are not distinguished.
    InvalidCredentials,
    AccountInactive,
    AccountLocked { retry_after: Duration },
}

/// Result of [`Authenticator::authenticate`]. Expected failures are a
/// `Rejected` outcome, not an error.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated {
        session_id: String,
        user: PublicUser,
        message: String,
    },
    Rejected {
        reason: RejectReason,
        message: String,
    },
}

impl LoginOutcome {
    fn rejected(reason: RejectReason, message: impl Into<String>) -> Self {
        Self::Rejected {
            reason,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// Human-readable message for the login screen.
    pub fn message(&self) -> &str {
        match self {
            Self::Authenticated { message, .. } | Self::Rejected { message, .. } => message,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Authenticated { session_id, .. } => Some(session_id),
            Self::Rejected { .. } => None,
        }
    }

    pub fn user(&self) -> Option<&PublicUser> {
        match self {
            Self::Authenticated { user, .. } => Some(user),
            Self::Rejected { .. } => None,
        }
    }

    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            Self::Authenticated { .. } => None,
            Self::Rejected { reason, .. } => Some(reason),
        }
    }
}

/// Trim and case-fold a login identifier.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

fn describe_wait(wait: Duration) -> String {
    let secs = wait.num_seconds().max(1);
    if secs < 60 {
        format!("{secs} second(s)")
    } else {
        format!("{} minute(s)", (secs + 59) / 60)
    }
}

/// Authentication service.
///
/// Generic over the credential store and audit sink so that the auth layer
/// has no dependency on the database crate. This is the only component
/// that mutates both lockout counters and the session table.
///
/// Lockout bookkeeping for one account is a read-modify-write against the
/// credential store. Attempts on the same account are serialized by a
/// per-user async mutex, so concurrent failures are all counted. The
/// serialization is per process; several processes sharing one store can
/// still under-count.
pub struct Authenticator<C: CredentialRepository, A: AuditSink> {
    credentials: C,
    audit: A,
    sessions: SessionStore,
    config: AuthConfig,
    clock: SharedClock,
    account_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl<C: CredentialRepository, A: AuditSink> Authenticator<C, A> {
    pub fn new(
        credentials: C,
        audit: A,
        sessions: SessionStore,
        config: AuthConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            credentials,
            audit,
            sessions,
            config,
            clock,
            account_locks: DashMap::new(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Verify credentials and open a session.
    ///
    /// Wrong passwords, unknown users, inactive and locked accounts come
    /// back as [`LoginOutcome::Rejected`]. `Err` is reserved for
    /// infrastructure failures, and for the case where the password was
    /// right but no session could be created.
    ///
    /// May block on the credential store; do not call from a UI thread.
    pub async fn authenticate(&self, input: LoginInput) -> SentinelResult<LoginOutcome> {
        let identifier = normalize_identifier(&input.identifier);
        if identifier.is_empty() || input.password.is_empty() {
            return Ok(LoginOutcome::rejected(
                RejectReason::MissingCredentials,
                "Username and password are required.",
            ));
        }

        let Some(found) = self.lookup(&identifier).await? else {
            debug!(identifier = %identifier, "Login for unknown user");
            self.record(
                AuditEvent::new(
                    AuditEventKind::LoginFailedUserNotFound,
                    AuditOutcome::Failure,
                    self.clock.now(),
                )
                .username(identifier.clone())
                .origin(input.ip_address.clone(), input.user_agent.clone()),
            )
            .await;
            return Ok(LoginOutcome::rejected(
                RejectReason::InvalidCredentials,
                GENERIC_FAILURE,
            ));
        };

        let user_id = found.id;
        let lock = self.account_lock(user_id);
        let result = {
            let _guard = lock.lock().await;
            self.authenticate_locked(user_id, &input).await
        };
        drop(lock);
        self.release_account_lock(user_id);
        result
    }

    /// Steps 3–6 of the login flow, run while holding the account's lock.
    async fn authenticate_locked(
        &self,
        user_id: Uuid,
        input: &LoginInput,
    ) -> SentinelResult<LoginOutcome> {
        // Re-read under the lock: the record found before may be stale.
        let mut record = match self.credentials.find_by_id(user_id).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                return Ok(LoginOutcome::rejected(
                    RejectReason::InvalidCredentials,
                    GENERIC_FAILURE,
                ));
            }
            Err(e) => return Err(store_unavailable(e)),
        };
        let now = self.clock.now();

        if !record.active {
            self.record(self.event(AuditEventKind::LoginFailedInactive, AuditOutcome::Failure, &record, input))
                .await;
            return Ok(LoginOutcome::rejected(
                RejectReason::AccountInactive,
                "This account is inactive. Contact an administrator.",
            ));
        }

        let max_attempts = self.config.max_failed_login_attempts;
        let lockout = self.config.lockout_duration();
        let mut attempts = LoginAttempts::of(&record);

        if max_attempts > 0 && attempts.failed_attempts >= max_attempts {
            let locked_until = attempts.last_failed_login_at.map(|at| {
                at.checked_add_signed(lockout)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            });
            match locked_until {
                Some(until) if now < until => {
                    let retry_after = until - now;
                    self.record(
                        self.event(AuditEventKind::LoginFailedLocked, AuditOutcome::Denied, &record, input)
                            .detail(serde_json::json!({ "retry_after_secs": retry_after.num_seconds() })),
                    )
                    .await;
                    return Ok(LoginOutcome::rejected(
                        RejectReason::AccountLocked { retry_after },
                        format!(
                            "Account is temporarily locked. Try again in {}.",
                            describe_wait(retry_after)
                        ),
                    ));
                }
                _ => {
                    // Lockout served: a fresh set of attempts.
                    attempts = attempts.cleared();
                    self.store_attempts(user_id, attempts).await?;
                    debug!(user_id = %user_id, "Lockout window elapsed, counters reset");
                }
            }
        }

        let valid = password::verify_password(
            &input.password,
            &record.password_hash,
            self.config.pepper.as_deref(),
        )
        .map_err(|e| {
            error!(user_id = %user_id, error = %e, "Stored password hash is unusable");
            SentinelError::from(e)
        })?;

        if !valid {
            return self.fail_password(&record, attempts, input).await;
        }

        // Success: clear the counters and stamp the login.
        let attempts = LoginAttempts {
            failed_attempts: 0,
            last_failed_login_at: None,
            last_login_at: Some(now),
        };
        self.store_attempts(user_id, attempts).await?;
        record.failed_login_attempts = 0;
        record.last_failed_login_at = None;
        record.last_login_at = Some(now);

        let session_id = match self.sessions.create(NewSession {
            user_id,
            username: record.username.clone(),
            roles: record.roles.clone(),
            ip_address: input.ip_address.clone(),
            user_agent: input.user_agent.clone(),
        }) {
            Ok(id) => id,
            Err(e) => {
                // The user proved their identity and we could not honor it.
                error!(
                    user_id = %user_id,
                    error = %e,
                    "Session creation failed after successful authentication"
                );
                self.record(self.event(
                    AuditEventKind::SessionCreateFailed,
                    AuditOutcome::Failure,
                    &record,
                    input,
                ))
                .await;
                return Err(SentinelError::Internal("could not create session".into()));
            }
        };

        let prefix = session_id_prefix(&session_id);
        self.record(
            self.event(AuditEventKind::LoginSuccess, AuditOutcome::Success, &record, input)
                .detail(serde_json::json!({ "session": prefix })),
        )
        .await;
        info!(user_id = %user_id, session = prefix, "Login succeeded");

        Ok(LoginOutcome::Authenticated {
            session_id,
            user: record.to_public(),
            message: "Login successful.".into(),
        })
    }

    async fn fail_password(
        &self,
        record: &CredentialRecord,
        mut attempts: LoginAttempts,
        input: &LoginInput,
    ) -> SentinelResult<LoginOutcome> {
        let now = self.clock.now();
        attempts.failed_attempts = attempts.failed_attempts.saturating_add(1);
        attempts.last_failed_login_at = Some(now);
        self.store_attempts(record.id, attempts).await?;

        self.record(
            self.event(AuditEventKind::LoginFailedPassword, AuditOutcome::Failure, record, input)
                .detail(serde_json::json!({ "failed_attempts": attempts.failed_attempts })),
        )
        .await;

        let max_attempts = self.config.max_failed_login_attempts;
        if max_attempts == 0 {
            return Ok(LoginOutcome::rejected(
                RejectReason::InvalidCredentials,
                GENERIC_FAILURE,
            ));
        }

        if attempts.failed_attempts >= max_attempts {
            let lockout = self.config.lockout_duration();
            warn!(
                user_id = %record.id,
                failed_attempts = attempts.failed_attempts,
                "Account locked after repeated login failures"
            );
            self.record(
                self.event(AuditEventKind::AccountLocked, AuditOutcome::Denied, record, input)
                    .detail(serde_json::json!({ "lockout_secs": lockout.num_seconds() })),
            )
            .await;
            return Ok(LoginOutcome::rejected(
                RejectReason::AccountLocked {
                    retry_after: lockout,
                },
                format!(
                    "Too many failed attempts. The account is locked for {}.",
                    describe_wait(lockout)
                ),
            ));
        }

        let remaining = max_attempts - attempts.failed_attempts;
        Ok(LoginOutcome::rejected(
            RejectReason::InvalidCredentials,
            format!("{GENERIC_FAILURE} {remaining} attempt(s) remaining before the account is locked."),
        ))
    }

    /// End a session. Always succeeds from the caller's point of view:
    /// unknown or expired sessions are a no-op and deletion failures are
    /// only logged.
    pub async fn logout(&self, session_id: &str) {
        let prefix = session_id_prefix(session_id);

        if let Some(session) = self.sessions.peek(session_id) {
            self.record(
                AuditEvent::new(AuditEventKind::Logout, AuditOutcome::Success, self.clock.now())
                    .actor(session.user_id, session.username.clone())
                    .origin(session.ip_address.clone(), session.user_agent.clone())
                    .detail(serde_json::json!({ "session": prefix })),
            )
            .await;
            info!(user_id = %session.user_id, session = prefix, "Logout");
        } else {
            debug!(session = prefix, "Logout for unknown or expired session");
        }

        if let Err(e) = self.sessions.delete(session_id) {
            warn!(session = prefix, error = %e, "Failed to delete session on logout");
        }
    }

    /// Apply a password reset: store the new hash, clear lockout state and
    /// revoke every session of the user. Returns the number of revoked
    /// sessions.
    pub async fn reset_password(&self, user_id: Uuid, new_password: &str) -> SentinelResult<usize> {
        password::validate_password_policy(new_password, self.config.min_password_length)?;

        let lock = self.account_lock(user_id);
        let result = {
            let _guard = lock.lock().await;
            self.reset_password_locked(user_id, new_password).await
        };
        drop(lock);
        self.release_account_lock(user_id);
        result
    }

    async fn reset_password_locked(&self, user_id: Uuid, new_password: &str) -> SentinelResult<usize> {
        let record = self.find_by_id(user_id).await?;
        let hash = password::hash_password(new_password, self.config.pepper.as_deref())?;

        self.credentials
            .update_password_hash(user_id, hash)
            .await
            .map_err(store_unavailable)?;
        self.store_attempts(user_id, LoginAttempts::of(&record).cleared())
            .await?;
        let revoked = self.sessions.delete_all_for_user(user_id)?;

        self.record(
            AuditEvent::new(AuditEventKind::PasswordReset, AuditOutcome::Success, self.clock.now())
                .actor(record.id, record.username.clone())
                .detail(serde_json::json!({ "revoked_sessions": revoked })),
        )
        .await;
        info!(user_id = %user_id, revoked, "Password reset applied");
        Ok(revoked)
    }

    /// Clear an account's lockout counters ahead of the window.
    pub async fn unlock_account(&self, user_id: Uuid) -> SentinelResult<()> {
        let lock = self.account_lock(user_id);
        let result = {
            let _guard = lock.lock().await;
            self.unlock_locked(user_id).await
        };
        drop(lock);
        self.release_account_lock(user_id);
        result
    }

    async fn unlock_locked(&self, user_id: Uuid) -> SentinelResult<()> {
        let record = self.find_by_id(user_id).await?;
        self.store_attempts(user_id, LoginAttempts::of(&record).cleared())
            .await?;
        self.record(
            AuditEvent::new(AuditEventKind::AccountUnlocked, AuditOutcome::Success, self.clock.now())
                .actor(record.id, record.username.clone()),
        )
        .await;
        info!(user_id = %user_id, "Account unlocked");
        Ok(())
    }

    /// Revoke all sessions for a user (e.g. on deactivation).
    pub fn revoke_all_sessions(&self, user_id: Uuid) -> SentinelResult<usize> {
        self.sessions.delete_all_for_user(user_id)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn lookup(&self, identifier: &str) -> SentinelResult<Option<CredentialRecord>> {
        match self.credentials.find_by_identifier(identifier).await {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(store_unavailable(e)),
        }
    }

    async fn find_by_id(&self, user_id: Uuid) -> SentinelResult<CredentialRecord> {
        self.credentials.find_by_id(user_id).await.map_err(|e| {
            if e.is_not_found() {
                e
            } else {
                store_unavailable(e)
            }
        })
    }

    async fn store_attempts(&self, user_id: Uuid, attempts: LoginAttempts) -> SentinelResult<()> {
        self.credentials
            .update_login_attempts(user_id, attempts)
            .await
            .map_err(store_unavailable)
    }

    fn event(
        &self,
        kind: AuditEventKind,
        outcome: AuditOutcome,
        record: &CredentialRecord,
        input: &LoginInput,
    ) -> AuditEvent {
        AuditEvent::new(kind, outcome, self.clock.now())
            .actor(record.id, record.username.clone())
            .origin(input.ip_address.clone(), input.user_agent.clone())
    }

    /// Hand an event to the audit sink. Failures are logged, never
    /// propagated.
    async fn record(&self, event: AuditEvent) {
        let kind = event.kind;
        if let Err(e) = self.audit.record(event).await {
            warn!(kind = %kind, error = %e, "Failed to record audit event");
        }
    }

    fn account_lock(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.account_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the account's lock entry once nobody else holds it.
    fn release_account_lock(&self, user_id: Uuid) {
        self.account_locks
            .remove_if(&user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Log a collaborator failure in full and replace it with a short,
/// non-sensitive error.
fn store_unavailable(e: SentinelError) -> SentinelError {
    error!(error = %e, "Credential store failure");
    SentinelError::Internal("credential store unavailable".into())
}
