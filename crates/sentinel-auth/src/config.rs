//! Authentication and session configuration.

use std::path::PathBuf;

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Configuration for the authenticator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Consecutive failed logins before the account is locked (default: 5).
    pub max_failed_login_attempts: u32,
    /// Lockout duration in seconds, counted from the last failure
    /// (default: 300 = 5 min).
    pub lockout_duration_secs: u64,
    /// Optional pepper prepended to passwords before Argon2id hashing and
    /// verification.
    pub pepper: Option<String>,
    /// Minimum password length for policy enforcement.
    pub min_password_length: usize,
}

impl AuthConfig {
    pub fn lockout_duration(&self) -> Duration {
        secs(self.lockout_duration_secs)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_failed_login_attempts: 5,
            lockout_duration_secs: 300,
            pepper: None,
            min_password_length: 12,
        }
    }
}

/// Configuration for the in-memory session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle timeout in seconds (default: 1800 = 30 min).
    pub session_timeout_secs: u64,
    /// Absolute lifetime in seconds (default: 43_200 = 12 h).
    pub session_lifetime_secs: u64,
    /// Sweep period in seconds (default: 60).
    pub cleanup_interval_secs: u64,
    /// Snapshot file. `None` disables persistence.
    pub snapshot_path: Option<PathBuf>,
    /// Write the snapshot from the sweeper whenever the table changed since
    /// the last write.
    pub persist_on_mutation: bool,
}

impl SessionConfig {
    pub fn session_timeout(&self) -> Duration {
        secs(self.session_timeout_secs)
    }

    pub fn session_lifetime(&self) -> Duration {
        secs(self.session_lifetime_secs)
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: 1800,
            session_lifetime_secs: 43_200,
            cleanup_interval_secs: 60,
            snapshot_path: Some(PathBuf::from("sessions.json")),
            persist_on_mutation: true,
        }
    }
}

/// Longest duration any `*_secs` setting resolves to (100 years). Larger
/// values, up to `u64::MAX`, mean "effectively never" and saturate here.
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

fn secs(value: u64) -> Duration {
    // Bounded by MAX_DURATION_SECS, so the cast cannot wrap.
    Duration::seconds(value.min(MAX_DURATION_SECS) as i64)
}
