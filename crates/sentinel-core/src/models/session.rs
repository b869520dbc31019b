//! Session domain model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated interaction.
///
/// `roles` is the user's role set captured at login. It is deliberately
/// not refreshed from the credential store while the session lives, so a
/// role change only takes effect at the next login (or after the user's
/// sessions are revoked).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: Uuid,
    pub username: String,
    pub roles: Vec<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Idle longer than `timeout`, or past the absolute expiry. An idle
    /// deadline beyond the representable range never passes.
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        let idle = self
            .last_activity
            .checked_add_signed(timeout)
            .is_some_and(|deadline| now > deadline);
        idle || now > self.expires_at
    }

    /// Short prefix of the id, safe to log.
    pub fn id_prefix(&self) -> &str {
        session_id_prefix(&self.id)
    }
}

/// First eight characters of a session id, for logs and audit records.
pub fn session_id_prefix(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Everything the authenticator knows about a session before the store
/// assigns its id and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub user_id: Uuid,
    pub username: String,
    pub roles: Vec<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_at(now: DateTime<Utc>) -> Session {
        Session {
            id: "0123456789abcdef".into(),
            user_id: Uuid::new_v4(),
            username: "alice".into(),
            roles: vec!["user".into()],
            ip_address: None,
            user_agent: None,
            created_at: now,
            last_activity: now,
            expires_at: now + Duration::hours(12),
        }
    }

    #[test]
    fn idle_timeout_wins_over_absolute_expiry() {
        let now = Utc::now();
        let session = session_at(now);
        let timeout = Duration::seconds(60);

        assert!(!session.is_expired(now + Duration::seconds(60), timeout));
        assert!(session.is_expired(now + Duration::seconds(61), timeout));
    }

    #[test]
    fn absolute_expiry_applies_to_active_sessions() {
        let now = Utc::now();
        let mut session = session_at(now);
        session.last_activity = now + Duration::hours(12);

        assert!(session.is_expired(now + Duration::hours(12) + Duration::seconds(1), Duration::hours(1)));
    }

    #[test]
    fn prefix_is_eight_chars() {
        assert_eq!(session_id_prefix("0123456789abcdef"), "01234567");
        assert_eq!(session_id_prefix("abc"), "abc");
    }
}
