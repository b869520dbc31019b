//! Integration tests for the authentication service.

use std::sync::Arc;

use chrono::Duration;
use parking_lot::Mutex;
use sentinel_auth::password::hash_password;
use sentinel_auth::{
    AuthConfig, Authenticator, LoginInput, LoginOutcome, RejectReason, SessionConfig,
    SessionStore,
};
use sentinel_core::error::SentinelResult;
use sentinel_core::models::audit::{AuditEvent, AuditEventKind};
use sentinel_core::models::user::{CreateCredential, LoginAttempts};
use sentinel_core::repository::{AuditSink, CredentialRepository};
use sentinel_core::{Clock, ManualClock, SentinelError, SharedClock};
use sentinel_db::repository::SurrealCredentialRepository;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

const ALICE_PASSWORD: &str = "correct horse battery";

#[derive(Clone, Default)]
struct RecordingSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl RecordingSink {
    fn kinds(&self) -> Vec<AuditEventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }
}

impl AuditSink for RecordingSink {
    async fn record(&self, event: AuditEvent) -> SentinelResult<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

struct Harness {
    auth: Arc<Authenticator<SurrealCredentialRepository<Db>, RecordingSink>>,
    users: SurrealCredentialRepository<Db>,
    sink: RecordingSink,
    clock: Arc<ManualClock>,
    alice: Uuid,
}

fn test_config() -> AuthConfig {
    AuthConfig {
        max_failed_login_attempts: 5,
        lockout_duration_secs: 300,
        pepper: None,
        min_password_length: 12,
    }
}

/// Spin up in-memory DB, run migrations and register `alice`.
async fn setup(config: AuthConfig) -> Harness {
    setup_with_hash(config, hash_password(ALICE_PASSWORD, None).unwrap()).await
}

async fn setup_with_hash(config: AuthConfig, password_hash: String) -> Harness {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    sentinel_db::run_migrations(&db).await.unwrap();

    let users = SurrealCredentialRepository::new(db.clone());
    let alice = users
        .create(CreateCredential {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash,
            active: true,
            roles: vec!["editor".into()],
        })
        .await
        .unwrap();

    let clock = Arc::new(ManualClock::starting_now());
    let shared: SharedClock = clock.clone();
    let sessions = SessionStore::new(
        SessionConfig {
            snapshot_path: None,
            ..Default::default()
        },
        shared.clone(),
    );
    let sink = RecordingSink::default();
    let auth = Authenticator::new(
        SurrealCredentialRepository::new(db),
        sink.clone(),
        sessions,
        config,
        shared,
    );

    Harness {
        auth: Arc::new(auth),
        users,
        sink,
        clock,
        alice: alice.id,
    }
}

fn login(identifier: &str, password: &str) -> LoginInput {
    LoginInput {
        identifier: identifier.into(),
        password: password.into(),
        ip_address: Some("192.0.2.7".into()),
        user_agent: Some("test-agent".into()),
    }
}

#[tokio::test]
async fn unknown_user_gets_the_generic_rejection() {
    let h = setup(test_config()).await;

    let outcome = h.auth.authenticate(login("mallory", "whatever-password")).await.unwrap();
    assert_eq!(outcome.reject_reason(), Some(&RejectReason::InvalidCredentials));
    assert_eq!(outcome.message(), "Invalid username or password.");

    let events = h.sink.events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, AuditEventKind::LoginFailedUserNotFound);
    assert_eq!(events[0].username.as_deref(), Some("mallory"));
    assert_eq!(events[0].actor_id, None);
}

#[tokio::test]
async fn unknown_user_never_touches_a_stored_hash() {
    // Every stored hash is malformed; a comparison would surface as Err.
    let h = setup_with_hash(test_config(), "not-a-phc-string".into()).await;
    let outcome = h.auth.authenticate(login("bob", "whatever-password")).await;
    assert!(matches!(
        outcome,
        Ok(LoginOutcome::Rejected {
            reason: RejectReason::InvalidCredentials,
            ..
        })
    ));
}

#[tokio::test]
async fn blank_credentials_are_rejected_without_audit() {
    let h = setup(test_config()).await;

    let outcome = h.auth.authenticate(login("   ", ALICE_PASSWORD)).await.unwrap();
    assert_eq!(outcome.reject_reason(), Some(&RejectReason::MissingCredentials));
    let outcome = h.auth.authenticate(login("alice", "")).await.unwrap();
    assert_eq!(outcome.reject_reason(), Some(&RejectReason::MissingCredentials));

    assert!(h.sink.kinds().is_empty());
}

#[tokio::test]
async fn four_failures_then_success_resets_the_counter() {
    let h = setup(test_config()).await;

    for remaining in (1..=4).rev() {
        let outcome = h.auth.authenticate(login("alice", "wrong-password!")).await.unwrap();
        assert_eq!(outcome.reject_reason(), Some(&RejectReason::InvalidCredentials));
        assert!(outcome.message().contains(&format!("{remaining} attempt(s) remaining")));
    }
    assert_eq!(h.users.find_by_id(h.alice).await.unwrap().failed_login_attempts, 4);

    let outcome = h.auth.authenticate(login("Alice", ALICE_PASSWORD)).await.unwrap();
    assert!(outcome.is_success());
    let user = outcome.user().unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(user.roles, vec!["editor".to_string()]);

    let stored = h.users.find_by_id(h.alice).await.unwrap();
    assert_eq!(stored.failed_login_attempts, 0);
    assert!(stored.last_failed_login_at.is_none());
    let last_login = stored.last_login_at.unwrap();
    assert!((last_login - h.clock.now()).num_milliseconds().abs() < 1000);

    assert_eq!(
        h.sink.kinds(),
        vec![
            AuditEventKind::LoginFailedPassword,
            AuditEventKind::LoginFailedPassword,
            AuditEventKind::LoginFailedPassword,
            AuditEventKind::LoginFailedPassword,
            AuditEventKind::LoginSuccess,
        ]
    );
}

#[tokio::test]
async fn successful_login_opens_a_session_with_the_role_snapshot() {
    let h = setup(test_config()).await;

    let outcome = h.auth.authenticate(login("alice@example.com", ALICE_PASSWORD)).await.unwrap();
    let session_id = outcome.session_id().unwrap().to_string();
    assert_eq!(session_id.len(), 43);

    let session = h.auth.sessions().get(&session_id).unwrap();
    assert_eq!(session.user_id, h.alice);
    assert_eq!(session.roles, vec!["editor".to_string()]);
    assert_eq!(session.ip_address.as_deref(), Some("192.0.2.7"));

    // The audit trail only carries a prefix of the token.
    let events = h.sink.events.lock();
    let detail = events.last().unwrap().detail["session"].as_str().unwrap().to_string();
    assert_eq!(detail.len(), 8);
    assert!(session_id.starts_with(&detail));
}

#[tokio::test]
async fn fifth_failure_locks_the_account() {
    let h = setup(test_config()).await;

    for _ in 0..4 {
        h.auth.authenticate(login("alice", "wrong-password!")).await.unwrap();
    }
    let outcome = h.auth.authenticate(login("alice", "wrong-password!")).await.unwrap();
    assert!(matches!(
        outcome.reject_reason(),
        Some(RejectReason::AccountLocked { .. })
    ));

    // Even the right password is refused while locked.
    h.clock.advance(Duration::seconds(10));
    let outcome = h.auth.authenticate(login("alice", ALICE_PASSWORD)).await.unwrap();
    match outcome.reject_reason() {
        Some(RejectReason::AccountLocked { retry_after }) => {
            assert!((289..=290).contains(&retry_after.num_seconds()));
        }
        other => panic!("expected lockout, got {other:?}"),
    }

    let kinds = h.sink.kinds();
    assert_eq!(kinds[4], AuditEventKind::LoginFailedPassword);
    assert_eq!(kinds[5], AuditEventKind::AccountLocked);
    assert_eq!(kinds[6], AuditEventKind::LoginFailedLocked);
    assert_eq!(h.users.find_by_id(h.alice).await.unwrap().failed_login_attempts, 5);
}

#[tokio::test]
async fn locked_account_never_reaches_password_comparison() {
    let h = setup_with_hash(test_config(), "not-a-phc-string".into()).await;
    h.users
        .update_login_attempts(
            h.alice,
            LoginAttempts {
                failed_attempts: 5,
                last_failed_login_at: Some(h.clock.now()),
                last_login_at: None,
            },
        )
        .await
        .unwrap();

    let outcome = h.auth.authenticate(login("alice", ALICE_PASSWORD)).await;
    assert!(matches!(
        outcome,
        Ok(LoginOutcome::Rejected {
            reason: RejectReason::AccountLocked { .. },
            ..
        })
    ));
}

#[tokio::test]
async fn lockout_expires_after_the_window() {
    let h = setup(test_config()).await;
    for _ in 0..5 {
        h.auth.authenticate(login("alice", "wrong-password!")).await.unwrap();
    }

    h.clock.advance(Duration::seconds(301));
    let outcome = h.auth.authenticate(login("alice", ALICE_PASSWORD)).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(h.users.find_by_id(h.alice).await.unwrap().failed_login_attempts, 0);
}

#[tokio::test]
async fn failure_after_the_window_starts_a_fresh_count() {
    let h = setup(test_config()).await;
    for _ in 0..5 {
        h.auth.authenticate(login("alice", "wrong-password!")).await.unwrap();
    }

    h.clock.advance(Duration::seconds(301));
    let outcome = h.auth.authenticate(login("alice", "wrong-password!")).await.unwrap();
    assert_eq!(outcome.reject_reason(), Some(&RejectReason::InvalidCredentials));
    assert_eq!(h.users.find_by_id(h.alice).await.unwrap().failed_login_attempts, 1);
}

#[tokio::test]
async fn unbounded_lockout_holds_without_panicking() {
    let h = setup(AuthConfig {
        lockout_duration_secs: u64::MAX,
        ..test_config()
    })
    .await;
    for _ in 0..5 {
        h.auth.authenticate(login("alice", "wrong-password!")).await.unwrap();
    }

    h.clock.advance(Duration::days(3650));
    let outcome = h.auth.authenticate(login("alice", ALICE_PASSWORD)).await.unwrap();
    match outcome.reject_reason() {
        Some(RejectReason::AccountLocked { retry_after }) => {
            assert!(*retry_after > Duration::days(365 * 80));
        }
        other => panic!("expected lockout, got {other:?}"),
    }

    h.auth.unlock_account(h.alice).await.unwrap();
    let outcome = h.auth.authenticate(login("alice", ALICE_PASSWORD)).await.unwrap();
    assert!(outcome.is_success());
}

#[tokio::test]
async fn inactive_account_is_rejected() {
    let h = setup(test_config()).await;
    h.users.set_active(h.alice, false).await.unwrap();

    let outcome = h.auth.authenticate(login("alice", ALICE_PASSWORD)).await.unwrap();
    assert_eq!(outcome.reject_reason(), Some(&RejectReason::AccountInactive));
    assert_eq!(h.sink.kinds(), vec![AuditEventKind::LoginFailedInactive]);
    assert!(h.auth.sessions().is_empty());
}

#[tokio::test]
async fn logout_removes_the_session() {
    let h = setup(test_config()).await;
    let outcome = h.auth.authenticate(login("alice", ALICE_PASSWORD)).await.unwrap();
    let session_id = outcome.session_id().unwrap().to_string();

    h.auth.logout(&session_id).await;
    assert!(h.auth.sessions().get(&session_id).unwrap_err().is_not_found());
    assert_eq!(h.sink.kinds().last(), Some(&AuditEventKind::Logout));

    // Unknown sessions are a silent no-op.
    h.auth.logout("no-such-session").await;
    assert_eq!(h.sink.kinds().len(), 2);
}

#[tokio::test]
async fn password_reset_revokes_sessions_and_clears_lockout() {
    let h = setup(test_config()).await;
    h.auth.authenticate(login("alice", ALICE_PASSWORD)).await.unwrap();
    h.auth.authenticate(login("alice", ALICE_PASSWORD)).await.unwrap();
    for _ in 0..5 {
        h.auth.authenticate(login("alice", "wrong-password!")).await.unwrap();
    }

    let err = h.auth.reset_password(h.alice, "short").await.unwrap_err();
    assert!(matches!(err, SentinelError::Validation { .. }));

    let revoked = h
        .auth
        .reset_password(h.alice, "a much better passphrase")
        .await
        .unwrap();
    assert_eq!(revoked, 2);
    assert!(h.auth.sessions().is_empty());
    assert_eq!(h.sink.kinds().last(), Some(&AuditEventKind::PasswordReset));

    let outcome = h.auth.authenticate(login("alice", ALICE_PASSWORD)).await.unwrap();
    assert_eq!(outcome.reject_reason(), Some(&RejectReason::InvalidCredentials));
    let outcome = h
        .auth
        .authenticate(login("alice", "a much better passphrase"))
        .await
        .unwrap();
    assert!(outcome.is_success());
}

#[tokio::test]
async fn unlock_clears_the_counter_early() {
    let h = setup(test_config()).await;
    for _ in 0..5 {
        h.auth.authenticate(login("alice", "wrong-password!")).await.unwrap();
    }

    h.auth.unlock_account(h.alice).await.unwrap();
    assert_eq!(h.sink.kinds().last(), Some(&AuditEventKind::AccountUnlocked));

    let outcome = h.auth.authenticate(login("alice", ALICE_PASSWORD)).await.unwrap();
    assert!(outcome.is_success());

    let err = h.auth.unlock_account(Uuid::new_v4()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn revoke_all_sessions_counts_what_it_removed() {
    let h = setup(test_config()).await;
    for _ in 0..3 {
        h.auth.authenticate(login("alice", ALICE_PASSWORD)).await.unwrap();
    }
    assert_eq!(h.auth.revoke_all_sessions(h.alice).unwrap(), 3);
    assert_eq!(h.auth.revoke_all_sessions(h.alice).unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_failures_are_all_counted() {
    let config = AuthConfig {
        max_failed_login_attempts: 100,
        ..test_config()
    };
    let h = setup(config).await;
    const N: u32 = 8;

    let mut tasks = Vec::new();
    for _ in 0..N {
        let auth = Arc::clone(&h.auth);
        tasks.push(tokio::spawn(async move {
            auth.authenticate(login("alice", "wrong-password!")).await
        }));
    }
    for task in tasks {
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.reject_reason(), Some(&RejectReason::InvalidCredentials));
    }

    assert_eq!(h.users.find_by_id(h.alice).await.unwrap().failed_login_attempts, N);
}

#[tokio::test]
async fn login_after_shutdown_is_an_internal_error() {
    let h = setup(test_config()).await;
    h.auth.sessions().shutdown().await.unwrap();

    let err = h.auth.authenticate(login("alice", ALICE_PASSWORD)).await.unwrap_err();
    assert!(matches!(err, SentinelError::Internal(_)));
    assert_eq!(h.sink.kinds(), vec![AuditEventKind::SessionCreateFailed]);
}
