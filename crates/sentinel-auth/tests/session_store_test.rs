//! Integration tests for session persistence and the background sweeper.

use std::sync::Arc;

use chrono::Duration;
use sentinel_auth::{SessionConfig, SessionStore, with_current_session};
use sentinel_core::models::session::NewSession;
use sentinel_core::{ManualClock, SentinelError, SharedClock};
use uuid::Uuid;

fn new_session(username: &str) -> NewSession {
    NewSession {
        user_id: Uuid::new_v4(),
        username: username.into(),
        roles: vec!["viewer".into()],
        ip_address: Some("198.51.100.4".into()),
        user_agent: None,
    }
}

fn store(config: SessionConfig, clock: &Arc<ManualClock>) -> SessionStore {
    let shared: SharedClock = clock.clone();
    SessionStore::new(config, shared)
}

#[tokio::test]
async fn snapshot_round_trip_keeps_live_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig {
        session_timeout_secs: 60,
        snapshot_path: Some(dir.path().join("sessions.json")),
        ..Default::default()
    };
    let clock = Arc::new(ManualClock::starting_now());

    let first = store(config.clone(), &clock);
    let stale = first.create(new_session("stale")).unwrap();
    clock.advance(Duration::seconds(45));
    let alice = first.create(new_session("alice")).unwrap();
    let bob = first.create(new_session("bob")).unwrap();
    clock.advance(Duration::seconds(20));

    let before_alice = first.peek(&alice).unwrap();
    let before_bob = first.peek(&bob).unwrap();
    first.shutdown().await.unwrap();

    let second = store(config, &clock);
    assert_eq!(second.load().await.unwrap(), 2);
    assert_eq!(second.peek(&alice).unwrap(), before_alice);
    assert_eq!(second.peek(&bob).unwrap(), before_bob);
    assert!(second.peek(&stale).is_none());
}

#[tokio::test]
async fn sessions_that_expire_while_down_are_dropped_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig {
        session_timeout_secs: 60,
        snapshot_path: Some(dir.path().join("sessions.json")),
        ..Default::default()
    };
    let clock = Arc::new(ManualClock::starting_now());

    let first = store(config.clone(), &clock);
    let id = first.create(new_session("alice")).unwrap();
    first.shutdown().await.unwrap();

    clock.advance(Duration::seconds(61));
    let second = store(config, &clock);
    assert_eq!(second.load().await.unwrap(), 0);
    assert!(second.get(&id).unwrap_err().is_not_found());
}

#[tokio::test]
async fn unbounded_timeouts_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig {
        session_timeout_secs: u64::MAX,
        session_lifetime_secs: u64::MAX,
        snapshot_path: Some(dir.path().join("sessions.json")),
        ..Default::default()
    };
    let clock = Arc::new(ManualClock::starting_now());

    let first = store(config.clone(), &clock);
    let id = first.create(new_session("alice")).unwrap();
    first.shutdown().await.unwrap();

    clock.advance(Duration::days(3650));
    let second = store(config, &clock);
    assert_eq!(second.load().await.unwrap(), 1);
    assert_eq!(second.get(&id).unwrap().username, "alice");
}

#[tokio::test]
async fn missing_snapshot_means_nothing_to_restore() {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig {
        snapshot_path: Some(dir.path().join("never-written.json")),
        ..Default::default()
    };
    let clock = Arc::new(ManualClock::starting_now());
    assert_eq!(store(config, &clock).load().await.unwrap(), 0);
}

#[tokio::test]
async fn shutting_down_an_empty_store_removes_the_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.json");
    let config = SessionConfig {
        snapshot_path: Some(path.clone()),
        ..Default::default()
    };
    let clock = Arc::new(ManualClock::starting_now());

    let first = store(config.clone(), &clock);
    let id = first.create(new_session("alice")).unwrap();
    first.save().await.unwrap();
    assert!(path.exists());

    first.delete(&id).unwrap();
    first.shutdown().await.unwrap();
    assert!(!path.exists());
}

#[tokio::test(start_paused = true)]
async fn sweeper_evicts_idle_sessions_without_a_get() {
    let config = SessionConfig {
        session_timeout_secs: 1,
        cleanup_interval_secs: 10,
        snapshot_path: None,
        ..Default::default()
    };
    let clock = Arc::new(ManualClock::starting_now());
    let sessions = store(config, &clock);
    sessions.start_sweeper().unwrap();

    sessions.create(new_session("alice")).unwrap();
    clock.advance(Duration::seconds(2));
    assert_eq!(sessions.len(), 1);

    tokio::time::sleep(std::time::Duration::from_secs(11)).await;
    assert_eq!(sessions.len(), 0);

    sessions.shutdown().await.unwrap();
}

#[tokio::test]
async fn sweeper_persists_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.json");
    let config = SessionConfig {
        cleanup_interval_secs: 1,
        snapshot_path: Some(path.clone()),
        persist_on_mutation: true,
        ..Default::default()
    };
    let clock = Arc::new(ManualClock::starting_now());
    let sessions = store(config, &clock);
    sessions.start_sweeper().unwrap();

    sessions.create(new_session("alice")).unwrap();
    for _ in 0..50 {
        if path.exists() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    assert!(path.exists());

    sessions.shutdown().await.unwrap();
}

#[tokio::test]
async fn current_resolves_inside_an_interaction() {
    let clock = Arc::new(ManualClock::starting_now());
    let sessions = store(
        SessionConfig {
            snapshot_path: None,
            ..Default::default()
        },
        &clock,
    );
    let id = sessions.create(new_session("alice")).unwrap();

    let inside = with_current_session(id.clone(), async { sessions.current() }).await;
    assert_eq!(inside.unwrap().username, "alice");

    assert!(matches!(
        sessions.current().unwrap_err(),
        SentinelError::Unauthorized
    ));
}

#[tokio::test]
async fn create_after_shutdown_fails() {
    let clock = Arc::new(ManualClock::starting_now());
    let sessions = store(
        SessionConfig {
            snapshot_path: None,
            ..Default::default()
        },
        &clock,
    );
    sessions.shutdown().await.unwrap();

    let err = sessions.create(new_session("alice")).unwrap_err();
    assert!(matches!(err, SentinelError::Internal(_)));
}
