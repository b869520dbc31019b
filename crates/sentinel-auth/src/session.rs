//! In-memory session store.
//!
//! A single `RwLock`-guarded table of live sessions keyed by opaque id.
//! Every path that mutates the table (create, activity refresh, delete,
//! sweep, load) takes the write lock, so mutations are totally ordered by
//! lock acquisition. The lock is never held across an `.await`.
//!
//! Expiry is enforced twice: lazily when a session is read, and eagerly by
//! a background sweeper (see [`SessionStore::start_sweeper`]). The table
//! can be snapshotted to a JSON file and reloaded on startup.

mod snapshot;
mod sweeper;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use sentinel_core::clock::SharedClock;
use sentinel_core::error::{SentinelError, SentinelResult};
use sentinel_core::models::session::{NewSession, Session, session_id_prefix};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::context;
use crate::error::AuthError;
use crate::token;

use self::sweeper::SweeperHandle;

pub(crate) struct Inner {
    sessions: RwLock<HashMap<String, Session>>,
    config: SessionConfig,
    clock: SharedClock,
    /// Set on every mutation, cleared when a snapshot is taken.
    dirty: AtomicBool,
    closed: AtomicBool,
    sweeper: Mutex<Option<SweeperHandle>>,
    /// Serializes snapshot file writes.
    save_lock: tokio::sync::Mutex<()>,
}

/// Handle to the shared session table. Cheap to clone.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    pub fn new(config: SessionConfig, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: RwLock::new(HashMap::new()),
                config,
                clock,
                dirty: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                sweeper: Mutex::new(None),
                save_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn mark_dirty(&self) {
        self.inner.dirty.store(true, Ordering::Release);
    }

    fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::Acquire)
    }

    /// Insert a new session and return its id.
    ///
    /// The id is 256 bits from the OS-seeded thread RNG; on the off chance
    /// it collides with a live session a new one is drawn.
    pub fn create(&self, input: NewSession) -> SentinelResult<String> {
        let now = self.inner.clock.now();
        let expires_at = now
            .checked_add_signed(self.inner.config.session_lifetime())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut sessions = self.inner.sessions.write();
        if self.is_closed() {
            return Err(AuthError::StoreClosed.into());
        }

        let mut id = token::generate_session_id();
        while sessions.contains_key(&id) {
            id = token::generate_session_id();
        }

        let session = Session {
            id: id.clone(),
            user_id: input.user_id,
            username: input.username,
            roles: input.roles,
            ip_address: input.ip_address,
            user_agent: input.user_agent,
            created_at: now,
            last_activity: now,
            expires_at,
        };
        sessions.insert(id.clone(), session);
        drop(sessions);

        self.mark_dirty();
        debug!(
            session = session_id_prefix(&id),
            user_id = %input.user_id,
            "Session created"
        );
        Ok(id)
    }

    /// Fetch a live session and refresh its last activity.
    ///
    /// This is a read-then-upgrade, not a single atomic operation: the
    /// lookup runs under the read lock, the lock is released, and the
    /// refresh (or removal of an expired entry) runs under the write lock
    /// after re-validating. A session deleted between the two phases reads
    /// as `NotFound`.
    pub fn get(&self, session_id: &str) -> SentinelResult<Session> {
        let now = self.inner.clock.now();
        let timeout = self.inner.config.session_timeout();

        {
            let sessions = self.inner.sessions.read();
            if !sessions.contains_key(session_id) {
                return Err(not_found(session_id));
            }
        }

        self.refresh_or_evict(session_id, now, timeout)
    }

    /// Write phase of [`get`](Self::get). Between the phases another
    /// caller may have removed the entry or refreshed it, so everything is
    /// decided again here.
    fn refresh_or_evict(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
        timeout: chrono::Duration,
    ) -> SentinelResult<Session> {
        let mut sessions = self.inner.sessions.write();
        let Some(session) = sessions.get_mut(session_id) else {
            return Err(not_found(session_id));
        };
        if session.is_expired(now, timeout) {
            sessions.remove(session_id);
            drop(sessions);
            self.mark_dirty();
            debug!(session = session_id_prefix(session_id), "Session expired on access");
            return Err(SentinelError::Expired);
        }
        if now > session.last_activity {
            session.last_activity = now;
        }
        let session = session.clone();
        drop(sessions);

        self.mark_dirty();
        Ok(session)
    }

    /// Look a session up without refreshing or removing it. Expired
    /// sessions read as `None`.
    pub fn peek(&self, session_id: &str) -> Option<Session> {
        let now = self.inner.clock.now();
        let timeout = self.inner.config.session_timeout();
        self.inner
            .sessions
            .read()
            .get(session_id)
            .filter(|s| !s.is_expired(now, timeout))
            .cloned()
    }

    /// The session bound to the current interaction
    /// (see [`context::with_current_session`]).
    pub fn current(&self) -> SentinelResult<Session> {
        let session_id = context::current_session_id().ok_or(SentinelError::Unauthorized)?;
        self.get(&session_id)
    }

    /// Remove one session. Returns whether it was present.
    pub fn delete(&self, session_id: &str) -> SentinelResult<bool> {
        let mut sessions = self.inner.sessions.write();
        if self.is_closed() {
            return Err(AuthError::StoreClosed.into());
        }
        let removed = sessions.remove(session_id).is_some();
        drop(sessions);

        if removed {
            self.mark_dirty();
            debug!(session = session_id_prefix(session_id), "Session deleted");
        }
        Ok(removed)
    }

    /// Remove every session owned by `user_id`.
    pub fn delete_all_for_user(&self, user_id: Uuid) -> SentinelResult<usize> {
        let mut sessions = self.inner.sessions.write();
        if self.is_closed() {
            return Err(AuthError::StoreClosed.into());
        }
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        let removed = before - sessions.len();
        drop(sessions);

        if removed > 0 {
            self.mark_dirty();
            info!(user_id = %user_id, removed, "Revoked user sessions");
        }
        Ok(removed)
    }

    /// Evict every expired session in one write-locked pass.
    pub fn sweep(&self) -> usize {
        let now = self.inner.clock.now();
        let timeout = self.inner.config.session_timeout();

        let mut sessions = self.inner.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now, timeout));
        let removed = before - sessions.len();
        drop(sessions);

        if removed > 0 {
            self.mark_dirty();
            debug!(removed, "Swept expired sessions");
        }
        removed
    }

    /// Number of sessions that are still valid right now.
    pub fn active_count(&self) -> usize {
        let now = self.inner.clock.now();
        let timeout = self.inner.config.session_timeout();
        self.inner
            .sessions
            .read()
            .values()
            .filter(|s| !s.is_expired(now, timeout))
            .count()
    }

    /// Number of entries in the table, expired or not.
    pub fn len(&self) -> usize {
        self.inner.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Populate the table from the snapshot file, skipping sessions that
    /// have expired since it was written. Returns how many were restored.
    ///
    /// A missing file means there is nothing to restore.
    pub async fn load(&self) -> SentinelResult<usize> {
        let Some(path) = self.inner.config.snapshot_path.as_deref() else {
            return Ok(0);
        };
        let Some(persisted) = snapshot::read(path).await? else {
            debug!(path = %path.display(), "No session snapshot to load");
            return Ok(0);
        };

        let now = self.inner.clock.now();
        let timeout = self.inner.config.session_timeout();
        let total = persisted.len();

        let mut sessions = self.inner.sessions.write();
        let mut restored = 0;
        for (id, session) in persisted {
            if session.is_expired(now, timeout) || session.id != id {
                continue;
            }
            sessions.insert(id, session);
            restored += 1;
        }
        drop(sessions);

        info!(
            path = %path.display(),
            restored,
            discarded = total - restored,
            "Loaded session snapshot"
        );
        Ok(restored)
    }

    /// Write the live (non-expired) sessions to the snapshot file.
    ///
    /// The file is replaced atomically; when no live sessions remain it is
    /// removed instead.
    pub async fn save(&self) -> SentinelResult<()> {
        let Some(path) = self.inner.config.snapshot_path.as_deref() else {
            return Ok(());
        };
        let _guard = self.inner.save_lock.lock().await;

        let now = self.inner.clock.now();
        let timeout = self.inner.config.session_timeout();
        let live: HashMap<String, Session> = {
            let sessions = self.inner.sessions.read();
            // Cleared under the lock: any later mutation sets it again.
            self.inner.dirty.store(false, Ordering::Release);
            sessions
                .iter()
                .filter(|(_, s)| !s.is_expired(now, timeout))
                .map(|(id, s)| (id.clone(), s.clone()))
                .collect()
        };

        if let Err(e) = snapshot::write(path, &live).await {
            self.mark_dirty();
            return Err(e);
        }
        debug!(path = %path.display(), sessions = live.len(), "Saved session snapshot");
        Ok(())
    }

    /// Spawn the background sweeper on the current tokio runtime.
    ///
    /// Calling this while a sweeper is already running does nothing.
    pub fn start_sweeper(&self) -> SentinelResult<()> {
        if self.is_closed() {
            return Err(AuthError::StoreClosed.into());
        }
        let mut slot = self.inner.sweeper.lock();
        if slot.is_some() {
            warn!("Session sweeper already running");
            return Ok(());
        }
        *slot = Some(sweeper::spawn(Arc::downgrade(&self.inner)));
        info!(
            interval_secs = self.inner.config.cleanup_interval().as_secs(),
            "Session sweeper started"
        );
        Ok(())
    }

    /// Stop the sweeper, wait for it to exit, write the final snapshot and
    /// close the store. Later mutations fail with an internal error.
    pub async fn shutdown(&self) -> SentinelResult<()> {
        {
            // Taken under the write lock so no create can slip in after the
            // final snapshot.
            let _sessions = self.inner.sessions.write();
            self.inner.closed.store(true, Ordering::Release);
        }

        let handle = self.inner.sweeper.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }

        self.save().await?;
        info!(sessions = self.active_count(), "Session store shut down");
        Ok(())
    }

    fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }
}

fn not_found(session_id: &str) -> SentinelError {
    SentinelError::not_found("session", session_id_prefix(session_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sentinel_core::clock::{Clock, ManualClock};

    fn store_with(config: SessionConfig) -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (SessionStore::new(config, clock.clone()), clock)
    }

    fn memory_config() -> SessionConfig {
        SessionConfig {
            session_timeout_secs: 60,
            session_lifetime_secs: 3600,
            cleanup_interval_secs: 10,
            snapshot_path: None,
            persist_on_mutation: false,
        }
    }

    fn new_session(user_id: Uuid) -> NewSession {
        NewSession {
            user_id,
            username: "alice".into(),
            roles: vec!["user".into()],
            ip_address: Some("127.0.0.1".into()),
            user_agent: Some("TestAgent".into()),
        }
    }

    #[test]
    fn create_then_get() {
        let (store, clock) = store_with(memory_config());
        let user_id = Uuid::new_v4();
        let id = store.create(new_session(user_id)).unwrap();

        let session = store.get(&id).unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.user_id, user_id);
        assert_eq!(session.roles, vec!["user".to_string()]);
        assert_eq!(session.created_at, clock.now());
        assert_eq!(session.expires_at, clock.now() + Duration::seconds(3600));
    }

    #[test]
    fn get_refreshes_last_activity() {
        let (store, clock) = store_with(memory_config());
        let id = store.create(new_session(Uuid::new_v4())).unwrap();

        clock.advance(Duration::seconds(45));
        let refreshed = store.get(&id).unwrap();
        assert_eq!(refreshed.last_activity, clock.now());

        // 90s after creation but only 45s idle.
        clock.advance(Duration::seconds(45));
        assert!(store.get(&id).is_ok());
    }

    #[test]
    fn idle_session_expires_and_is_removed() {
        let (store, clock) = store_with(memory_config());
        let id = store.create(new_session(Uuid::new_v4())).unwrap();

        clock.advance(Duration::seconds(61));
        assert!(matches!(store.get(&id), Err(SentinelError::Expired)));
        assert!(matches!(store.get(&id), Err(SentinelError::NotFound { .. })));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn absolute_expiry_applies_even_when_active() {
        let (store, clock) = store_with(SessionConfig {
            session_lifetime_secs: 100,
            ..memory_config()
        });
        let id = store.create(new_session(Uuid::new_v4())).unwrap();

        clock.advance(Duration::seconds(50));
        store.get(&id).unwrap();
        clock.advance(Duration::seconds(51));
        assert!(matches!(store.get(&id), Err(SentinelError::Expired)));
    }

    #[test]
    fn unknown_session_is_not_found() {
        let (store, _) = store_with(memory_config());
        let err = store.get("missing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn session_removed_between_phases_is_not_found() {
        let (store, clock) = store_with(memory_config());
        let id = store.create(new_session(Uuid::new_v4())).unwrap();

        // Expired as seen by the read phase, then deleted by someone else
        // before the write phase runs.
        clock.advance(Duration::seconds(61));
        store.delete(&id).unwrap();

        let err = store
            .refresh_or_evict(&id, clock.now(), store.config().session_timeout())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn refreshed_between_phases_stays_valid() {
        let (store, clock) = store_with(memory_config());
        let id = store.create(new_session(Uuid::new_v4())).unwrap();
        let stale_now = clock.now() + Duration::seconds(61);

        // A concurrent get at t+30 refreshed the entry; our read phase had
        // judged it against an earlier snapshot.
        clock.advance(Duration::seconds(30));
        store.get(&id).unwrap();

        let session = store
            .refresh_or_evict(&id, stale_now, store.config().session_timeout())
            .unwrap();
        assert_eq!(session.last_activity, stale_now);
    }

    #[test]
    fn unbounded_timeouts_never_expire() {
        let (store, clock) = store_with(SessionConfig {
            session_timeout_secs: u64::MAX,
            session_lifetime_secs: u64::MAX,
            ..memory_config()
        });
        let id = store.create(new_session(Uuid::new_v4())).unwrap();

        clock.advance(Duration::days(365 * 50));
        assert!(store.get(&id).is_ok());
        assert_eq!(store.sweep(), 0);
        assert_eq!(store.active_count(), 1);
    }

    #[test]
    fn idle_deadline_past_the_calendar_does_not_panic() {
        let (store, _) = store_with(SessionConfig {
            session_timeout_secs: u64::MAX,
            ..memory_config()
        });
        let id = store.create(new_session(Uuid::new_v4())).unwrap();

        // Last activity near the end of time: any timeout overflows.
        store
            .inner
            .sessions
            .write()
            .get_mut(&id)
            .unwrap()
            .last_activity = DateTime::<Utc>::MAX_UTC - Duration::seconds(1);

        assert!(store.get(&id).is_ok());
        assert_eq!(store.sweep(), 0);
    }

    #[test]
    fn peek_does_not_refresh() {
        let (store, clock) = store_with(memory_config());
        let id = store.create(new_session(Uuid::new_v4())).unwrap();
        let created = clock.now();

        clock.advance(Duration::seconds(30));
        let peeked = store.peek(&id).unwrap();
        assert_eq!(peeked.last_activity, created);

        clock.advance(Duration::seconds(31));
        assert!(store.peek(&id).is_none());
        // Peek never removes.
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_and_delete_all_for_user() {
        let (store, _) = store_with(memory_config());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let a1 = store.create(new_session(alice)).unwrap();
        let _a2 = store.create(new_session(alice)).unwrap();
        let b1 = store.create(new_session(bob)).unwrap();

        assert!(store.delete(&a1).unwrap());
        assert!(!store.delete(&a1).unwrap());

        assert_eq!(store.delete_all_for_user(alice).unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(&b1).is_ok());
    }

    #[test]
    fn sweep_removes_only_expired() {
        let (store, clock) = store_with(memory_config());
        let stale = store.create(new_session(Uuid::new_v4())).unwrap();
        clock.advance(Duration::seconds(40));
        let fresh = store.create(new_session(Uuid::new_v4())).unwrap();
        clock.advance(Duration::seconds(30));

        assert_eq!(store.active_count(), 1);
        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.peek(&stale).is_none());
        assert!(store.peek(&fresh).is_some());
    }

    #[tokio::test]
    async fn current_requires_an_interaction_scope() {
        let (store, _) = store_with(memory_config());
        let id = store.create(new_session(Uuid::new_v4())).unwrap();

        assert!(matches!(store.current(), Err(SentinelError::Unauthorized)));

        let current = context::with_current_session(id.clone(), async { store.current() })
            .await
            .unwrap();
        assert_eq!(current.id, id);
    }

    #[tokio::test]
    async fn mutations_fail_after_shutdown() {
        let (store, _) = store_with(memory_config());
        let id = store.create(new_session(Uuid::new_v4())).unwrap();
        store.shutdown().await.unwrap();

        assert!(matches!(
            store.create(new_session(Uuid::new_v4())),
            Err(SentinelError::Internal(_))
        ));
        assert!(store.delete(&id).is_err());
        assert!(store.start_sweeper().is_err());
    }

    #[test]
    fn concurrent_creates_and_reads() {
        let (store, _) = store_with(memory_config());
        let user_id = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let mut ids = Vec::new();
                    for _ in 0..50 {
                        let id = store.create(new_session(user_id)).unwrap();
                        store.get(&id).unwrap();
                        ids.push(id);
                    }
                    ids
                })
            })
            .collect();

        let mut all: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 400);
        assert_eq!(store.len(), 400);
        assert_eq!(store.delete_all_for_user(user_id).unwrap(), 400);
    }
}
