//! The session of the interaction currently being served.
//!
//! Deeply nested code resolves the acting session through a tokio
//! task-local instead of a process-wide slot, so concurrent interactions
//! in one process each see their own session. The value is visible only
//! inside the [`with_current_session`] scope, and not in tasks spawned
//! from it: pass the id explicitly across `tokio::spawn`.

use std::future::Future;

tokio::task_local! {
    static CURRENT_SESSION: String;
}

/// Run `fut` with `session_id` as the current session.
pub async fn with_current_session<F>(session_id: impl Into<String>, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_SESSION.scope(session_id.into(), fut).await
}

/// The current interaction's session id, if any.
pub fn current_session_id() -> Option<String> {
    CURRENT_SESSION.try_with(Clone::clone).ok()
}
