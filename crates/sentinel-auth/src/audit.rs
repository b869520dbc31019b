//! Audit sink that writes events to the tracing pipeline.

use sentinel_core::error::SentinelResult;
use sentinel_core::models::audit::AuditEvent;
use sentinel_core::repository::AuditSink;

/// Emits one structured `info` line per event under the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) -> SentinelResult<()> {
        tracing::info!(
            target: "audit",
            kind = %event.kind,
            outcome = event.outcome.as_str(),
            actor_id = ?event.actor_id,
            username = ?event.username,
            ip = ?event.ip_address,
            detail = %event.detail,
            timestamp = %event.timestamp,
            "audit event"
        );
        Ok(())
    }
}
