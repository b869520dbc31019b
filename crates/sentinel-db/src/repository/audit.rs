//! SurrealDB-backed audit trail.

use chrono::{DateTime, Utc};
use sentinel_core::error::SentinelResult;
use sentinel_core::models::audit::{AuditEvent, AuditEventKind, AuditOutcome};
use sentinel_core::repository::AuditSink;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct AuditRow {
    kind: String,
    outcome: String,
    actor_id: Option<String>,
    username: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    detail: serde_json::Value,
    timestamp: DateTime<Utc>,
}

fn parse_outcome(s: &str) -> Result<AuditOutcome, DbError> {
    match s {
        "Success" => Ok(AuditOutcome::Success),
        "Failure" => Ok(AuditOutcome::Failure),
        "Denied" => Ok(AuditOutcome::Denied),
        other => Err(DbError::Decode(format!("unknown audit outcome: {other}"))),
    }
}

impl AuditRow {
    fn try_into_event(self) -> Result<AuditEvent, DbError> {
        let kind = AuditEventKind::parse(&self.kind)
            .ok_or_else(|| DbError::Decode(format!("unknown audit kind: {}", self.kind)))?;
        let actor_id = self
            .actor_id
            .map(|id| Uuid::parse_str(&id))
            .transpose()
            .map_err(|e| DbError::Decode(format!("invalid actor UUID: {e}")))?;

        Ok(AuditEvent {
            kind,
            outcome: parse_outcome(&self.outcome)?,
            actor_id,
            username: self.username,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            detail: self.detail,
            timestamp: self.timestamp,
        })
    }
}

/// Appends audit events to the `audit_event` table.
#[derive(Clone)]
pub struct SurrealAuditSink<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditSink<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Most recent events first.
    pub async fn list_recent(&self, limit: u32) -> SentinelResult<Vec<AuditEvent>> {
        let mut result = self
            .db
            .query(
                "SELECT * FROM audit_event \
                 ORDER BY recorded_at DESC, timestamp DESC \
                 LIMIT $limit",
            )
            .bind(("limit", limit))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AuditRow> = result.take(0).map_err(DbError::from)?;

        let events = rows
            .into_iter()
            .map(|row| row.try_into_event())
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(events)
    }
}

impl<C: Connection> AuditSink for SurrealAuditSink<C> {
    async fn record(&self, event: AuditEvent) -> SentinelResult<()> {
        let result = self
            .db
            .query(
                "CREATE audit_event SET \
                 kind = $kind, outcome = $outcome, \
                 actor_id = $actor_id, username = $username, \
                 ip_address = $ip_address, user_agent = $user_agent, \
                 detail = $detail, timestamp = $timestamp",
            )
            .bind(("kind", event.kind.as_str().to_string()))
            .bind(("outcome", event.outcome.as_str().to_string()))
            .bind(("actor_id", event.actor_id.map(|id| id.to_string())))
            .bind(("username", event.username))
            .bind(("ip_address", event.ip_address))
            .bind(("user_agent", event.user_agent))
            .bind(("detail", event.detail))
            .bind(("timestamp", event.timestamp))
            .await
            .map_err(DbError::from)?;

        result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }
}
