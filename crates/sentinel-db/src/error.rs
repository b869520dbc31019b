//! Database-specific error types and conversions.

use sentinel_core::error::SentinelError;
use tracing::error;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("cannot reach credential store at {url} ({stage}): {reason}")]
    Unavailable {
        url: String,
        stage: &'static str,
        reason: String,
    },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Corrupt row: {0}")]
    Decode(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("{entity} '{name}' already exists")]
    Conflict { entity: String, name: String },
}

impl DbError {
    /// Caller-facing text. Query text, URLs and driver messages stay in
    /// the log.
    fn public_message(&self) -> &'static str {
        match self {
            DbError::Unavailable { .. } | DbError::Surreal(_) => "credential store unavailable",
            DbError::Migration(_) => "credential store schema is out of date",
            DbError::Decode(_) => "credential store returned a corrupt record",
            DbError::Query(_) => "credential store rejected the request",
            DbError::NotFound { .. } | DbError::Conflict { .. } => "credential store error",
        }
    }
}

impl From<DbError> for SentinelError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => SentinelError::NotFound { entity, id },
            DbError::Conflict { entity, name } => SentinelError::Conflict { entity, name },
            other => {
                error!(error = %other, "Credential store operation failed");
                SentinelError::Database(other.public_message().into())
            }
        }
    }
}
