//! Schema definitions and migration runner for SurrealDB.
//!
//! All tables are SCHEMAFULL. UUIDs are stored as record ids and string
//! fields. Case-insensitive uniqueness (usernames, emails, role names) is
//! enforced through lower-cased `*_key` columns with UNIQUE indexes.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::{debug, info};

use crate::error::DbError;

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct AppliedVersion {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "credentials_roles_audit",
    sql: SCHEMA_V1,
}];

fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

// -----------------------------------------------------------------------
// Schema v1: initial table definitions
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Users (credential records)
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD username ON TABLE user TYPE string;
DEFINE FIELD username_key ON TABLE user TYPE string;
DEFINE FIELD email ON TABLE user TYPE string;
DEFINE FIELD email_key ON TABLE user TYPE string;
DEFINE FIELD password_hash ON TABLE user TYPE string;
DEFINE FIELD active ON TABLE user TYPE bool DEFAULT true;
DEFINE FIELD failed_login_attempts ON TABLE user TYPE int DEFAULT 0 \
    ASSERT $value >= 0;
DEFINE FIELD last_failed_login_at ON TABLE user TYPE option<datetime>;
DEFINE FIELD last_login_at ON TABLE user TYPE option<datetime>;
DEFINE FIELD roles ON TABLE user TYPE array DEFAULT [];
DEFINE FIELD roles.* ON TABLE user TYPE string;
DEFINE FIELD created_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_user_username ON TABLE user COLUMNS username_key UNIQUE;
DEFINE INDEX idx_user_email ON TABLE user COLUMNS email_key UNIQUE;

-- =======================================================================
-- Roles
-- =======================================================================
DEFINE TABLE role SCHEMAFULL;
DEFINE FIELD name ON TABLE role TYPE string;
DEFINE FIELD name_key ON TABLE role TYPE string;
DEFINE FIELD description ON TABLE role TYPE string;
DEFINE FIELD is_system ON TABLE role TYPE bool DEFAULT false;
DEFINE FIELD permissions ON TABLE role TYPE array DEFAULT [];
DEFINE FIELD permissions.* ON TABLE role TYPE string;
DEFINE FIELD created_at ON TABLE role TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE role TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_role_name ON TABLE role COLUMNS name_key UNIQUE;

-- =======================================================================
-- Audit events (append-only)
-- =======================================================================
DEFINE TABLE audit_event SCHEMAFULL;
DEFINE FIELD kind ON TABLE audit_event TYPE string;
DEFINE FIELD outcome ON TABLE audit_event TYPE string \
    ASSERT $value IN ['Success', 'Failure', 'Denied'];
DEFINE FIELD actor_id ON TABLE audit_event TYPE option<string>;
DEFINE FIELD username ON TABLE audit_event TYPE option<string>;
DEFINE FIELD ip_address ON TABLE audit_event TYPE option<string>;
DEFINE FIELD user_agent ON TABLE audit_event TYPE option<string>;
DEFINE FIELD detail ON TABLE audit_event TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD timestamp ON TABLE audit_event TYPE datetime;
DEFINE FIELD recorded_at ON TABLE audit_event TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_audit_recorded_at ON TABLE audit_event \
    COLUMNS recorded_at;
";

/// Bring the schema up to date and return how many migrations ran.
///
/// Each migration and its `_migration` row commit in one transaction, so a
/// failed step leaves the previous version in place. A database stamped
/// with a version this build does not know is refused rather than written
/// to.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(format!("migration table: {e}")))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let rows: Vec<AppliedVersion> = result.take(0)?;
    let current = rows.first().map_or(0, |row| row.version);

    let latest = latest_version();
    if current > latest {
        return Err(DbError::Migration(format!(
            "database schema v{current} is newer than this build (v{latest})"
        )));
    }

    let mut applied = 0;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let script = format!(
            "BEGIN TRANSACTION;\n{}\nCREATE _migration SET version = $version, name = $name;\nCOMMIT TRANSACTION;",
            migration.sql
        );
        db.query(script)
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!("v{} {}: {e}", migration.version, migration.name))
            })?;

        info!(
            schema.version = migration.version,
            schema.step = migration.name,
            "Schema migration applied"
        );
        applied += 1;
    }

    if applied == 0 {
        debug!(schema.version = current, "Schema already current");
    }
    Ok(applied)
}
