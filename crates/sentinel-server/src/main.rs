//! Sentinel Server: process entry point.
//!
//! Connects to SurrealDB, seeds the permission catalog, restores the
//! session table and runs until Ctrl-C, then persists sessions and exits.

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use sentinel_auth::{Authenticator, SessionStore};
use sentinel_authz::{PermissionCatalog, PermissionResolver, RoleManager, seed_catalog};
use sentinel_core::{SentinelError, SharedClock, SystemClock};
use sentinel_db::repository::{
    SurrealAuditSink, SurrealCredentialRepository, SurrealRoleRepository,
};
use sentinel_db::{DbError, DbManager};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, ServerConfig};

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database: {0}")]
    Database(#[from] DbError),
    #[error(transparent)]
    Sentinel(#[from] SentinelError),
    #[error("signal handler: {0}")]
    Signal(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let path = ServerConfig::path_from_env();
    let config = match ServerConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("sentinel: {e}");
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    info!(config = %path.display(), "Starting Sentinel...");

    match run(config).await {
        Ok(()) => {
            info!("Sentinel stopped.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Sentinel failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ServerConfig) -> Result<(), StartupError> {
    let clock: SharedClock = Arc::new(SystemClock);

    let db = DbManager::open(&config.database).await?;

    let role_repo = SurrealRoleRepository::new(db.client().clone());
    let seeded = seed_catalog(PermissionCatalog::standard(), &role_repo).await?;

    let sessions = SessionStore::new(config.sessions.clone(), clock.clone());
    sessions.load().await?;
    sessions.start_sweeper()?;

    let authenticator = Authenticator::new(
        SurrealCredentialRepository::new(db.client().clone()),
        SurrealAuditSink::new(db.client().clone()),
        sessions.clone(),
        config.auth.clone(),
        clock.clone(),
    );
    let resolver = PermissionResolver::new(
        &seeded,
        SurrealRoleRepository::new(db.client().clone()),
        SurrealAuditSink::new(db.client().clone()),
    )
    .with_clock(clock);
    let roles = RoleManager::new(&seeded, role_repo);

    info!(
        active_sessions = sessions.active_count(),
        permissions = resolver.catalog().permissions().len(),
        "Sentinel ready"
    );

    // The UI layer drives `authenticator`, `resolver` and `roles` from here.
    let _services = (authenticator, resolver, roles);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    sessions.shutdown().await?;
    Ok(())
}
