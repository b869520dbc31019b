//! Opening the credential store.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::{info, warn};

use crate::error::DbError;
use crate::schema::run_migrations;

/// Where the credential store lives and how to sign in to it.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// `host:port` of the SurrealDB WebSocket endpoint.
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Upper bound on connect + sign-in + namespace selection.
    pub connect_timeout_secs: u64,
}

impl DbConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "sentinel".into(),
            database: "main".into(),
            username: "root".into(),
            password: "root".into(),
            connect_timeout_secs: 10,
        }
    }
}

// The password never reaches logs.
impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("url", &self.url)
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// A signed-in client whose schema is current.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Client>,
}

impl DbManager {
    /// Connect, sign in, select the namespace and database, then apply any
    /// pending schema migrations.
    pub async fn open(config: &DbConfig) -> Result<Self, DbError> {
        let started = Instant::now();

        let db = match tokio::time::timeout(config.connect_timeout(), connect(config)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    db.url = %config.url,
                    timeout_secs = config.connect_timeout().as_secs(),
                    "Credential store did not answer in time"
                );
                return Err(DbError::Unavailable {
                    url: config.url.clone(),
                    stage: "connect",
                    reason: "timed out".into(),
                });
            }
        };

        let applied = run_migrations(&db).await?;

        info!(
            db.url = %config.url,
            db.namespace = %config.namespace,
            db.database = %config.database,
            migrations_applied = applied,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Credential store ready"
        );
        Ok(Self { db })
    }

    pub fn client(&self) -> &Surreal<Client> {
        &self.db
    }
}

async fn connect(config: &DbConfig) -> Result<Surreal<Client>, DbError> {
    let unavailable = |stage: &'static str| {
        move |e: surrealdb::Error| DbError::Unavailable {
            url: config.url.clone(),
            stage,
            reason: e.to_string(),
        }
    };

    let db = Surreal::new::<Ws>(&config.url)
        .await
        .map_err(unavailable("connect"))?;
    db.signin(Root {
        username: config.username.clone(),
        password: config.password.clone(),
    })
    .await
    .map_err(unavailable("signin"))?;
    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(unavailable("select"))?;
    Ok(db)
}
