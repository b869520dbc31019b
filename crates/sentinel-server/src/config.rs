//! Process configuration, read from a TOML file.

use std::path::{Path, PathBuf};

use sentinel_auth::{AuthConfig, SessionConfig};
use sentinel_db::DbConfig;
use serde::Deserialize;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SENTINEL_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "sentinel.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `tracing` filter directive; `RUST_LOG` takes precedence.
    pub log_filter: String,
    pub database: DbConfig,
    pub auth: AuthConfig,
    pub sessions: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_filter: "sentinel=info".into(),
            database: DbConfig::default(),
            auth: AuthConfig::default(),
            sessions: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Path from `SENTINEL_CONFIG`, or `sentinel.toml`.
    pub fn path_from_env() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
