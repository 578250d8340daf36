//! Environment configuration, read once at startup.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use backend_cli::{CLI_BACKEND_ID, DEFAULT_CLI_PROGRAM};
use backend_mock::MOCK_BACKEND_ID;
use chatgate::InactivityPolicy;
use history_store::default_config_root;
use thiserror::Error;

pub const BACKEND_ENV_VAR: &str = "CHATGATE_BACKEND";
pub const CLI_PATH_ENV_VAR: &str = "CHATGATE_CLI_PATH";
pub const CONFIG_DIR_ENV_VAR: &str = "CHATGATE_CONFIG_DIR";
pub const MODEL_ENV_VAR: &str = "CHATGATE_MODEL";
pub const IDLE_WARN_ENV_VAR: &str = "CHATGATE_IDLE_WARN_SECS";
pub const IDLE_EXPIRE_ENV_VAR: &str = "CHATGATE_IDLE_EXPIRE_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Unsupported backend '{0}'. Available backends: {CLI_BACKEND_ID}, {MOCK_BACKEND_ID}")]
    UnknownBackend(String),
    #[error("{key} must be a positive number of seconds, got '{value}'")]
    InvalidSeconds { key: &'static str, value: String },
    #[error("inactivity warning ({warn_secs}s) must come before expiry ({expire_secs}s)")]
    WarnAfterExpiry { warn_secs: u64, expire_secs: u64 },
    #[error("no config directory available; set {CONFIG_DIR_ENV_VAR}")]
    NoConfigDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Cli,
    Mock,
}

impl BackendKind {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            CLI_BACKEND_ID => Ok(Self::Cli),
            MOCK_BACKEND_ID => Ok(Self::Mock),
            unknown => Err(ConfigError::UnknownBackend(unknown.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub backend: BackendKind,
    pub cli_path: PathBuf,
    pub config_root: PathBuf,
    pub model: Option<String>,
    pub inactivity: InactivityPolicy,
}

impl EnvConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match env_string_opt(BACKEND_ENV_VAR) {
            Some(value) => BackendKind::parse(&value)?,
            None => BackendKind::Cli,
        };

        let config_root = match env_string_opt(CONFIG_DIR_ENV_VAR) {
            Some(dir) => PathBuf::from(dir),
            None => default_config_root().map_err(|_| ConfigError::NoConfigDir)?,
        };

        let defaults = InactivityPolicy::default();
        let warn_after = env_seconds(IDLE_WARN_ENV_VAR)?.unwrap_or(defaults.warn_after);
        let expire_after = env_seconds(IDLE_EXPIRE_ENV_VAR)?.unwrap_or(defaults.expire_after);
        if warn_after >= expire_after {
            return Err(ConfigError::WarnAfterExpiry {
                warn_secs: warn_after.as_secs(),
                expire_secs: expire_after.as_secs(),
            });
        }

        Ok(Self {
            backend,
            cli_path: env_string_opt(CLI_PATH_ENV_VAR)
                .map_or_else(|| PathBuf::from(DEFAULT_CLI_PROGRAM), PathBuf::from),
            config_root,
            model: env_string_opt(MODEL_ENV_VAR),
            inactivity: InactivityPolicy {
                warn_after,
                expire_after,
            },
        })
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_seconds(key: &'static str) -> Result<Option<Duration>, ConfigError> {
    let Some(value) = env_string_opt(key) else {
        return Ok(None);
    };

    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Some(Duration::from_secs(secs))),
        _ => Err(ConfigError::InvalidSeconds { key, value }),
    }
}
