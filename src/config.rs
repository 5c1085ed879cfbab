//! Monitor configuration: loaded once at startup, immutable thereafter.
//!
//! The file lives at `config/monitor.toml` by default; `MONITOR_CONFIG_PATH`
//! overrides it. Credentials never live in the file — they come from the
//! environment and are passed through opaque to the adapters.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;

use crate::registry::Source;

const ENV_PATH: &str = "MONITOR_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/monitor.toml";

pub const ENV_TRANSPORT_TOKEN: &str = "TRANSPORT_API_TOKEN";
pub const ENV_ORACLE_KEY: &str = "ORACLE_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("missing configuration: {0}")]
    Missing(String),
}

fn default_confidence_floor() -> f64 {
    0.6
}

/// Fixed configuration shape. Unknown keys are rejected at load.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Monitoring interval in seconds. Fixed-interval cadence.
    pub interval_secs: u64,
    /// Maximum items to fetch per channel per cycle; also the window cap.
    pub max_per_check: usize,
    /// Results below this confidence are treated as "no topic".
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
    /// Ceiling on per-source rate-limit backoff. Defaults to 8x interval.
    #[serde(default)]
    pub backoff_ceiling_secs: Option<u64>,
    /// Model identifier handed to the correlation oracle.
    pub oracle_model: String,
    /// Base URL of the channel transport API.
    pub transport_base_url: String,
    pub sources: Vec<Source>,
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn backoff_ceiling(&self) -> Duration {
        Duration::from_secs(
            self.backoff_ceiling_secs
                .unwrap_or(self.interval_secs.saturating_mul(8)),
        )
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid("interval_secs must be > 0".into()));
        }
        if self.max_per_check == 0 {
            return Err(ConfigError::Invalid("max_per_check must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(ConfigError::Invalid(
                "confidence_floor must be within [0, 1]".into(),
            ));
        }
        if self.oracle_model.trim().is_empty() {
            return Err(ConfigError::Invalid("oracle_model must not be empty".into()));
        }
        if self.sources.is_empty() {
            return Err(ConfigError::Missing("no sources configured".into()));
        }
        Ok(self)
    }
}

/// Load and validate configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<MonitorConfig, ConfigError> {
    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::Missing(format!("reading {}: {e}", path.display())))?;
    let cfg: MonitorConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::Invalid(format!("parsing {}: {e}", path.display())))?;
    cfg.validate()
}

/// Load using `MONITOR_CONFIG_PATH` when set, else the default path.
pub fn load_default() -> Result<MonitorConfig, ConfigError> {
    if let Ok(p) = env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(ConfigError::Missing(format!(
                "{ENV_PATH} points to non-existent path {}",
                pb.display()
            )));
        }
        return load_from(&pb);
    }
    load_from(Path::new(DEFAULT_PATH))
}

/// Opaque credentials read from the environment.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub transport_token: String,
    pub oracle_api_key: String,
}

pub fn load_credentials() -> Result<Credentials, ConfigError> {
    let transport_token = env::var(ENV_TRANSPORT_TOKEN)
        .map_err(|_| ConfigError::Missing(format!("{ENV_TRANSPORT_TOKEN} not set")))?;
    let oracle_api_key = env::var(ENV_ORACLE_KEY)
        .map_err(|_| ConfigError::Missing(format!("{ENV_ORACLE_KEY} not set")))?;
    Ok(Credentials {
        transport_token,
        oracle_api_key,
    })
}
