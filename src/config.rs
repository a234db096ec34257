use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::orchestration::RetryConfig;
use crate::util::duration_ms;
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
}

/// Settings for the chain execution engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeout for tasks whose definition sets none.
    #[serde(rename = "default_timeout_ms", with = "duration_ms")]
    pub default_timeout: Duration,
    /// Upper bound on concurrently running tasks per chain.
    pub max_parallelism: usize,
    /// Written into each chain's shared state as `environment`.
    pub environment: String,
    /// Grant one immediate extra attempt on transient failures.
    pub error_recovery: bool,
    /// Lowercase substrings marking an error message as transient.
    pub transient_patterns: Vec<String>,
    /// Buffer size of the broadcast event stream.
    pub event_capacity: usize,
    /// Retry policy for tasks whose definition sets none.
    pub default_retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(300),
            max_parallelism: 4,
            environment: "development".to_string(),
            error_recovery: true,
            transient_patterns: vec![
                "timeout".to_string(),
                "timed out".to_string(),
                "rate limit".to_string(),
                "too many requests".to_string(),
                "connection reset".to_string(),
                "connection refused".to_string(),
                "temporarily unavailable".to_string(),
            ],
            event_capacity: 256,
            default_retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Whether `message` matches one of the transient patterns.
    pub fn is_transient(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        self.transient_patterns
            .iter()
            .any(|p| lower.contains(&p.to_lowercase()))
    }
}

/// Settings for the planner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlannerConfig {
    /// Plans kept per goal type; oldest are evicted first.
    pub history_limit: usize,
    /// A deadline is tight when the estimate exceeds this share of the
    /// remaining time.
    pub deadline_pressure_ratio: f64,
    /// Ceiling for a plan's parallelism level.
    pub max_parallelism: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            deadline_pressure_ratio: 0.8,
            max_parallelism: 8,
        }
    }
}

impl Config {
    pub fn goalchain_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".goalchain"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::goalchain_dir()?.join("goalchain.toml"))
    }

    pub fn log_path() -> Result<PathBuf> {
        Ok(Self::goalchain_dir()?.join("goalchain.log"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        if !path.exists() {
            debug!("config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        debug!(
            max_parallelism = config.engine.max_parallelism,
            environment = %config.engine.environment,
            "config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                debug!(dir = %dir.display(), "creating config directory");
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    pub fn ensure_dirs() -> Result<()> {
        let dir = Self::goalchain_dir()?;
        if !dir.exists() {
            debug!(dir = %dir.display(), "creating goalchain directory");
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.engine.max_parallelism == 0 {
            return Err(Error::Validation(
                "engine.max_parallelism must be at least 1".to_string(),
            ));
        }
        if self.engine.event_capacity == 0 {
            return Err(Error::Validation(
                "engine.event_capacity must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.planner.deadline_pressure_ratio)
            || self.planner.deadline_pressure_ratio == 0.0
        {
            return Err(Error::Validation(
                "planner.deadline_pressure_ratio must be within (0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}
