//! Ledger configuration.
//!
//! Provides [`LedgerConfig`] with defaults for the data directory, decay
//! half-life, and bin count. Values are layered: built-in defaults, then an
//! optional TOML file, then `FAIRSHARE_*` environment variables. Command-line
//! flags are applied on top by the binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fairshare_core::constants::{DEFAULT_HALF_LIFE_WEEKS, DEFAULT_USAGE_PERIODS};

/// Environment variable prefix, e.g. `FAIRSHARE_USAGE_PERIODS=6`.
pub const ENV_PREFIX: &str = "FAIRSHARE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)] Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")] Invalid(String),
}

/// Configuration for a ledger instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Decay half-life in weeks.
    pub priority_decay_half_life: u32,
    /// Usage periods per association. Only read when a ledger is created.
    pub usage_periods: usize,
    /// Log level filter string (e.g. "info", "debug", "fairshare_decay=trace").
    pub log_level: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fairshare");

        Self {
            data_dir,
            priority_decay_half_life: DEFAULT_HALF_LIFE_WEEKS,
            usage_periods: DEFAULT_USAGE_PERIODS,
            log_level: "info".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Load from an optional config file and the process environment.
    ///
    /// A file given explicitly must exist.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(file, None)
    }

    /// Like [`load`](Self::load), but reads environment overrides from `env`
    /// instead of the process environment when it is `Some`.
    pub fn load_with_env(
        file: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(env),
        );

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.priority_decay_half_life == 0 {
            return Err(ConfigError::Invalid(
                "priority_decay_half_life must be at least 1".into(),
            ));
        }
        if self.usage_periods == 0 {
            return Err(ConfigError::Invalid("usage_periods must be at least 1".into()));
        }
        Ok(())
    }

    /// Path to the RocksDB ledger directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("ledgerdata")
    }
}
