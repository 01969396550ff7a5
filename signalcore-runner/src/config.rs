//! Serializable signal configuration, loaded from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use signalcore_core::domain::{AccountId, ScriptingParameter, Selection};
use signalcore_core::sim::CostModel;
use thiserror::Error;

use crate::sweep::{combination_count, MAX_COMBINATIONS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config validation failed: {0}")]
    Validation(String),
}

/// Engine knobs shared by the lifecycle, the sweep driver and the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Sleep between pause checks while a sweep is paused.
    pub pause_poll_ms: u64,
    /// Deepest allowed backtest-within-backtest nesting.
    pub max_backtest_depth: usize,
    /// Periodic wake-up interval for the dispatcher. `None` disables timers.
    pub start_interval_secs: Option<u64>,
    /// Simulated slippage, basis points of price against the taker.
    pub slippage_bps: f64,
    /// Simulated commission, basis points of notional per side.
    pub commission_bps: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            pause_poll_ms: 50,
            max_backtest_depth: 2,
            start_interval_secs: None,
            slippage_bps: 0.0,
            commission_bps: 0.0,
        }
    }
}

impl EngineSettings {
    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }

    pub fn cost_model(&self) -> CostModel {
        CostModel::new(self.slippage_bps, self.commission_bps)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pause_poll_ms == 0 {
            return Err(ConfigError::Validation(
                "pause_poll_ms must be positive".into(),
            ));
        }
        if self.max_backtest_depth == 0 {
            return Err(ConfigError::Validation(
                "max_backtest_depth must be at least 1".into(),
            ));
        }
        for (field, value) in [
            ("slippage_bps", self.slippage_bps),
            ("commission_bps", self.commission_bps),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "{field} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

fn default_account() -> String {
    "sim".into()
}

/// Everything needed to stand up one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    pub owner: String,
    /// Strategy name.
    pub name: String,
    #[serde(default = "default_account")]
    pub account: String,
    #[serde(default)]
    pub selections: Vec<Selection>,
    /// Values and sweep ranges applied over the strategy's declared parameters.
    #[serde(default)]
    pub parameters: Vec<ScriptingParameter>,
    #[serde(default)]
    pub engine: EngineSettings,
}

impl SignalConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SignalConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.owner.trim().is_empty() {
            return Err(ConfigError::Validation("owner must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::Validation("name must not be empty".into()));
        }
        for param in &self.parameters {
            param
                .check_sweep()
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
        }
        match combination_count(&self.parameters) {
            Some(n) if n <= MAX_COMBINATIONS => {}
            _ => {
                return Err(ConfigError::Validation(format!(
                    "parameter sweep exceeds {MAX_COMBINATIONS} combinations"
                )))
            }
        }
        self.engine.validate()
    }

    pub fn account_id(&self) -> AccountId {
        AccountId::new(self.account.clone())
    }
}
