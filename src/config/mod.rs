//! Configuration management

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub media: MediaConfig,
    pub client: ClientConfig,
    pub process: ProcessConfig,
    pub statistics: StatisticsConfig,
}

/// Platform-level media defaults; these win over client-level defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub default_voice: Option<String>,
    pub default_renderer: Option<String>,
}

/// Defaults inherited from the transport client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub default_voice: Option<String>,
    pub default_renderer: Option<String>,
    /// Default deadline applied to dial commands
    pub command_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_voice: None,
            default_renderer: None,
            command_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// How long active calls may drain naturally during shutdown before
    /// being forcibly terminated
    pub shutdown_grace_secs: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    pub interval_secs: u64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

impl Config {
    /// Load configuration: built-in defaults, an optional TOML file, then
    /// `SWITCHBOARD_`-prefixed environment overrides
    ///
    /// Invalid values are fatal to process boot.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Config::default())
            .map_err(|e| EngineError::Configuration(e.to_string()))?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix("SWITCHBOARD").separator("__"))
            .build()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.client.command_timeout_secs == 0 {
            return Err(EngineError::Configuration(
                "client.command_timeout_secs must be positive".to_string(),
            ));
        }
        if self.statistics.interval_secs == 0 {
            return Err(EngineError::Configuration(
                "statistics.interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.client.command_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.process.shutdown_grace_secs)
    }

    pub fn statistics_interval(&self) -> Duration {
        Duration::from_secs(self.statistics.interval_secs)
    }
}
