//! Configuration management for the spooling pipeline.
//!
//! Provides configuration loading from multiple sources with priority:
//! 1. Default values (hardcoded)
//! 2. Optional TOML file (explicit path, or `ESPOOL_CONFIG`)
//! 3. Environment variables (highest priority)

mod monitoring;
mod spool;

pub use monitoring::*;
pub use spool::*;

//---
use std::env;
use std::path::PathBuf;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    /// Spooling stage parameters
    #[serde(default)]
    pub spool: SpoolConfig,

    /// Metrics endpoint settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Directory the process writes its log files into
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            spool: SpoolConfig::default(),
            monitoring: MonitoringConfig::default(),
            log_dir: default_log_dir(),
        }
    }
}

impl Settings {
    /// Load configuration with priority:
    /// 1. Defaults
    /// 2. Config file (`config_path` argument, else `ESPOOL_CONFIG`)
    /// 3. Environment variables prefixed `ESPOOL`
    ///
    /// The merged result is validated before it is returned.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        } else if let Ok(path) = env::var("ESPOOL_CONFIG") {
            builder = builder.add_source(File::with_name(&path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("ESPOOL")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Validates all subsystem configurations
    pub fn validate(&self) -> Result<()> {
        self.spool.validate()?;
        self.monitoring.validate()?;

        Ok(())
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

#[cfg(test)]
mod config_test;
