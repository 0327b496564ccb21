use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MonitoringConfig {
    #[serde(default = "default_prometheus_enabled")]
    pub prometheus_enabled: bool,

    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: default_prometheus_enabled(),
            prometheus_port: default_prometheus_port(),
        }
    }
}

impl MonitoringConfig {
    pub fn validate(&self) -> Result<()> {
        if self.prometheus_enabled && self.prometheus_port == 0 {
            return Err(Error::Config(ConfigError::Message(
                "prometheus_port cannot be 0 when monitoring is enabled".into(),
            )));
        }

        Ok(())
    }
}

fn default_prometheus_enabled() -> bool {
    false
}

fn default_prometheus_port() -> u16 {
    8080
}
