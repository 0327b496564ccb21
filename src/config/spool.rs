use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Runtime parameters for the spooling stage.
///
/// A value of this type is an immutable snapshot; a live reload replaces
/// the whole snapshot rather than mutating fields in place.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SpoolConfig {
    /// Maximum number of events per batch
    #[serde(default = "default_spool_size")]
    pub spool_size: usize,

    /// Maximum inactivity (in milliseconds) before a partial batch is
    /// forced downstream
    #[serde(default = "default_spool_timeout_ms")]
    pub spool_timeout_ms: u64,

    /// Depth of the bounded intake queue shared by producers; a full
    /// queue blocks producers rather than growing
    #[serde(default = "default_intake_backlog")]
    pub intake_backlog: usize,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            spool_size: default_spool_size(),
            spool_timeout_ms: default_spool_timeout_ms(),
            intake_backlog: default_intake_backlog(),
        }
    }
}

impl SpoolConfig {
    pub fn spool_timeout(&self) -> Duration {
        Duration::from_millis(self.spool_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.spool_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "spool_size must be greater than 0".into(),
            )));
        }

        if self.spool_timeout_ms < 1 {
            return Err(Error::Config(ConfigError::Message(
                "spool_timeout_ms must be at least 1ms".into(),
            )));
        }

        if self.intake_backlog == 0 {
            return Err(Error::Config(ConfigError::Message(
                "intake_backlog must be greater than 0".into(),
            )));
        }

        Ok(())
    }
}

fn default_spool_size() -> usize {
    1024
}
// in ms
fn default_spool_timeout_ms() -> u64 {
    5_000
}
fn default_intake_backlog() -> usize {
    16
}
