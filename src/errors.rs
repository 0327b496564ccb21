//! Error hierarchy for the spooling pipeline.
//!
//! Termination of a stage is not an error here; stages signal it through
//! their control flow. These types cover the operational failures around
//! the stages: configuration, lifecycle signal delivery and process setup.

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Lifecycle signal delivery failures
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Filesystem failures while preparing the process environment
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// No stage was listening for the shutdown broadcast
    #[error("shutdown broadcast failed: {0}")]
    ShutdownBroadcast(String),

    /// No stage was listening for the configuration broadcast
    #[error("configuration broadcast failed: {0}")]
    ConfigBroadcast(String),
}
