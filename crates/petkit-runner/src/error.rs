//! Error type for runner commands.

use petkit_engine::{ControlError, FetchError, RegistryError, TransportError};
use thiserror::Error;

use crate::config::ConfigError;

/// Anything that can stop a runner command.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("bluetooth: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("control failed: {0}")]
    Control(#[from] ControlError),

    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

pub type RunnerResult<T> = Result<T, RunnerError>;
