use std::io;

use alerta_core::remote::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] alerta_core::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid incident id: {0}")]
    InvalidIncidentId(String),
    #[error("Incident not found: {0}")]
    IncidentNotFound(String),
    #[error("Sync failed: {0}")]
    SyncFailed(String),
}
