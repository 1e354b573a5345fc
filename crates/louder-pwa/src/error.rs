//! Lifecycle manager errors

use louder_core::LouderError;
use louder_sw::SwError;
use thiserror::Error;

/// Result type alias for lifecycle operations
pub type PwaResult<T> = Result<T, PwaError>;

#[derive(Error, Debug)]
pub enum PwaError {
    #[error("Service worker error: {0}")]
    Worker(#[from] SwError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid state: {0}")]
    State(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] LouderError),
}

impl PwaError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}
