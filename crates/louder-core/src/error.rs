//! Error types shared across the offline layer

use thiserror::Error;

/// Result type alias for core operations
pub type LouderResult<T> = Result<T, LouderError>;

/// Main error type for configuration and shared plumbing
#[derive(Error, Debug)]
pub enum LouderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LouderError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            LouderError::Config(_) => "config",
            LouderError::Storage(_) => "storage",
            LouderError::NotFound(_) => "not_found",
            LouderError::Io(_) => "io",
            LouderError::Json(_) => "json",
            LouderError::Url(_) => "url",
            LouderError::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(LouderError::config("bad").category(), "config");
        assert_eq!(LouderError::storage("bad").category(), "storage");
        let url_err = url::Url::parse("not a url").unwrap_err();
        assert_eq!(LouderError::from(url_err).category(), "url");
    }

    #[test]
    fn test_error_display() {
        let err = LouderError::config("missing version");
        assert_eq!(err.to_string(), "Configuration error: missing version");
    }
}
