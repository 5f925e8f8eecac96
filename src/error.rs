//! Unified error handling for the luach crate
//!
//! Domain modules define their own focused error types; this module wraps
//! them into a single [`Error`] enum for use across module boundaries and at
//! the binary surface. The display itself treats almost everything as
//! recoverable: a kiosk that exits on a fetch error is worse than one showing
//! stale data.

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::background::ImageLoadError;
pub use crate::cache::{FetchError, PersistenceError};
pub use crate::schedule::ScheduleError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (backend fetches, image loads)
    Network,
    /// Durable-store and I/O errors
    Storage,
    /// Playlist and schedule misconfiguration
    Schedule,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the luach crate
#[derive(Error, Debug)]
pub enum Error {
    /// Backend collection fetch errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Durable key-value store errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Playlist and schedule errors
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Background image load errors
    #[error("Image error: {0}")]
    Image(#[from] ImageLoadError),

    /// I/O errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Check if this error is recoverable (retrying or degrading makes sense)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(_) | Self::Image(_) => true,
            // The in-memory cache keeps working when the durable store fails
            Self::Persistence(_) => true,
            // A bad playlist degrades to the defaults
            Self::Schedule(_) => true,
            Self::Io(_) | Self::Json(_) => false,
            Self::Config(_) => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(_) | Self::Image(_) => ErrorCategory::Network,
            Self::Persistence(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Schedule(_) => ErrorCategory::Schedule,
            Self::Config(_) => ErrorCategory::Config,
            Self::Json(_) => ErrorCategory::Other,
        }
    }
}

/// Result type alias using the unified error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_errors_are_recoverable_network() {
        let err: Error = FetchError::Status {
            collection: "times".into(),
            status: 503,
        }
        .into();

        assert!(err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::Network);
    }

    #[test]
    fn test_config_errors_are_fatal() {
        let err = Error::Config("backend.base_url must not be empty".into());
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_schedule_errors_degrade() {
        let err: Error = ScheduleError::invalid_playlist("entry 'x' has zero duration").into();
        assert!(err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::Schedule);
    }
}
