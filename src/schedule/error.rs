//! Error types for the schedule module

use thiserror::Error;

/// Result type for schedule operations
pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Schedule-specific errors
///
/// Misconfiguration never stops rotation: a bad playlist falls back to the
/// defaults and a bad time window degrades to always-visible. These errors
/// exist so the degradation gets logged with a reason.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Persisted playlist could not be parsed
    #[error("invalid playlist JSON: {reason}")]
    InvalidPlaylist { reason: String },

    /// A time-of-day window on an entry could not be parsed
    #[error("entry '{key}' has unparsable {field} '{value}'")]
    InvalidTimeWindow {
        key: String,
        field: &'static str,
        value: String,
    },
}

impl ScheduleError {
    pub fn invalid_playlist(reason: impl Into<String>) -> Self {
        Self::InvalidPlaylist {
            reason: reason.into(),
        }
    }

    pub fn invalid_window(
        key: impl Into<String>,
        field: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidTimeWindow {
            key: key.into(),
            field,
            value: value.into(),
        }
    }
}

impl From<serde_json::Error> for ScheduleError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_playlist(err.to_string())
    }
}
