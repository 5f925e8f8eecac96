//! Playlist entries and persistence
//!
//! The playlist is an admin-edited JSON document in the durable store. When
//! it is absent, empty, or unreadable, the display falls back to a fixed
//! three-entry default playlist so an unattended screen never goes dark over
//! a configuration mishap.

use serde::{Deserialize, Serialize};

use super::error::{ScheduleError, ScheduleResult};
use crate::cache::KvStore;
use crate::models::{BoardDesign, BoardKind, DayType};

/// Durable-store key the playlist is persisted under
pub const PLAYLIST_KEY: &str = "playlist";

// ============================================================================
// Schedule Entry
// ============================================================================

/// One admin-configured slot in the rotation playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Stable key, also used as the slide key
    pub key: String,

    /// Display name
    pub name: String,

    /// Which board renderer this entry shows
    pub kind: BoardKind,

    /// Day-type scoping (always / weekday / shabbat)
    #[serde(default)]
    pub day_type: DayType,

    /// On-screen duration in seconds; strictly positive
    pub duration_seconds: u32,

    /// Display sequence; ties keep original ordering
    pub order: i32,

    /// Inactive entries are skipped entirely
    pub active: bool,

    /// Optional time-of-day window start ("HH:MM", hour and minute only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,

    /// Optional time-of-day window end (exclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,

    /// Optional per-board background design
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design: Option<BoardDesign>,
}

impl ScheduleEntry {
    /// Convenience constructor for an always-on entry with no window
    pub fn new(key: impl Into<String>, kind: BoardKind, duration_seconds: u32, order: i32) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            kind,
            day_type: DayType::Always,
            duration_seconds,
            order,
            active: true,
            start_time: None,
            end_time: None,
            design: None,
        }
    }
}

// ============================================================================
// Default playlist
// ============================================================================

/// The fixed fallback playlist used when no persisted playlist exists
pub fn default_playlist() -> Vec<ScheduleEntry> {
    vec![
        ScheduleEntry {
            key: String::from("general-times"),
            name: String::from("Prayer Times"),
            kind: BoardKind::PrayerTimes,
            day_type: DayType::Always,
            duration_seconds: 45,
            order: 1,
            active: true,
            start_time: None,
            end_time: None,
            design: None,
        },
        ScheduleEntry {
            key: String::from("general-halacha"),
            name: String::from("Halachic Times"),
            kind: BoardKind::Halacha,
            day_type: DayType::Always,
            duration_seconds: 30,
            order: 2,
            active: true,
            start_time: None,
            end_time: None,
            design: None,
        },
        ScheduleEntry {
            key: String::from("general-announcements"),
            name: String::from("Announcements"),
            kind: BoardKind::Announcements,
            day_type: DayType::Always,
            duration_seconds: 30,
            order: 3,
            active: true,
            start_time: None,
            end_time: None,
            design: None,
        },
    ]
}

// ============================================================================
// Persistence
// ============================================================================

/// Parse a persisted playlist document
pub fn parse_playlist(raw: &str) -> ScheduleResult<Vec<ScheduleEntry>> {
    let entries: Vec<ScheduleEntry> = serde_json::from_str(raw)?;

    for entry in &entries {
        if entry.duration_seconds == 0 {
            return Err(ScheduleError::invalid_playlist(format!(
                "entry '{}' has zero duration",
                entry.key
            )));
        }
    }

    Ok(entries)
}

/// Serialize a playlist for the durable store
pub fn serialize_playlist(entries: &[ScheduleEntry]) -> ScheduleResult<String> {
    serde_json::to_string_pretty(entries).map_err(Into::into)
}

/// Load the playlist from the durable store, falling back to the defaults
///
/// Storage failures and malformed documents are logged, never surfaced; the
/// display must keep rotating something.
pub async fn load_playlist(store: &dyn KvStore) -> Vec<ScheduleEntry> {
    let raw = match store.get(PLAYLIST_KEY).await {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            tracing::info!("no persisted playlist, using defaults");
            return default_playlist();
        }
        Err(e) => {
            tracing::warn!(error = %e, "playlist store unavailable, using defaults");
            return default_playlist();
        }
    };

    match parse_playlist(&raw) {
        Ok(entries) if entries.is_empty() => {
            tracing::info!("persisted playlist is empty, using defaults");
            default_playlist()
        }
        Ok(entries) => {
            tracing::info!(entries = entries.len(), "loaded persisted playlist");
            entries
        }
        Err(e) => {
            tracing::warn!(error = %e, "persisted playlist invalid, using defaults");
            default_playlist()
        }
    }
}
