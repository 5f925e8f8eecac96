//! Core data structures shared across the rotation engine
//!
//! Boards, playlists and snapshots all meet here: a [`BoardKind`] names one of
//! the full-screen views the display can show, a [`DayType`] scopes a playlist
//! entry to weekdays or Shabbat, and a [`BoardInstance`] is the ephemeral,
//! fully-resolved board the rotation controller actually cycles through.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Board Kind
// ============================================================================

/// The full-screen views the display knows how to render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoardKind {
    /// Daily prayer times
    PrayerTimes,
    /// Halachic times of day
    Halacha,
    /// Community announcements
    Announcements,
    /// Memorial (yahrzeit) board
    Memorials,
    /// Smachot and community events
    Events,
    /// Sunrise countdown interrupt board
    Countdown,
}

impl BoardKind {
    /// All kinds an admin can schedule (the countdown board is injected, never scheduled)
    pub fn schedulable() -> Vec<Self> {
        vec![
            Self::PrayerTimes,
            Self::Halacha,
            Self::Announcements,
            Self::Memorials,
            Self::Events,
        ]
    }

    /// Stable string ID
    pub fn id(&self) -> &'static str {
        match self {
            Self::PrayerTimes => "prayer-times",
            Self::Halacha => "halacha",
            Self::Announcements => "announcements",
            Self::Memorials => "memorials",
            Self::Events => "events",
            Self::Countdown => "countdown",
        }
    }

    /// Cache collection this board draws its props from
    pub fn collection(&self) -> Option<&'static str> {
        match self {
            Self::PrayerTimes => Some("times"),
            Self::Halacha => Some("halacha"),
            Self::Announcements => Some("announcements"),
            Self::Memorials => Some("memorials"),
            Self::Events => Some("events"),
            Self::Countdown => None,
        }
    }
}

impl fmt::Display for BoardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

// ============================================================================
// Day Type
// ============================================================================

/// When a playlist entry is eligible to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayType {
    /// Visible regardless of day
    #[default]
    Always,
    /// Visible outside the Shabbat handover window
    Weekday,
    /// Visible only inside the Shabbat handover window
    Shabbat,
}

impl DayType {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Weekday => "weekday",
            Self::Shabbat => "shabbat",
        }
    }
}

impl fmt::Display for DayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

// ============================================================================
// Board Design
// ============================================================================

/// Per-board background design settings, edited by the admin alongside the playlist
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardDesign {
    /// Background image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Opacity of the background layer itself (0.0 - 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_opacity: Option<f32>,

    /// Overlay tint color (CSS hex)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_color: Option<String>,

    /// Overlay tint opacity (0.0 - 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_opacity: Option<f32>,
}

// ============================================================================
// Board Instance
// ============================================================================

/// A fully-resolved board in the current rotation
///
/// Produced fresh by the schedule evaluator on every recomputation and never
/// mutated in place. `props` carries the matching slice of the current cache
/// snapshot so the renderer needs no fetches of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardInstance {
    /// Which renderer this board targets
    pub kind: BoardKind,

    /// Display name from the playlist entry
    pub name: String,

    /// How long this board stays on screen
    pub duration: Duration,

    /// Stable key identifying the slide (playlist entry key)
    pub slide_key: String,

    /// The snapshot slice feeding this board (JSON array, or null)
    pub props: Value,

    /// Per-board background design, if configured
    pub design: Option<BoardDesign>,
}

impl BoardInstance {
    /// The injected sunrise-countdown interrupt board
    ///
    /// Its nominal duration is zero: on-screen time is governed by the
    /// countdown monitor, not a fixed timer.
    pub fn countdown_interrupt() -> Self {
        Self {
            kind: BoardKind::Countdown,
            name: String::from("Sunrise Countdown"),
            duration: Duration::ZERO,
            slide_key: String::from("countdown"),
            props: Value::Null,
            design: None,
        }
    }

    pub fn is_countdown(&self) -> bool {
        self.kind == BoardKind::Countdown
    }
}
