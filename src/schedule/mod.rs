//! Playlist schedule evaluation
//!
//! The playlist is the admin-configured, ordered list of boards; this module
//! decides which of them are eligible right now. Evaluation is a pure
//! function so the engine can re-run it every tick without bookkeeping.
//!
//! # Modules
//!
//! - [`entry`] - Playlist entries, defaults, durable-store persistence
//! - [`evaluator`] - Pure evaluation: ordering, windows, day-type exclusion
//! - [`error`] - Schedule misconfiguration errors

pub mod entry;
pub mod error;
pub mod evaluator;

pub use entry::{
    default_playlist, load_playlist, parse_playlist, serialize_playlist, ScheduleEntry,
    PLAYLIST_KEY,
};
pub use error::{ScheduleError, ScheduleResult};
pub use evaluator::{
    evaluate_schedule, in_shabbat_window, parse_clock, HANDOVER_ENTRY_HOUR, HANDOVER_EXIT_HOUR,
};
