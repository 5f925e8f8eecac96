//! Sunrise countdown monitor
//!
//! Watches a date-less sunrise time and a configured window length to decide
//! whether the time-sensitive countdown board must preempt normal rotation.
//! The monitor is recomputed from its inputs on every 1-second tick and emits
//! a distinguished edge on each activation transition so the rotation
//! controller can react with a named handler instead of polling flags.
//!
//! Missing or malformed inputs keep the monitor inactive; it never errors.

use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheSnapshot;
use crate::config::CountdownSettings;
use crate::schedule::{in_shabbat_window, parse_clock};

// ============================================================================
// State
// ============================================================================

/// Time left until sunrise, whole minutes and seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Remaining {
    pub minutes: u32,
    pub seconds: u32,
}

/// The countdown's derived state; recomputed every tick, never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountdownState {
    /// True while sunrise is inside the configured window
    pub active: bool,

    /// Remaining time while active
    pub remaining: Option<Remaining>,
}

impl CountdownState {
    pub fn inactive() -> Self {
        Self {
            active: false,
            remaining: None,
        }
    }
}

/// An activation transition observed between two ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEdge {
    /// The countdown window was entered; rotation must jump to the interrupt board
    Entered,
    /// Sunrise reached or window exited; rotation must force-reset to index 0
    Exited,
}

// ============================================================================
// Monitor
// ============================================================================

/// Watches sunrise and reports window activation edges
pub struct CountdownMonitor {
    sunrise: Option<NaiveTime>,
    weekday_window_minutes: u32,
    shabbat_window_minutes: u32,
    was_active: bool,
}

impl CountdownMonitor {
    pub fn new(settings: &CountdownSettings) -> Self {
        Self {
            sunrise: None,
            weekday_window_minutes: settings.weekday_window_minutes,
            shabbat_window_minutes: settings.shabbat_window_minutes,
            was_active: false,
        }
    }

    /// Update the sunrise input; malformed values clear it
    pub fn set_sunrise(&mut self, raw: Option<&str>) {
        self.sunrise = raw.and_then(parse_clock);
    }

    /// Recompute state for the given instant and report any activation edge
    pub fn tick(&mut self, now: NaiveDateTime) -> (CountdownState, Option<CountdownEdge>) {
        let state = self.compute(now);
        let edge = match (self.was_active, state.active) {
            (false, true) => Some(CountdownEdge::Entered),
            (true, false) => Some(CountdownEdge::Exited),
            _ => None,
        };
        self.was_active = state.active;
        (state, edge)
    }

    fn compute(&self, now: NaiveDateTime) -> CountdownState {
        let Some(sunrise) = self.sunrise else {
            return CountdownState::inactive();
        };

        // The source time is date-less: roll an already-passed sunrise to tomorrow
        let mut target = now.date().and_time(sunrise);
        if target <= now {
            target += chrono::Duration::days(1);
        }

        let remaining_secs = (target - now).num_seconds();
        let window_secs = i64::from(self.window_minutes(now)) * 60;

        if remaining_secs <= 0 || remaining_secs > window_secs {
            return CountdownState::inactive();
        }

        CountdownState {
            active: true,
            remaining: Some(Remaining {
                minutes: (remaining_secs / 60) as u32,
                seconds: (remaining_secs % 60) as u32,
            }),
        }
    }

    fn window_minutes(&self, now: NaiveDateTime) -> u32 {
        if in_shabbat_window(now) {
            self.shabbat_window_minutes
        } else {
            self.weekday_window_minutes
        }
    }
}

/// Pull the sunrise time-of-day string out of a cache snapshot
///
/// The first record of the `times` collection carries it under `sunrise`
/// (`netz` as a fallback). The value itself stays an opaque string.
pub fn extract_sunrise(snapshot: &CacheSnapshot) -> Option<String> {
    let record = snapshot.records("times").first()?;
    field_str(record, "sunrise").or_else(|| field_str(record, "netz"))
}

fn field_str(record: &Value, key: &str) -> Option<String> {
    record.get(key).and_then(Value::as_str).map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn monitor(weekday: u32, shabbat: u32) -> CountdownMonitor {
        CountdownMonitor::new(&CountdownSettings {
            weekday_window_minutes: weekday,
            shabbat_window_minutes: shabbat,
        })
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        // A Wednesday
        NaiveDate::from_ymd_opt(2026, 8, 26)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_active_inside_window_with_remaining() {
        let mut monitor = monitor(40, 90);
        monitor.set_sunrise(Some("06:00"));

        let (state, edge) = monitor.tick(at(5, 25, 0));
        assert!(state.active);
        assert_eq!(edge, Some(CountdownEdge::Entered));
        assert_eq!(
            state.remaining,
            Some(Remaining {
                minutes: 35,
                seconds: 0
            })
        );
    }

    #[test]
    fn test_inactive_outside_window() {
        let mut monitor = monitor(40, 90);
        monitor.set_sunrise(Some("06:00"));

        // 41 minutes out: not yet
        let (state, edge) = monitor.tick(at(5, 19, 0));
        assert!(!state.active);
        assert!(edge.is_none());
    }

    #[test]
    fn test_exit_edge_after_sunrise() {
        let mut monitor = monitor(40, 90);
        monitor.set_sunrise(Some("06:00"));

        let (state, _) = monitor.tick(at(5, 59, 59));
        assert!(state.active);

        // One second past sunrise: the target rolls to tomorrow, state drops
        let (state, edge) = monitor.tick(at(6, 0, 1));
        assert!(!state.active);
        assert!(state.remaining.is_none());
        assert_eq!(edge, Some(CountdownEdge::Exited));
    }

    #[test]
    fn test_edges_fire_exactly_once() {
        let mut monitor = monitor(40, 90);
        monitor.set_sunrise(Some("06:00"));

        let (_, first) = monitor.tick(at(5, 30, 0));
        let (_, second) = monitor.tick(at(5, 30, 1));
        assert_eq!(first, Some(CountdownEdge::Entered));
        assert!(second.is_none());
    }

    #[test]
    fn test_missing_and_malformed_inputs_stay_inactive() {
        let mut monitor = monitor(40, 90);

        let (state, edge) = monitor.tick(at(5, 30, 0));
        assert!(!state.active);
        assert!(edge.is_none());

        monitor.set_sunrise(Some("not a time"));
        let (state, _) = monitor.tick(at(5, 30, 0));
        assert!(!state.active);
    }

    #[test]
    fn test_clearing_sunrise_while_active_emits_exit() {
        let mut monitor = monitor(40, 90);
        monitor.set_sunrise(Some("06:00"));
        monitor.tick(at(5, 30, 0));

        monitor.set_sunrise(None);
        let (state, edge) = monitor.tick(at(5, 30, 1));
        assert!(!state.active);
        assert_eq!(edge, Some(CountdownEdge::Exited));
    }

    #[test]
    fn test_shabbat_window_length_applies() {
        let mut monitor = monitor(40, 90);
        monitor.set_sunrise(Some("06:00"));

        // Saturday 04:45, 75 minutes before sunrise: inside the 90-minute
        // Shabbat window, outside the 40-minute weekday one
        let saturday = NaiveDate::from_ymd_opt(2026, 8, 29)
            .unwrap()
            .and_hms_opt(4, 45, 0)
            .unwrap();
        let (state, _) = monitor.tick(saturday);
        assert!(state.active);
    }

    #[test]
    fn test_extract_sunrise_with_fallback_key() {
        let mut collections = BTreeMap::new();
        collections.insert("times".to_string(), vec![json!({"netz": "05:48"})]);
        let snapshot = CacheSnapshot {
            collections,
            last_load: chrono::Utc::now(),
        };

        assert_eq!(extract_sunrise(&snapshot).as_deref(), Some("05:48"));
    }

    #[test]
    fn test_extract_sunrise_missing_collection() {
        let snapshot = CacheSnapshot {
            collections: BTreeMap::new(),
            last_load: chrono::Utc::now(),
        };
        assert!(extract_sunrise(&snapshot).is_none());
    }
}
