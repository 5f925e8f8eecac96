//! Pure playlist evaluation
//!
//! [`evaluate_schedule`] maps the playlist, the current time and the cache
//! snapshot to the ordered list of boards that should be rotating right now.
//! It is a pure function with no side effects beyond warn logs, linear in the
//! entry count, and safe to re-run on every tick.

use std::time::Duration;

use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde_json::Value;

use super::entry::ScheduleEntry;
use super::error::ScheduleError;
use crate::cache::CacheSnapshot;
use crate::models::{BoardInstance, DayType};

/// Hour on Friday from which Shabbat-typed entries take over.
///
/// Fixed cutoffs carried over from the original playlist logic; they are not
/// derived from actual sunset times.
pub const HANDOVER_ENTRY_HOUR: u32 = 15;

/// Hour on Saturday from which weekday-typed entries resume
pub const HANDOVER_EXIT_HOUR: u32 = 20;

/// True inside the Friday-afternoon-through-Saturday-evening handover window
pub fn in_shabbat_window(now: NaiveDateTime) -> bool {
    match now.weekday() {
        Weekday::Fri => now.hour() >= HANDOVER_ENTRY_HOUR,
        Weekday::Sat => now.hour() < HANDOVER_EXIT_HOUR,
        _ => false,
    }
}

/// Compute the ordered board list for the current instant
///
/// Steps: stable sort by `order`, drop inactive entries, drop entries outside
/// their optional time-of-day window, apply weekday/Shabbat mutual exclusion,
/// attach the matching snapshot slice as props, and append the countdown
/// interrupt board when the monitor reports active.
pub fn evaluate_schedule(
    entries: &[ScheduleEntry],
    now: NaiveDateTime,
    snapshot: &CacheSnapshot,
    countdown_active: bool,
) -> Vec<BoardInstance> {
    let mut sorted: Vec<&ScheduleEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.order);

    let shabbat = in_shabbat_window(now);
    let time = now.time();

    let mut boards: Vec<BoardInstance> = sorted
        .into_iter()
        .filter(|e| e.active)
        .filter(|e| in_time_window(e, time))
        .filter(|e| match e.day_type {
            DayType::Always => true,
            DayType::Weekday => !shabbat,
            DayType::Shabbat => shabbat,
        })
        .map(|e| to_instance(e, snapshot))
        .collect();

    if countdown_active {
        boards.push(BoardInstance::countdown_interrupt());
    }

    boards
}

fn to_instance(entry: &ScheduleEntry, snapshot: &CacheSnapshot) -> BoardInstance {
    let props = entry
        .kind
        .collection()
        .map(|name| Value::Array(snapshot.records(name).to_vec()))
        .unwrap_or(Value::Null);

    BoardInstance {
        kind: entry.kind,
        name: entry.name.clone(),
        duration: Duration::from_secs(u64::from(entry.duration_seconds)),
        slide_key: entry.key.clone(),
        props,
        design: entry.design.clone(),
    }
}

/// Check the optional `[start, end)` window, hour-and-minute only
///
/// An unparsable bound is a misconfiguration, not a crash: the entry is
/// treated as always-visible and the problem is logged.
fn in_time_window(entry: &ScheduleEntry, time: NaiveTime) -> bool {
    let start = match parse_bound(entry, "start_time", entry.start_time.as_deref()) {
        Ok(b) => b,
        Err(_) => return true,
    };
    let end = match parse_bound(entry, "end_time", entry.end_time.as_deref()) {
        Ok(b) => b,
        Err(_) => return true,
    };

    let now = minute_of_day(time);
    match (start, end) {
        (None, None) => true,
        (Some(s), None) => now >= s,
        (None, Some(e)) => now < e,
        // Overnight windows wrap across midnight
        (Some(s), Some(e)) if s > e => now >= s || now < e,
        (Some(s), Some(e)) => now >= s && now < e,
    }
}

fn parse_bound(
    entry: &ScheduleEntry,
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<u32>, ScheduleError> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    match parse_clock(raw) {
        Some(t) => Ok(Some(minute_of_day(t))),
        None => {
            let err = ScheduleError::invalid_window(&entry.key, field, raw);
            tracing::warn!(error = %err, "ignoring time window on entry");
            Err(err)
        }
    }
}

fn minute_of_day(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Parse a date-less clock string; seconds are accepted and ignored
pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoardKind;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    // 2026-08-26 is a Wednesday; 2026-08-28 a Friday; 2026-08-29 a Saturday
    fn wednesday_noon() -> NaiveDateTime {
        at(2026, 8, 26, 12, 0)
    }

    fn empty_snapshot() -> CacheSnapshot {
        CacheSnapshot {
            collections: BTreeMap::new(),
            last_load: chrono::Utc::now(),
        }
    }

    fn entry(key: &str, order: i32) -> ScheduleEntry {
        ScheduleEntry::new(key, BoardKind::Announcements, 30, order)
    }

    #[test]
    fn test_output_sorted_by_order_stable() {
        let entries = vec![
            entry("c", 2),
            entry("a", 1),
            entry("b", 2),
            entry("d", 1),
        ];

        let boards = evaluate_schedule(&entries, wednesday_noon(), &empty_snapshot(), false);
        let keys: Vec<_> = boards.iter().map(|b| b.slide_key.as_str()).collect();
        // Non-decreasing in order; ties keep original ordering
        assert_eq!(keys, vec!["a", "d", "c", "b"]);
    }

    #[test]
    fn test_inactive_entries_dropped() {
        let mut entries = vec![entry("a", 1), entry("b", 2)];
        entries[1].active = false;

        let boards = evaluate_schedule(&entries, wednesday_noon(), &empty_snapshot(), false);
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].slide_key, "a");
    }

    #[test]
    fn test_shabbat_window_bounds() {
        assert!(!in_shabbat_window(at(2026, 8, 28, 14, 59))); // Friday before handover
        assert!(in_shabbat_window(at(2026, 8, 28, 15, 0))); // Friday at handover
        assert!(in_shabbat_window(at(2026, 8, 29, 19, 59))); // Saturday evening
        assert!(!in_shabbat_window(at(2026, 8, 29, 20, 0))); // Saturday after exit
        assert!(!in_shabbat_window(wednesday_noon()));
    }

    #[test]
    fn test_day_type_mutual_exclusion() {
        let mut weekday = entry("weekday-announcements", 1);
        weekday.day_type = DayType::Weekday;
        let mut shabbat = entry("shabbat-announcements", 2);
        shabbat.day_type = DayType::Shabbat;
        let entries = vec![weekday, shabbat];

        // Inside the handover window: only the Shabbat entry
        let inside = evaluate_schedule(&entries, at(2026, 8, 28, 18, 0), &empty_snapshot(), false);
        assert_eq!(inside.len(), 1);
        assert_eq!(inside[0].slide_key, "shabbat-announcements");

        // Outside: only the weekday entry
        let outside = evaluate_schedule(&entries, wednesday_noon(), &empty_snapshot(), false);
        assert_eq!(outside.len(), 1);
        assert_eq!(outside[0].slide_key, "weekday-announcements");
    }

    #[test]
    fn test_time_window_half_open() {
        let mut e = entry("morning", 1);
        e.start_time = Some("08:00".into());
        e.end_time = Some("12:00".into());
        let entries = vec![e];

        let in_window = evaluate_schedule(&entries, at(2026, 8, 26, 8, 0), &empty_snapshot(), false);
        assert_eq!(in_window.len(), 1);

        // End bound is exclusive
        let at_end = evaluate_schedule(&entries, wednesday_noon(), &empty_snapshot(), false);
        assert!(at_end.is_empty());
    }

    #[test]
    fn test_overnight_window_wraps() {
        let mut e = entry("night", 1);
        e.start_time = Some("22:00".into());
        e.end_time = Some("06:00".into());
        let entries = vec![e];

        assert_eq!(
            evaluate_schedule(&entries, at(2026, 8, 26, 23, 30), &empty_snapshot(), false).len(),
            1
        );
        assert_eq!(
            evaluate_schedule(&entries, at(2026, 8, 26, 5, 0), &empty_snapshot(), false).len(),
            1
        );
        assert!(evaluate_schedule(&entries, wednesday_noon(), &empty_snapshot(), false).is_empty());
    }

    #[test]
    fn test_unparsable_window_is_always_visible() {
        let mut e = entry("broken", 1);
        e.start_time = Some("25:99".into());
        let entries = vec![e];

        let boards = evaluate_schedule(&entries, wednesday_noon(), &empty_snapshot(), false);
        assert_eq!(boards.len(), 1);
    }

    #[test]
    fn test_props_are_the_matching_collection_slice() {
        let mut collections = BTreeMap::new();
        collections.insert(
            "memorials".to_string(),
            vec![json!({"name": "Levi"}), json!({"name": "Sara"})],
        );
        let snapshot = CacheSnapshot {
            collections,
            last_load: chrono::Utc::now(),
        };

        let entries = vec![ScheduleEntry::new("memorials", BoardKind::Memorials, 30, 1)];
        let boards = evaluate_schedule(&entries, wednesday_noon(), &snapshot, false);

        assert_eq!(boards[0].props, json!([{"name": "Levi"}, {"name": "Sara"}]));
    }

    #[test]
    fn test_countdown_appended_last_regardless_of_order() {
        let entries = vec![entry("a", 5), entry("b", 1)];

        let boards = evaluate_schedule(&entries, wednesday_noon(), &empty_snapshot(), true);
        assert_eq!(boards.len(), 3);
        assert!(boards.last().unwrap().is_countdown());
    }

    #[test]
    fn test_empty_playlist_yields_empty_list() {
        let boards = evaluate_schedule(&[], wednesday_noon(), &empty_snapshot(), false);
        assert!(boards.is_empty());
    }

    #[test]
    fn test_parse_clock_formats() {
        assert_eq!(
            parse_clock("06:00"),
            NaiveTime::from_hms_opt(6, 0, 0)
        );
        assert_eq!(
            parse_clock(" 6:05 "),
            NaiveTime::from_hms_opt(6, 5, 0)
        );
        assert_eq!(
            parse_clock("18:30:15"),
            NaiveTime::from_hms_opt(18, 30, 15)
        );
        assert_eq!(parse_clock("sunrise"), None);
        assert_eq!(parse_clock(""), None);
    }
}
