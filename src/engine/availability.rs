use chrono::{DateTime, Datelike, Duration, Utc};

use crate::limits::*;
use crate::model::*;

use super::EngineError;

// ── Weekly pattern validation ─────────────────────────────────────

/// Validate a weekly pattern against the interviewer's slot duration and
/// return it normalized (sorted by day, then start time).
///
/// Rules: `startTime < endTime`, each window an integer multiple of the slot
/// duration, and no two windows on the same day may overlap (touching is
/// fine).
pub fn validate_entries(
    entries: &[WeeklyAvailability],
    slot_duration_minutes: u32,
) -> Result<Vec<WeeklyAvailability>, EngineError> {
    if entries.len() > MAX_AVAILABILITY_ENTRIES {
        return Err(EngineError::LimitExceeded("too many availability entries"));
    }

    for e in entries {
        if e.start_time >= e.end_time {
            return Err(EngineError::Validation(format!(
                "availability window {} must start before it ends ({} >= {})",
                day_name(e.day_of_week),
                e.start_time,
                e.end_time
            )));
        }
        let window = (e.end_time.minutes() - e.start_time.minutes()) as u32;
        if window % slot_duration_minutes != 0 {
            return Err(EngineError::Validation(format!(
                "availability window {} {}–{} is not a multiple of {slot_duration_minutes} minutes",
                day_name(e.day_of_week),
                e.start_time,
                e.end_time
            )));
        }
    }

    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|e| (e.day_of_week.offset_from_monday(), e.start_time));

    for pair in sorted.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.day_of_week == b.day_of_week && b.start_time < a.end_time {
            return Err(EngineError::Validation(format!(
                "overlapping availability on {}: {}–{} and {}–{}",
                day_name(a.day_of_week),
                a.start_time,
                a.end_time,
                b.start_time,
                b.end_time
            )));
        }
    }

    Ok(sorted)
}

pub fn validate_slot_duration(minutes: u32) -> Result<(), EngineError> {
    if !ALLOWED_SLOT_DURATIONS.contains(&minutes) {
        return Err(EngineError::Validation(format!(
            "slot duration must be one of {ALLOWED_SLOT_DURATIONS:?} minutes, got {minutes}"
        )));
    }
    Ok(())
}

fn day_name(day: DayOfWeek) -> &'static str {
    match day {
        DayOfWeek::Monday => "Monday",
        DayOfWeek::Tuesday => "Tuesday",
        DayOfWeek::Wednesday => "Wednesday",
        DayOfWeek::Thursday => "Thursday",
        DayOfWeek::Friday => "Friday",
        DayOfWeek::Saturday => "Saturday",
        DayOfWeek::Sunday => "Sunday",
    }
}

// ── Slot expansion ────────────────────────────────────────────────

/// Monday 00:00 UTC of `now`'s ISO week. Week offsets in a generate call are
/// relative to this boundary.
pub fn week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let date = now.date_naive();
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    monday
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
}

/// Expand a weekly pattern into concrete `[start, end)` slot intervals for
/// `weeks` calendar weeks starting at `now`'s week boundary.
///
/// Pure function of its arguments — the clock is injected, never read. Each
/// window is partitioned into consecutive intervals of the slot duration; a
/// trailing remainder shorter than one duration is dropped. Output is ordered
/// by start time within each week.
pub fn expand_weekly(
    entries: &[WeeklyAvailability],
    slot_duration_minutes: u32,
    weeks: u32,
    now: DateTime<Utc>,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let base = week_start(now);
    let step = Duration::minutes(slot_duration_minutes as i64);
    let mut out = Vec::new();

    for w in 0..weeks {
        let monday = base + Duration::weeks(w as i64);
        for entry in entries {
            let day = monday + Duration::days(entry.day_of_week.offset_from_monday());
            let mut cursor = day + Duration::minutes(entry.start_time.minutes() as i64);
            let window_end = day + Duration::minutes(entry.end_time.minutes() as i64);
            while cursor + step <= window_end {
                out.push((cursor, cursor + step));
                cursor += step;
            }
        }
    }

    out
}
