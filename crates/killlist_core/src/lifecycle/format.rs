//! Display formatting for countdowns and deadlines.
//!
//! Output is locale-fixed: English month abbreviations, 24-hour clock.

use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const INVALID_DATE: &str = "Invalid Date";

/// Formats a duration as `HH:MM:SS`, clamped at zero.
///
/// Hours are not wrapped, so durations past 99 hours widen the first field.
pub fn format_countdown(ms: i64) -> String {
    if ms <= 0 {
        return "00:00:00".to_string();
    }
    let total_seconds = ms / MS_PER_SECOND;
    let hours = total_seconds / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Formats a deadline relative to `now` by calendar day in `tz`.
///
/// - same day: `Today 14:05`
/// - next day: `Tomorrow 09:30`
/// - otherwise: `Jan 5, 09:30`
pub fn format_deadline<Tz>(deadline_ms: i64, now_ms: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let Some(deadline) = DateTime::from_timestamp_millis(deadline_ms) else {
        return INVALID_DATE.to_string();
    };
    let deadline = deadline.with_timezone(tz);
    let time = deadline.format("%H:%M");

    if let Some(now) = DateTime::from_timestamp_millis(now_ms) {
        let today = now.with_timezone(tz).date_naive();
        let day = deadline.date_naive();
        if day == today {
            return format!("Today {time}");
        }
        if today.succ_opt() == Some(day) {
            return format!("Tomorrow {time}");
        }
    }

    deadline.format("%b %-d, %H:%M").to_string()
}

/// [`format_deadline`] in the system time zone.
pub fn format_deadline_local(deadline_ms: i64, now_ms: i64) -> String {
    format_deadline(deadline_ms, now_ms, &Local)
}

/// Coarse time-to-deadline label: `3d 4h`, `5h 12m`, `42m`, or `OVERDUE`.
pub fn format_time_until_deadline(deadline_ms: i64, now_ms: i64) -> String {
    let diff = deadline_ms.saturating_sub(now_ms);
    if diff <= 0 {
        return "OVERDUE".to_string();
    }

    let hours = diff / MS_PER_HOUR;
    let minutes = (diff % MS_PER_HOUR) / MS_PER_MINUTE;

    if hours > 24 {
        format!("{}d {}h", hours / 24, hours % 24)
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
