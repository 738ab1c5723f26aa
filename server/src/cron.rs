//! Deterministic, side-effect-free cron evaluation against an IANA timezone.
//! Kept separate from the dispatcher so its DST and ordering behavior can be
//! unit tested without a database or clock mock.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

#[derive(Debug)]
pub enum CronError {
    InvalidCron(String),
    UnknownTimezone(String),
}

impl std::fmt::Display for CronError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CronError::InvalidCron(e) => write!(f, "invalid cron expression: {e}"),
            CronError::UnknownTimezone(e) => write!(f, "unknown timezone: {e}"),
        }
    }
}

impl std::error::Error for CronError {}

/// The `cron` crate expects a leading seconds field; the domain's cron
/// expressions are the standard 5-field form (`min hour dom month dow`), so
/// a `"0 "` seconds field is prepended before parsing.
fn parse_schedule(expr: &str) -> Result<Schedule, CronError> {
    let field_count = expr.split_whitespace().count();
    let normalized = if field_count == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| CronError::InvalidCron(e.to_string()))
}

fn parse_timezone(tz_name: &str) -> Result<Tz, CronError> {
    tz_name
        .parse::<Tz>()
        .map_err(|_| CronError::UnknownTimezone(tz_name.to_string()))
}

/// Returns the next instant strictly greater than `from` at which `expr`
/// fires, interpreted in `tz_name`. DST handling is delegated to `chrono`'s
/// `TimeZone` conversions underneath the `cron` crate's iterator: a local
/// instant skipped by a spring-forward is never produced by the iterator,
/// so the next candidate it yields is already the first valid subsequent
/// instant; an ambiguous (fall-back) instant resolves to its earlier
/// occurrence, matching `chrono`'s default disambiguation.
pub fn next_fire(expr: &str, tz_name: &str, from: DateTime<Utc>) -> Result<DateTime<Utc>, CronError> {
    let schedule = parse_schedule(expr)?;
    let tz = parse_timezone(tz_name)?;
    let from_in_tz = from.with_timezone(&tz);

    schedule
        .after(&from_in_tz)
        .next()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| CronError::InvalidCron(format!("no upcoming firing for `{expr}`")))
}

/// Enumerates the next `n` firings for a calendar preview.
pub fn next_n(
    expr: &str,
    tz_name: &str,
    from: DateTime<Utc>,
    n: usize,
) -> Result<Vec<DateTime<Utc>>, CronError> {
    let schedule = parse_schedule(expr)?;
    let tz = parse_timezone(tz_name)?;
    let from_in_tz = from.with_timezone(&tz);

    Ok(schedule
        .after(&from_in_tz)
        .take(n)
        .map(|dt| dt.with_timezone(&Utc))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn weekly_monday_nine_am_berlin() {
        let from = Utc.with_ymd_and_hms(2025, 1, 6, 7, 59, 0).unwrap();
        let next = next_fire("0 9 * * MON", "Europe/Berlin", from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap());
    }

    #[test]
    fn strictly_after_from() {
        let from = Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap();
        let next = next_fire("0 9 * * MON", "Europe/Berlin", from).unwrap();
        assert!(next > from);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 13, 8, 0, 0).unwrap());
    }

    #[test]
    fn invalid_cron_expression() {
        let from = Utc::now();
        let err = next_fire("not a cron", "UTC", from).unwrap_err();
        assert!(matches!(err, CronError::InvalidCron(_)));
    }

    #[test]
    fn unknown_timezone() {
        let from = Utc::now();
        let err = next_fire("0 9 * * MON", "Nowhere/Imaginary", from).unwrap_err();
        assert!(matches!(err, CronError::UnknownTimezone(_)));
    }

    #[test]
    fn next_n_returns_strictly_increasing_instants() {
        let from = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let firings = next_n("0 9 * * MON", "Europe/Berlin", from, 3).unwrap();
        assert_eq!(firings.len(), 3);
        assert!(firings.windows(2).all(|w| w[0] < w[1]));
    }

    /// Europe/Berlin springs forward at 2025-03-30 02:00 CET -> 03:00 CEST,
    /// so a daily 02:30 firing has no local instant that day. The next
    /// candidate the iterator yields must be the following day's 02:30
    /// CEST, not some clamped instant inside the skipped hour.
    #[test]
    fn skips_nonexistent_local_time_across_spring_forward() {
        let from = Utc.with_ymd_and_hms(2025, 3, 29, 10, 0, 0).unwrap();
        let next = next_fire("30 2 * * *", "Europe/Berlin", from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 31, 0, 30, 0).unwrap());
    }

    /// Europe/Berlin falls back at 2025-10-26 03:00 CEST -> 02:00 CET, so
    /// local 02:30 occurs twice that day. The earlier (CEST, UTC+2)
    /// occurrence must win.
    #[test]
    fn resolves_ambiguous_local_time_to_earlier_occurrence_across_fall_back() {
        let from = Utc.with_ymd_and_hms(2025, 10, 25, 10, 0, 0).unwrap();
        let next = next_fire("30 2 * * *", "Europe/Berlin", from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 10, 26, 0, 30, 0).unwrap());
    }
}
