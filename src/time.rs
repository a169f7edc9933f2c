//! Time & key primitives: HH:MM arithmetic and run-key formatting.
//!
//! All clock-of-day values in this crate are `HH:MM` strings, 24-hour,
//! leading zeros. `24:00` is accepted only with minute `00`.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Parses an `HH:MM` clock-of-day string into minutes since midnight.
pub fn minutes(t: &str) -> Result<i64> {
    let (h, m) = split_hhmm(t)?;
    if h == 24 {
        if m != 0 {
            return Err(invalid(t));
        }
        return Ok(24 * 60);
    }
    if h > 23 || m > 59 {
        return Err(invalid(t));
    }
    Ok(h as i64 * 60 + m as i64)
}

fn split_hhmm(t: &str) -> Result<(u32, u32)> {
    let mut parts = t.split(':');
    let (Some(h), Some(m), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid(t));
    };
    if h.len() != 2 || m.len() != 2 {
        return Err(invalid(t));
    }
    let h: u32 = h.parse().map_err(|_| invalid(t))?;
    let m: u32 = m.parse().map_err(|_| invalid(t))?;
    Ok((h, m))
}

fn invalid(t: &str) -> Error {
    Error::Validation {
        message: format!("'{t}' is not a valid HH:MM time"),
    }
}

/// Formats minutes-since-midnight back into `HH:MM`, clamped to `[0, 24:00]`.
pub fn format_minutes(total_minutes: i64) -> Result<String> {
    if !(0..=24 * 60).contains(&total_minutes) {
        return Err(Error::Validation {
            message: format!("{total_minutes} minutes is outside a single day"),
        });
    }
    Ok(format!("{:02}:{:02}", total_minutes / 60, total_minutes % 60))
}

/// `addMinutes(t, n)` — `n` may be negative; the result must still land
/// within a single day (`0..=24:00`).
pub fn add_minutes(t: &str, n: i64) -> Result<String> {
    format_minutes(minutes(t)? + n)
}

/// `difference(a, b) = minutes(b) - minutes(a)`.
pub fn difference(a: &str, b: &str) -> Result<i64> {
    Ok(minutes(b)? - minutes(a)?)
}

/// `tourRunKey(tourId, date, time) = "{tourId}|{YYYY-MM-DD}|{HH:MM}"`.
pub fn tour_run_key(tour_id: Uuid, date: NaiveDate, time: &str) -> String {
    format!("{tour_id}|{}|{time}", date.format("%Y-%m-%d"))
}

/// The inverse of [`tour_run_key`]: splits on `|` into exactly three parts.
pub fn parse_tour_run_key(key: &str) -> Result<(Uuid, NaiveDate, String)> {
    let mut parts = key.split('|');
    let (Some(tour_id), Some(date), Some(time), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::Validation {
            message: format!("'{key}' is not a well-formed tour run key"),
        });
    };
    let tour_id = Uuid::parse_str(tour_id).map_err(|_| Error::Validation {
        message: format!("'{tour_id}' is not a valid tour id"),
    })?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| Error::Validation {
        message: format!("'{date}' is not a valid date"),
    })?;
    minutes(time)?;
    Ok((tour_id, date, time.to_string()))
}

/// A logical calendar day, as received at one of the two entry points that
/// must agree on `formatDateKey` (a plain day, or an instant that still
/// needs to be projected onto the tenant's operational day).
pub enum DateKeySource {
    CalendarDay(NaiveDate),
    Instant(DateTime<Utc>),
}

/// `formatDateKey(d)` — normalizes either input to `YYYY-MM-DD` in the
/// tenant's operational timezone, expressed as a fixed UTC offset in
/// minutes (the dispatch core does not carry a full IANA tz database; the
/// offset is resolved by the tenant envelope that is out of scope here).
pub fn format_date_key(source: DateKeySource, tz_offset_minutes: i32) -> String {
    let date = match source {
        DateKeySource::CalendarDay(d) => d,
        DateKeySource::Instant(instant) => {
            let shifted = instant + chrono::Duration::minutes(tz_offset_minutes as i64);
            NaiveDate::from_ymd_opt(shifted.year(), shifted.month(), shifted.day())
                .expect("shifted instant always yields a valid calendar date")
        }
    };
    date.format("%Y-%m-%d").to_string()
}

/// `dayOfWeek(date)`, 0 = Sunday ... 6 = Saturday, matching the
/// weekly-availability keying (chrono's `Weekday` is Monday-first, so this
/// rotates it).
pub fn day_of_week(date: NaiveDate) -> u8 {
    (date.weekday().num_days_from_sunday()) as u8
}

/// Convenience used throughout the optimizer and timeline builder: `true`
/// when interval `[a_start, a_end)` overlaps `[b_start, b_end)`. Touching
/// ends (`a_end == b_start`) do not count as overlapping.
pub fn intervals_overlap(a_start: i64, a_end: i64, b_start: i64, b_end: i64) -> bool {
    a_start < b_end && b_start < a_end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_leading_zero_times() {
        assert_eq!(minutes("09:05").unwrap(), 9 * 60 + 5);
        assert_eq!(minutes("00:00").unwrap(), 0);
        assert_eq!(minutes("24:00").unwrap(), 24 * 60);
    }

    #[test]
    fn rejects_24_01() {
        assert!(minutes("24:01").is_err());
    }

    #[test]
    fn add_minutes_roundtrips() {
        assert_eq!(add_minutes("09:00", 90).unwrap(), "10:30");
        assert_eq!(add_minutes("23:30", 30).unwrap(), "24:00");
    }

    #[test]
    fn difference_is_signed() {
        assert_eq!(difference("09:00", "09:30").unwrap(), 30);
        assert_eq!(difference("09:30", "09:00").unwrap(), -30);
    }

    #[test]
    fn tour_run_key_roundtrips() {
        let tour_id = Uuid::nil();
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let key = tour_run_key(tour_id, date, "09:00");
        assert_eq!(key, format!("{tour_id}|2026-07-28|09:00"));
        let (parsed_tour, parsed_date, parsed_time) = parse_tour_run_key(&key).unwrap();
        assert_eq!(parsed_tour, tour_id);
        assert_eq!(parsed_date, date);
        assert_eq!(parsed_time, "09:00");
    }

    #[test]
    fn overlap_touching_ends_is_not_overlap() {
        assert!(!intervals_overlap(0, 60, 60, 120));
        assert!(intervals_overlap(0, 61, 60, 120));
    }

    #[test]
    fn day_of_week_matches_sunday_zero() {
        // 2026-07-26 is a Sunday.
        let sunday = NaiveDate::from_ymd_opt(2026, 7, 26).unwrap();
        assert_eq!(day_of_week(sunday), 0);
        assert_eq!(day_of_week(sunday.succ_opt().unwrap()), 1);
    }
}
