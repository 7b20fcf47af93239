use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::{BlueprintError, Result};
use crate::JulianDay;

/// Calendar years accepted for chart calculation. Outside this window the
/// ephemeris backends are not validated, so the request is refused instead
/// of silently returning a wrong chart.
pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

/// A fully resolved birth instant: local wall-clock data plus the derived
/// UTC instant and Julian Day (UT). The Julian Day is only ever computed
/// here, after timezone resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct BirthMoment {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub timezone: Tz,
    pub utc: DateTime<Utc>,
    pub julian_day: JulianDay,
}

/// Combines a local birth date and time with an IANA timezone to produce a
/// single UTC instant and its Julian Day (UT).
///
/// An omitted time defaults to local noon. An ambiguous local time (the
/// repeated DST hour) resolves to the earlier instant; a skipped local time
/// (the missing DST hour) is pushed forward one hour.
pub fn normalize(date: &str, time: Option<&str>, timezone: &str) -> Result<BirthMoment> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| BlueprintError::invalid_input(format!("bad birth date {:?}: {}", date, e)))?;

    if date.year() < MIN_YEAR || date.year() > MAX_YEAR {
        return Err(BlueprintError::OutOfRange { year: date.year() });
    }

    let time = match time {
        Some(t) => parse_time(t)?,
        None => NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
    };

    let tz: Tz = timezone
        .parse()
        .map_err(|_| BlueprintError::invalid_input(format!("unknown timezone {:?}", timezone)))?;

    let local = NaiveDateTime::new(date, time);
    let utc = match tz.from_local_datetime(&local) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        chrono::LocalResult::None => {
            // Skipped DST hour: the wall-clock time never existed locally.
            let shifted = local + chrono::Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .ok_or_else(|| {
                    BlueprintError::invalid_input(format!("unrepresentable local time {}", local))
                })?
                .with_timezone(&Utc)
        }
    };

    Ok(BirthMoment {
        date,
        time,
        timezone: tz,
        julian_day: julian_day(&utc),
        utc,
    })
}

fn parse_time(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|e| BlueprintError::invalid_input(format!("bad birth time {:?}: {}", raw, e)))
}

/// Julian Day (UT) for a UTC instant, by the standard Gregorian-calendar
/// algorithm with the 1582-10-15 cutover correction.
pub fn julian_day(utc: &DateTime<Utc>) -> JulianDay {
    let day_fraction = utc.hour() as f64 / 24.0
        + utc.minute() as f64 / 1440.0
        + (utc.second() as f64 + utc.nanosecond() as f64 / 1_000_000_000.0) / 86400.0;
    julian_day_from_calendar(utc.year(), utc.month(), utc.day() as f64 + day_fraction)
}

fn julian_day_from_calendar(year: i32, month: u32, day: f64) -> JulianDay {
    let (y, m) = if month <= 2 {
        (year - 1, month as i32 + 12)
    } else {
        (year, month as i32)
    };

    // Gregorian for dates on or after 1582-10-15, Julian before.
    let gregorian = (year, month, day as u32) >= (1582, 10, 15);
    let b = if gregorian {
        let a = (y as f64 / 100.0).floor();
        2.0 - a + (a / 4.0).floor()
    } else {
        0.0
    };

    (365.25 * (y as f64 + 4716.0)).floor() + (30.6001 * (m as f64 + 1.0)).floor() + day + b
        - 1524.5
}

/// JD of the Unix epoch, 1970-01-01T00:00:00Z.
const JD_UNIX_EPOCH: f64 = 2_440_587.5;

/// Inverse of [`julian_day`] for the supported (post-cutover) window,
/// rounded to whole seconds. Used to express the solar-arc-shifted design
/// instant as a calendar instant again.
pub fn julian_day_to_utc(jd: JulianDay) -> DateTime<Utc> {
    let seconds = ((jd - JD_UNIX_EPOCH) * 86400.0).round() as i64;
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn j2000_epoch() {
        let dt = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert_relative_eq!(julian_day(&dt), 2_451_545.0, epsilon = 1e-9);
    }

    #[test]
    fn julian_calendar_before_cutover() {
        // 1582-10-04 (Julian) noon is immediately followed by 1582-10-15
        // (Gregorian); both map to consecutive Julian Days.
        let before = julian_day_from_calendar(1582, 10, 4.5);
        let after = julian_day_from_calendar(1582, 10, 15.5);
        assert_relative_eq!(after - before, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn roundtrip_through_julian_day() {
        let dt = Utc.with_ymd_and_hms(1991, 6, 18, 7, 10, 0).unwrap();
        let back = julian_day_to_utc(julian_day(&dt));
        assert_eq!(back, dt);
    }

    #[test]
    fn noon_default_and_timezone_shift() {
        let m = normalize("2000-01-01", None, "Europe/London").unwrap();
        assert_eq!(m.time, NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        // London is on UTC in January.
        assert_eq!(m.utc.hour(), 12);

        let m = normalize("2000-07-01", None, "Asia/Kolkata").unwrap();
        // IST is UTC+5:30, so local noon is 06:30 UTC.
        assert_eq!((m.utc.hour(), m.utc.minute()), (6, 30));
    }

    #[test]
    fn julian_day_monotonic_in_utc() {
        let a = normalize("1990-03-21", Some("06:00"), "UTC").unwrap();
        let b = normalize("1990-03-21", Some("06:00:01"), "UTC").unwrap();
        assert!(b.julian_day > a.julian_day);
    }

    #[test]
    fn rejects_year_outside_window() {
        match normalize("1850-06-01", None, "UTC") {
            Err(BlueprintError::OutOfRange { year }) => assert_eq!(year, 1850),
            other => panic!("expected OutOfRange, got {:?}", other),
        }
        assert!(matches!(
            normalize("2101-01-01", None, "UTC"),
            Err(BlueprintError::OutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_garbage_date_and_time() {
        assert!(matches!(
            normalize("not-a-date", None, "UTC"),
            Err(BlueprintError::InputValidation { .. })
        ));
        assert!(matches!(
            normalize("2000-01-01", Some("25:99"), "UTC"),
            Err(BlueprintError::InputValidation { .. })
        ));
        assert!(matches!(
            normalize("2000-01-01", None, "Atlantis/Nowhere"),
            Err(BlueprintError::InputValidation { .. })
        ));
    }

    #[test]
    fn skipped_dst_hour_moves_forward() {
        // 2021-03-28 02:30 never existed in Berlin (clocks jumped 02:00->03:00).
        let m = normalize("2021-03-28", Some("02:30"), "Europe/Berlin").unwrap();
        assert_eq!(m.utc.hour(), 1);
        assert_eq!(m.utc.minute(), 30);
    }
}
