//! Date-range presets.
//!
//! Expands a preset ("30", "60", "90", any day count, or "custom") into concrete
//! calendar bounds. Numeric presets end on yesterday: the mail index behind the
//! agent lags by about a day and rejects end dates it has not indexed yet.

use crate::model::{parse_iso_date, ScanDateRange};
use std::str::FromStr;
use time::{Date, Duration, OffsetDateTime};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRangeError {
    #[error("a custom range needs both a start and an end date")]
    MissingBound,
    #[error("start date {start} is after end date {end}")]
    StartAfterEnd { start: Date, end: Date },
    #[error("invalid date {input:?}, expected YYYY-MM-DD")]
    UnparseableDate { input: String },
    #[error("unknown date preset {0:?}, expected a number of days or \"custom\"")]
    UnknownPreset(String),
    #[error("{days} days before {today} is outside the supported calendar")]
    OutOfRange { days: u16, today: Date },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePreset {
    /// The `N` days ending yesterday.
    Days(u16),
    /// Caller-supplied bounds, passed through unchanged.
    Custom,
}

impl FromStr for DatePreset {
    type Err = InvalidRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("custom") {
            return Ok(DatePreset::Custom);
        }
        match s.parse::<u16>() {
            Ok(n) if n > 0 => Ok(DatePreset::Days(n)),
            _ => Err(InvalidRangeError::UnknownPreset(s.to_string())),
        }
    }
}

/// Today's calendar date in the local zone, or UTC if the local offset is unknown.
pub fn today_local() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

/// Resolve a preset against `today`.
pub fn resolve(
    preset: DatePreset,
    custom_start: Option<&str>,
    custom_end: Option<&str>,
    today: Date,
) -> Result<ScanDateRange, InvalidRangeError> {
    match preset {
        DatePreset::Days(days) => {
            let out_of_range = || InvalidRangeError::OutOfRange { days, today };
            let end = today.previous_day().ok_or_else(out_of_range)?;
            let start = end
                .checked_sub(Duration::days(i64::from(days)))
                .ok_or_else(out_of_range)?;
            Ok(ScanDateRange { start, end })
        }
        DatePreset::Custom => {
            let (Some(start), Some(end)) = (non_blank(custom_start), non_blank(custom_end)) else {
                return Err(InvalidRangeError::MissingBound);
            };
            let start = parse_bound(start)?;
            let end = parse_bound(end)?;
            if start > end {
                return Err(InvalidRangeError::StartAfterEnd { start, end });
            }
            Ok(ScanDateRange { start, end })
        }
    }
}

/// Resolve a preset against the current local date.
pub fn resolve_today(
    preset: DatePreset,
    custom_start: Option<&str>,
    custom_end: Option<&str>,
) -> Result<ScanDateRange, InvalidRangeError> {
    resolve(preset, custom_start, custom_end, today_local())
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_bound(input: &str) -> Result<Date, InvalidRangeError> {
    parse_iso_date(input).map_err(|_| InvalidRangeError::UnparseableDate {
        input: input.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    const TODAY: Date = date!(2026 - 03 - 15);

    #[test]
    fn numeric_presets_end_yesterday() {
        for n in [30u16, 60, 90] {
            let r = resolve(DatePreset::Days(n), None, None, TODAY).unwrap();
            assert_eq!(r.end, date!(2026 - 03 - 14));
            assert_eq!(r.start, r.end - Duration::days(i64::from(n)));
            assert!(r.start <= r.end);
        }
    }

    #[test]
    fn thirty_days_crosses_month_boundary() {
        let r = resolve(DatePreset::Days(30), None, None, date!(2026 - 03 - 01)).unwrap();
        assert_eq!(r.end, date!(2026 - 02 - 28));
        assert_eq!(r.start, date!(2026 - 01 - 29));
    }

    #[test]
    fn numeric_presets_ignore_custom_bounds() {
        let r = resolve(
            DatePreset::Days(30),
            Some("2020-01-01"),
            Some("2020-02-01"),
            TODAY,
        )
        .unwrap();
        assert_eq!(r.end, date!(2026 - 03 - 14));
    }

    #[test]
    fn same_day_resolution_is_idempotent() {
        let a = resolve(DatePreset::Days(60), None, None, TODAY).unwrap();
        let b = resolve(DatePreset::Days(60), None, None, TODAY).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );

        let c = resolve_today(DatePreset::Days(90), None, None).unwrap();
        let d = resolve_today(DatePreset::Days(90), None, None).unwrap();
        // Could straddle midnight; retry once if the clock rolled over.
        if c != d {
            let e = resolve_today(DatePreset::Days(90), None, None).unwrap();
            assert_eq!(d, e);
        }
    }

    #[test]
    fn custom_range_passes_through_unchanged() {
        let r = resolve(
            DatePreset::Custom,
            Some("2026-01-01"),
            Some("2026-01-31"),
            TODAY,
        )
        .unwrap();
        assert_eq!(r.start, date!(2026 - 01 - 01));
        assert_eq!(r.end, date!(2026 - 01 - 31));

        // Single-day and future bounds are not corrected.
        let r = resolve(
            DatePreset::Custom,
            Some("2026-12-01"),
            Some("2026-12-01"),
            TODAY,
        )
        .unwrap();
        assert_eq!(r.start, r.end);
        assert_eq!(r.end, date!(2026 - 12 - 01));
    }

    #[test]
    fn custom_start_after_end_fails() {
        let err = resolve(
            DatePreset::Custom,
            Some("2026-02-01"),
            Some("2026-01-01"),
            TODAY,
        )
        .unwrap_err();
        assert!(matches!(err, InvalidRangeError::StartAfterEnd { .. }));
    }

    #[test]
    fn custom_missing_bound_fails() {
        for (s, e) in [
            (None, Some("2026-01-01")),
            (Some("2026-01-01"), None),
            (Some("  "), Some("2026-01-01")),
        ] {
            assert_eq!(
                resolve(DatePreset::Custom, s, e, TODAY),
                Err(InvalidRangeError::MissingBound)
            );
        }
    }

    #[test]
    fn custom_garbage_date_fails() {
        let err = resolve(
            DatePreset::Custom,
            Some("yesterday"),
            Some("2026-01-01"),
            TODAY,
        )
        .unwrap_err();
        assert!(matches!(err, InvalidRangeError::UnparseableDate { .. }));
    }

    #[test]
    fn parses_presets() {
        assert_eq!("30".parse::<DatePreset>(), Ok(DatePreset::Days(30)));
        assert_eq!(" Custom ".parse::<DatePreset>(), Ok(DatePreset::Custom));
        assert!("0".parse::<DatePreset>().is_err());
        assert!("last-month".parse::<DatePreset>().is_err());
    }

    #[test]
    fn bottom_of_calendar_is_out_of_range() {
        let err = resolve(DatePreset::Days(30), None, None, Date::MIN).unwrap_err();
        assert!(matches!(err, InvalidRangeError::OutOfRange { .. }));
    }
}
