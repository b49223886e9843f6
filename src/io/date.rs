//! Arrival-date normalization.
//!
//! Upstream dates are `day/month/year` strings, sometimes with doubled
//! separators (`5//6//2024`). Out-of-range components are rejected rather than
//! rolled over into the next month or year.

use chrono::{DateTime, NaiveDate};

use crate::domain::RawDate;
use crate::error::RecordError;

/// Parse an upstream arrival date into a calendar date.
///
/// Epoch-millisecond timestamps are already dates and pass through as their
/// UTC calendar day.
pub fn parse_arrival_date(raw: &RawDate) -> Result<NaiveDate, RecordError> {
    match raw {
        RawDate::Text(text) => parse_date_text(text),
        RawDate::EpochMillis(millis) => DateTime::from_timestamp_millis(*millis)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| RecordError::InvalidDate(millis.to_string())),
        RawDate::Other(value) => Err(RecordError::InvalidDate(value.to_string())),
    }
}

/// Parse a `day/month/year` string.
pub fn parse_date_text(text: &str) -> Result<NaiveDate, RecordError> {
    let invalid = || RecordError::InvalidDate(text.to_string());

    let normalized = text.trim().replace("//", "/");
    let mut parts = normalized.split('/');
    let day = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let month = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let year = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;

    let day: u32 = parse_digits(day, 2).ok_or_else(invalid)?;
    let month: u32 = parse_digits(month, 2).ok_or_else(invalid)?;
    let year: i32 = match year.len() {
        // Two-digit years land in the 1900s, like the upstream's own tooling.
        2 => 1900 + parse_digits::<i32>(year, 2).ok_or_else(invalid)?,
        4 => parse_digits(year, 4).ok_or_else(invalid)?,
        _ => return Err(invalid()),
    };

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

fn parse_digits<T: std::str::FromStr>(token: &str, max_len: usize) -> Option<T> {
    let token = token.trim();
    if token.is_empty() || token.len() > max_len || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_day_month_year() {
        assert_eq!(parse_date_text("05/06/2024").unwrap(), ymd(2024, 6, 5));
        assert_eq!(parse_date_text("  5/6/2024 ").unwrap(), ymd(2024, 6, 5));
    }

    #[test]
    fn tolerates_doubled_slashes() {
        assert_eq!(parse_date_text("5//6//2024").unwrap(), ymd(2024, 6, 5));
        assert_eq!(parse_date_text("05//06/2024").unwrap(), ymd(2024, 6, 5));
    }

    #[test]
    fn two_digit_year_is_twentieth_century() {
        assert_eq!(parse_date_text("01/02/99").unwrap(), ymd(1999, 2, 1));
    }

    #[test]
    fn rejects_missing_components() {
        assert_eq!(
            parse_date_text("06/2024"),
            Err(RecordError::InvalidDate("06/2024".to_string()))
        );
        assert!(parse_date_text("").is_err());
        assert!(parse_date_text("05/06/").is_err());
    }

    #[test]
    fn rejects_impossible_dates() {
        assert!(parse_date_text("32/13/2024").is_err());
        assert!(parse_date_text("29/02/2023").is_err());
        assert_eq!(parse_date_text("29/02/2024").unwrap(), ymd(2024, 2, 29));
    }

    #[test]
    fn rejects_non_numeric_and_odd_widths() {
        assert!(parse_date_text("aa/06/2024").is_err());
        assert!(parse_date_text("05/June/2024").is_err());
        assert!(parse_date_text("05/06/202").is_err());
        assert!(parse_date_text("2024-06-05").is_err());
    }

    #[test]
    fn extra_components_are_ignored() {
        assert_eq!(parse_date_text("05/06/2024/extra").unwrap(), ymd(2024, 6, 5));
    }

    #[test]
    fn epoch_millis_pass_through() {
        // 2024-06-05T00:00:00Z
        let raw = RawDate::EpochMillis(1_717_545_600_000);
        assert_eq!(parse_arrival_date(&raw).unwrap(), ymd(2024, 6, 5));
    }

    #[test]
    fn other_shapes_are_invalid() {
        let raw = RawDate::Other(serde_json::json!({ "d": 5 }));
        assert!(matches!(parse_arrival_date(&raw), Err(RecordError::InvalidDate(_))));
    }
}
