//! Record validation and normalization.
//!
//! This module turns a loosely typed upstream record into a
//! `PriceObservation` that is safe to merge:
//!
//! - **Required fields** are checked in a fixed order and the first missing one
//!   is reported
//! - **Defaults** fill in `variety` and `grade`
//! - **Row-level failures** never abort the batch; callers count and move on
//! - **No store access** happens here

use crate::domain::{
    DEFAULT_GRADE, DEFAULT_VARIETY, PriceObservation, PriceRecord, RawDate, RawNumber, RawRecord,
};
use crate::error::RecordError;
use crate::io::date::parse_arrival_date;

/// Fields of a raw record that passed presence checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedFields<'a> {
    pub state: &'a str,
    pub commodity: &'a str,
    pub market: &'a str,
    pub district: &'a str,
    pub variety: &'a str,
    pub grade: &'a str,
    pub arrival_date: &'a RawDate,
    pub min_price: f64,
    pub max_price: f64,
    pub modal_price: f64,
}

/// Check required fields and parse prices.
///
/// Order matters for reporting: `commodity`, `arrival_date`, `state`,
/// `district`, `market`, then the three prices.
pub fn validate_record(raw: &RawRecord) -> Result<ValidatedFields<'_>, RecordError> {
    let commodity = required_text(&raw.commodity, "commodity")?;
    let arrival_date = match &raw.arrival_date {
        None => return Err(RecordError::MissingField("arrival_date")),
        Some(RawDate::Text(s)) if s.is_empty() => return Err(RecordError::MissingField("arrival_date")),
        Some(date) => date,
    };
    let state = required_text(&raw.state, "state")?;
    let district = required_text(&raw.district, "district")?;
    let market = required_text(&raw.market, "market")?;

    let min_price = required_price(&raw.min_price, "min_price")?;
    let max_price = required_price(&raw.max_price, "max_price")?;
    let modal_price = required_price(&raw.modal_price, "modal_price")?;

    Ok(ValidatedFields {
        state,
        commodity,
        market,
        district,
        variety: optional_text(&raw.variety).unwrap_or(DEFAULT_VARIETY),
        grade: optional_text(&raw.grade).unwrap_or(DEFAULT_GRADE),
        arrival_date,
        min_price,
        max_price,
        modal_price,
    })
}

/// Validate, then normalize the arrival date.
pub fn normalize_record(raw: &RawRecord) -> Result<PriceObservation, RecordError> {
    let fields = validate_record(raw)?;
    let arrival_date = parse_arrival_date(fields.arrival_date)?;

    Ok(PriceObservation {
        state: fields.state.to_string(),
        commodity: fields.commodity.to_string(),
        market: fields.market.to_string(),
        record: PriceRecord {
            arrival_date,
            district: fields.district.to_string(),
            variety: fields.variety.to_string(),
            grade: fields.grade.to_string(),
            min_price: fields.min_price,
            max_price: fields.max_price,
            modal_price: fields.modal_price,
        },
    })
}

fn required_text<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, RecordError> {
    value
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(RecordError::MissingField(name))
}

fn optional_text(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn required_price(value: &Option<RawNumber>, name: &'static str) -> Result<f64, RecordError> {
    let raw = value.as_ref().ok_or(RecordError::MissingField(name))?;
    let parsed = match raw {
        RawNumber::Number(v) => Some(*v),
        RawNumber::Text(s) if s.trim().is_empty() => return Err(RecordError::MissingField(name)),
        RawNumber::Text(s) => s.trim().parse::<f64>().ok(),
        RawNumber::Other(_) => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| RecordError::InvalidPrice {
            field: name,
            value: raw.display(),
        })
}
