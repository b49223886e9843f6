//! Synthetic mandi price pages for offline runs and demos.
//!
//! The generator walks a small fixed catalogue of (state, district, market,
//! commodity) tuples and emits one record per tuple per day, with prices drawn
//! around a commodity baseline. A configurable share of records is deliberately
//! broken (missing district, unparseable date) so the failure counters have
//! something to count.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{Duration, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::data::fetch::PageSource;
use crate::domain::{RawDate, RawNumber, RawRecord};
use crate::error::{AppError, FetchError};

/// (state, district, market)
const MARKETS: [(&str, &str, &str); 6] = [
    ("Kerala", "Kollam", "Punalur"),
    ("Kerala", "Ernakulam", "Aluva"),
    ("Punjab", "Ludhiana", "Khanna"),
    ("Punjab", "Amritsar", "Amritsar"),
    ("Maharashtra", "Nashik", "Lasalgaon"),
    ("Uttar Pradesh", "Agra", "Achnera"),
];

/// (commodity, variety, baseline modal price per quintal)
const COMMODITIES: [(&str, &str, f64); 5] = [
    ("Onion", "Red", 2200.0),
    ("Tomato", "Hybrid", 1800.0),
    ("Wheat", "Dara", 2275.0),
    ("Banana", "Palayamthodan", 3200.0),
    ("Potato", "Desi", 1400.0),
];

#[derive(Debug, Clone, PartialEq)]
pub struct SampleConfig {
    /// Last arrival date generated.
    pub end_date: NaiveDate,
    /// Number of consecutive days ending at `end_date`.
    pub days: u32,
    pub seed: u64,
    /// Share of records emitted with a defect, in `[0, 1)`.
    pub defect_rate: f64,
}

/// In-memory page source over a generated batch.
#[derive(Debug, Clone)]
pub struct SamplePages {
    records: Vec<RawRecord>,
}

impl SamplePages {
    pub fn generate(config: &SampleConfig) -> Result<Self, AppError> {
        if config.days == 0 {
            return Err(AppError::new(2, "Sample day count must be > 0."));
        }
        if !(0.0..1.0).contains(&config.defect_rate) {
            return Err(AppError::new(2, "Sample defect rate must be in [0, 1)."));
        }

        let mut rng = StdRng::seed_from_u64(sample_seed(config));
        let noise = Normal::new(0.0, 0.08)
            .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

        let mut records = Vec::with_capacity(config.days as usize * MARKETS.len() * COMMODITIES.len());
        for back in (0..config.days).rev() {
            let date = config.end_date - Duration::days(i64::from(back));
            for &(state, district, market) in &MARKETS {
                for &(commodity, variety, baseline) in &COMMODITIES {
                    // Not every market trades every commodity every day.
                    if rng.gen_bool(0.2) {
                        continue;
                    }

                    let modal = (baseline * (1.0 + noise.sample(&mut rng))).max(1.0).round();
                    let spread = (modal * rng.gen_range(0.03..0.15)).round();
                    let mut record = RawRecord {
                        state: Some(state.to_string()),
                        district: Some(district.to_string()),
                        market: Some(market.to_string()),
                        commodity: Some(commodity.to_string()),
                        variety: Some(variety.to_string()),
                        grade: Some("FAQ".to_string()),
                        arrival_date: Some(RawDate::Text(date.format("%d/%m/%Y").to_string())),
                        min_price: Some(RawNumber::Text(format!("{}", modal - spread))),
                        max_price: Some(RawNumber::Text(format!("{}", modal + spread))),
                        modal_price: Some(RawNumber::Text(format!("{modal}"))),
                    };

                    if rng.gen_bool(config.defect_rate) {
                        inject_defect(&mut record, &mut rng);
                    }
                    records.push(record);
                }
            }
        }

        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }
}

impl PageSource for SamplePages {
    fn fetch_page(&self, offset: usize, limit: usize) -> Result<Option<Vec<RawRecord>>, FetchError> {
        if offset >= self.records.len() {
            return Ok(Some(Vec::new()));
        }
        let end = offset.saturating_add(limit).min(self.records.len());
        Ok(Some(self.records[offset..end].to_vec()))
    }

    fn describe(&self) -> String {
        format!("sample ({} records)", self.records.len())
    }
}

fn inject_defect(record: &mut RawRecord, rng: &mut StdRng) {
    match rng.gen_range(0..3) {
        0 => record.district = None,
        1 => record.arrival_date = Some(RawDate::Text("31/02".to_string())),
        _ => record.modal_price = Some(RawNumber::Text("NR".to_string())),
    }
}

fn sample_seed(config: &SampleConfig) -> u64 {
    let mut hasher = DefaultHasher::new();
    config.end_date.hash(&mut hasher);
    config.days.hash(&mut hasher);
    config.seed.hash(&mut hasher);
    config.defect_rate.to_bits().hash(&mut hasher);
    hasher.finish()
}
