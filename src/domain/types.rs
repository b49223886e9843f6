//! Shared domain types.
//!
//! Two families live here:
//!
//! - raw upstream records (`RawRecord`) that are deliberately loose, so that a
//!   single malformed record never fails a whole page
//! - the stored hierarchy (`StateGroup` → `CommodityGroup` → `MarketGroup` →
//!   `PriceRecord`), one serialized document per state

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Maximum number of dated records kept per market.
pub const RETAINED_RECORDS: usize = 3;

pub const DEFAULT_VARIETY: &str = "Unknown";
pub const DEFAULT_GRADE: &str = "Standard";

/// One record as returned by the upstream API.
///
/// Every field is optional and loosely typed; `io::ingest` decides what is
/// acceptable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default, alias = "State", deserialize_with = "lenient_text")]
    pub state: Option<String>,
    #[serde(default, alias = "District", deserialize_with = "lenient_text")]
    pub district: Option<String>,
    #[serde(default, alias = "Market", deserialize_with = "lenient_text")]
    pub market: Option<String>,
    #[serde(default, alias = "Commodity", deserialize_with = "lenient_text")]
    pub commodity: Option<String>,
    #[serde(default, alias = "Variety", deserialize_with = "lenient_text")]
    pub variety: Option<String>,
    #[serde(default, alias = "Grade", deserialize_with = "lenient_text")]
    pub grade: Option<String>,
    #[serde(default, alias = "Arrival_Date")]
    pub arrival_date: Option<RawDate>,
    #[serde(default, alias = "Min_x0020_Price", alias = "Min_Price")]
    pub min_price: Option<RawNumber>,
    #[serde(default, alias = "Max_x0020_Price", alias = "Max_Price")]
    pub max_price: Option<RawNumber>,
    #[serde(default, alias = "Modal_x0020_Price", alias = "Modal_Price")]
    pub modal_price: Option<RawNumber>,
}

/// Upstream arrival date before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDate {
    /// The usual `dd/mm/yyyy` string (possibly with doubled slashes).
    Text(String),
    /// Already a point in time (milliseconds since the Unix epoch).
    EpochMillis(i64),
    Other(Value),
}

/// Upstream price before parsing. The API serves prices as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(f64),
    Text(String),
    Other(Value),
}

impl RawNumber {
    pub fn display(&self) -> String {
        match self {
            RawNumber::Number(v) => v.to_string(),
            RawNumber::Text(s) => s.clone(),
            RawNumber::Other(v) => v.to_string(),
        }
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// A dated price observation for one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub arrival_date: NaiveDate,
    pub district: String,
    #[serde(default = "default_variety")]
    pub variety: String,
    #[serde(default = "default_grade")]
    pub grade: String,
    pub min_price: f64,
    pub max_price: f64,
    pub modal_price: f64,
}

fn default_variety() -> String {
    DEFAULT_VARIETY.to_string()
}

fn default_grade() -> String {
    DEFAULT_GRADE.to_string()
}

/// A validated, date-normalized record addressed to its place in the hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceObservation {
    pub state: String,
    pub commodity: String,
    pub market: String,
    pub record: PriceRecord,
}

/// Root document: everything known about one state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateGroup {
    pub state: String,
    #[serde(default)]
    pub commodities: Vec<CommodityGroup>,
    /// Bumped by the store on every successful write.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommodityGroup {
    pub commodity: String,
    #[serde(default)]
    pub markets: Vec<MarketGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketGroup {
    pub market: String,
    /// Newest first, at most `RETAINED_RECORDS` entries.
    #[serde(default)]
    pub records: Vec<PriceRecord>,
}

impl StateGroup {
    /// Build the full chain for a state seen for the first time.
    pub fn seeded(obs: &PriceObservation, now: DateTime<Utc>) -> Self {
        Self {
            state: obs.state.clone(),
            commodities: vec![CommodityGroup::seeded(obs)],
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn commodity(&self, commodity: &str) -> Option<&CommodityGroup> {
        self.commodities.iter().find(|c| c.commodity == commodity)
    }

    pub fn commodity_mut(&mut self, commodity: &str) -> Option<&mut CommodityGroup> {
        self.commodities.iter_mut().find(|c| c.commodity == commodity)
    }
}

impl CommodityGroup {
    pub fn seeded(obs: &PriceObservation) -> Self {
        Self {
            commodity: obs.commodity.clone(),
            markets: vec![MarketGroup::seeded(obs)],
        }
    }

    pub fn market(&self, market: &str) -> Option<&MarketGroup> {
        self.markets.iter().find(|m| m.market == market)
    }

    pub fn market_mut(&mut self, market: &str) -> Option<&mut MarketGroup> {
        self.markets.iter_mut().find(|m| m.market == market)
    }
}

impl MarketGroup {
    pub fn seeded(obs: &PriceObservation) -> Self {
        Self {
            market: obs.market.clone(),
            records: vec![obs.record.clone()],
        }
    }
}
