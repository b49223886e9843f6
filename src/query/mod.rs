//! Read-only projections over the stored hierarchy.
//!
//! Every lookup goes back to the store, so views always reflect the latest
//! committed documents. Unknown keys yield empty lists rather than errors; only
//! store failures are reported.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::{PriceRecord, StateGroup};
use crate::error::{AppError, StoreError};
use crate::store::StateStore;
use crate::store::json_dir::decode_key;

/// A location in the hierarchy, written like the browse routes:
///
/// - `/`
/// - `/state/<state>`
/// - `/state/<state>/commodity/<commodity>`
/// - `/state/<state>/commodity/<commodity>/market/<market>`
///
/// Segments escape `/` as `%2F` and `%` as `%25`, so any stored name can be
/// addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPath {
    Root,
    State(String),
    Commodity {
        state: String,
        commodity: String,
    },
    Market {
        state: String,
        commodity: String,
        market: String,
    },
}

impl QueryPath {
    pub fn parse(input: &str) -> Result<Self, AppError> {
        let trimmed = input.trim();
        let raw: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
        let invalid = || {
            AppError::new(
                2,
                format!(
                    "Invalid query path '{trimmed}' (expected /, /state/<s>, /state/<s>/commodity/<c> or /state/<s>/commodity/<c>/market/<m>)"
                ),
            )
        };

        let decoded = raw
            .iter()
            .map(|s| decode_key(s))
            .collect::<Option<Vec<String>>>()
            .ok_or_else(invalid)?;
        let segments: Vec<&str> = decoded.iter().map(String::as_str).collect();

        match segments.as_slice() {
            [] => Ok(QueryPath::Root),
            ["state", state] => Ok(QueryPath::State(state.to_string())),
            ["state", state, "commodity", commodity] => Ok(QueryPath::Commodity {
                state: state.to_string(),
                commodity: commodity.to_string(),
            }),
            ["state", state, "commodity", commodity, "market", market] => Ok(QueryPath::Market {
                state: state.to_string(),
                commodity: commodity.to_string(),
                market: market.to_string(),
            }),
            _ => Err(invalid()),
        }
    }

    /// One level up; the root is its own parent.
    pub fn parent(&self) -> QueryPath {
        match self {
            QueryPath::Root | QueryPath::State(_) => QueryPath::Root,
            QueryPath::Commodity { state, .. } => QueryPath::State(state.clone()),
            QueryPath::Market { state, commodity, .. } => QueryPath::Commodity {
                state: state.clone(),
                commodity: commodity.clone(),
            },
        }
    }

    /// Descend into `key`. Returns `None` at the market level.
    pub fn child(&self, key: &str) -> Option<QueryPath> {
        let key = key.to_string();
        match self {
            QueryPath::Root => Some(QueryPath::State(key)),
            QueryPath::State(state) => Some(QueryPath::Commodity {
                state: state.clone(),
                commodity: key,
            }),
            QueryPath::Commodity { state, commodity } => Some(QueryPath::Market {
                state: state.clone(),
                commodity: commodity.clone(),
                market: key,
            }),
            QueryPath::Market { .. } => None,
        }
    }
}

impl FromStr for QueryPath {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueryPath::parse(s)
    }
}

impl fmt::Display for QueryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryPath::Root => write!(f, "/"),
            QueryPath::State(state) => write!(f, "/state/{}", escape_segment(state)),
            QueryPath::Commodity { state, commodity } => write!(
                f,
                "/state/{}/commodity/{}",
                escape_segment(state),
                escape_segment(commodity)
            ),
            QueryPath::Market {
                state,
                commodity,
                market,
            } => write!(
                f,
                "/state/{}/commodity/{}/market/{}",
                escape_segment(state),
                escape_segment(commodity),
                escape_segment(market)
            ),
        }
    }
}

fn escape_segment(segment: &str) -> String {
    segment.replace('%', "%25").replace('/', "%2F")
}

/// The result of resolving a `QueryPath`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "camelCase")]
pub enum QueryView {
    States {
        states: Vec<String>,
    },
    Commodities {
        state: String,
        commodities: Vec<String>,
    },
    Markets {
        state: String,
        commodity: String,
        markets: Vec<String>,
    },
    Records {
        state: String,
        commodity: String,
        market: String,
        records: Vec<PriceRecord>,
    },
}

impl QueryView {
    /// Keys one level down (empty for the records view).
    pub fn keys(&self) -> &[String] {
        match self {
            QueryView::States { states } => states,
            QueryView::Commodities { commodities, .. } => commodities,
            QueryView::Markets { markets, .. } => markets,
            QueryView::Records { .. } => &[],
        }
    }
}

/// One point of a market's price history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub min_price: f64,
    pub modal_price: f64,
    pub max_price: f64,
}

/// A market's retained records, oldest first, ready for charting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceSeries {
    pub points: Vec<SeriesPoint>,
}

impl PriceSeries {
    pub fn from_records(records: &[PriceRecord]) -> Self {
        let mut points: Vec<SeriesPoint> = records
            .iter()
            .map(|r| SeriesPoint {
                date: r.arrival_date,
                min_price: r.min_price,
                modal_price: r.modal_price,
                max_price: r.max_price,
            })
            .collect();
        points.sort_by_key(|p| p.date);
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Lowest and highest price across all three series.
    pub fn price_bounds(&self) -> Option<(f64, f64)> {
        let mut prices = self
            .points
            .iter()
            .flat_map(|p| [p.min_price, p.modal_price, p.max_price]);
        let first = prices.next()?;
        Some(prices.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn StateStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub fn list_states(&self) -> Result<Vec<String>, StoreError> {
        self.store.list_states()
    }

    pub fn list_commodities(&self, state: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .state(state)?
            .map(|doc| doc.commodities.into_iter().map(|c| c.commodity).collect())
            .unwrap_or_default())
    }

    pub fn list_markets(&self, state: &str, commodity: &str) -> Result<Vec<String>, StoreError> {
        let Some(doc) = self.state(state)? else {
            return Ok(Vec::new());
        };
        Ok(doc
            .commodity(commodity)
            .map(|c| c.markets.iter().map(|m| m.market.clone()).collect())
            .unwrap_or_default())
    }

    /// Retained records for a market, newest first.
    pub fn list_records(
        &self,
        state: &str,
        commodity: &str,
        market: &str,
    ) -> Result<Vec<PriceRecord>, StoreError> {
        let Some(doc) = self.state(state)? else {
            return Ok(Vec::new());
        };
        Ok(doc
            .commodity(commodity)
            .and_then(|c| c.market(market))
            .map(|m| m.records.clone())
            .unwrap_or_default())
    }

    pub fn price_series(
        &self,
        state: &str,
        commodity: &str,
        market: &str,
    ) -> Result<PriceSeries, StoreError> {
        let records = self.list_records(state, commodity, market)?;
        Ok(PriceSeries::from_records(&records))
    }

    pub fn query_by_path(&self, path: &QueryPath) -> Result<QueryView, StoreError> {
        Ok(match path {
            QueryPath::Root => QueryView::States {
                states: self.list_states()?,
            },
            QueryPath::State(state) => QueryView::Commodities {
                state: state.clone(),
                commodities: self.list_commodities(state)?,
            },
            QueryPath::Commodity { state, commodity } => QueryView::Markets {
                state: state.clone(),
                commodity: commodity.clone(),
                markets: self.list_markets(state, commodity)?,
            },
            QueryPath::Market {
                state,
                commodity,
                market,
            } => QueryView::Records {
                state: state.clone(),
                commodity: commodity.clone(),
                market: market.clone(),
                records: self.list_records(state, commodity, market)?,
            },
        })
    }

    fn state(&self, state: &str) -> Result<Option<StateGroup>, StoreError> {
        self.store.find_state(state)
    }
}
