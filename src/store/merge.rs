//! Hierarchical merge with bounded retention.
//!
//! A validated observation is routed to its `state → commodity → market` slot,
//! creating any missing level on the way down. Within a market, records are
//! unique by `arrival_date`, kept newest first, and capped at
//! `RETAINED_RECORDS`; anything older is dropped for good.
//!
//! Read-modify-write of a state document happens under a per-state lock, and
//! the final write is version-checked so a writer on another handle cannot be
//! silently overwritten. On a version conflict the upsert re-reads and retries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, warn};

use crate::domain::{
    CommodityGroup, MarketGroup, PriceObservation, PriceRecord, RETAINED_RECORDS, StateGroup,
};
use crate::error::StoreError;
use crate::store::StateStore;

/// Re-read/re-apply attempts after a lost optimistic write.
pub const MAX_CONFLICT_RETRIES: usize = 3;

/// What an upsert did to the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First record ever seen for this state.
    CreatedState,
    AddedCommodity,
    AddedMarket,
    /// New date in an existing market; `evicted` older records were dropped.
    Inserted { evicted: usize },
    /// The market already holds this date. Nothing changed.
    DuplicateDate,
}

impl UpsertOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, UpsertOutcome::DuplicateDate)
    }
}

/// Apply one observation to an existing state document (steps below the root).
///
/// Linear scans are fine here: a state carries tens of commodities and a
/// commodity tens of markets.
pub fn merge_observation(doc: &mut StateGroup, obs: &PriceObservation) -> UpsertOutcome {
    let Some(commodity) = doc.commodity_mut(&obs.commodity) else {
        doc.commodities.push(CommodityGroup::seeded(obs));
        return UpsertOutcome::AddedCommodity;
    };

    let Some(market) = commodity.market_mut(&obs.market) else {
        commodity.markets.push(MarketGroup::seeded(obs));
        return UpsertOutcome::AddedMarket;
    };

    match insert_with_retention(&mut market.records, &obs.record) {
        Some(evicted) => UpsertOutcome::Inserted { evicted },
        None => UpsertOutcome::DuplicateDate,
    }
}

/// Insert `record` unless its date is already present, then keep the newest
/// `RETAINED_RECORDS`. Returns the number of records dropped, or `None` for a
/// duplicate date.
pub fn insert_with_retention(records: &mut Vec<PriceRecord>, record: &PriceRecord) -> Option<usize> {
    if records.iter().any(|r| r.arrival_date == record.arrival_date) {
        return None;
    }

    records.push(record.clone());
    records.sort_by(|a, b| b.arrival_date.cmp(&a.arrival_date));
    let evicted = records.len().saturating_sub(RETAINED_RECORDS);
    records.truncate(RETAINED_RECORDS);
    Some(evicted)
}

/// One mutex per state name, created on first use.
#[derive(Debug, Default)]
struct StateLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl StateLocks {
    fn for_state(&self, state: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(state.to_string()).or_default())
    }
}

/// The merge engine over an injected document store.
pub struct PriceStore {
    store: Arc<dyn StateStore>,
    locks: StateLocks,
}

impl PriceStore {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            locks: StateLocks::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Merge one observation and persist the owning state document.
    pub fn upsert(&self, obs: &PriceObservation) -> Result<UpsertOutcome, StoreError> {
        let lock = self.locks.for_state(&obs.state);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut retries = 0;
        loop {
            match self.try_upsert(obs) {
                Err(err @ (StoreError::Conflict { .. } | StoreError::AlreadyExists(_)))
                    if retries < MAX_CONFLICT_RETRIES =>
                {
                    retries += 1;
                    warn!(state = %obs.state, retries, error = %err, "Concurrent write detected, retrying");
                }
                result => return result,
            }
        }
    }

    fn try_upsert(&self, obs: &PriceObservation) -> Result<UpsertOutcome, StoreError> {
        let now = Utc::now();

        let Some(mut doc) = self.store.find_state(&obs.state)? else {
            debug!(state = %obs.state, "State not found, creating new state");
            self.store.insert_state(&StateGroup::seeded(obs, now))?;
            return Ok(UpsertOutcome::CreatedState);
        };

        let outcome = merge_observation(&mut doc, obs);
        if outcome.changed() {
            doc.updated_at = now;
            self.store.replace_state(&doc)?;
        }
        Ok(outcome)
    }
}
