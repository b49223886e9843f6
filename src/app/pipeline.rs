//! Shared ingestion pipeline used by the CLI, the scheduler, and the TUI.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! fetch all pages -> validate -> normalize date -> upsert, per record
//!
//! Front-ends only decide *when* to run and how to present the report.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::data::fetch::{FetchOptions, PageSource, fetch_all};
use crate::domain::RawRecord;
use crate::error::{FetchError, IngestError};
use crate::io::ingest::normalize_record;
use crate::store::{PriceStore, StateStore, UpsertOutcome};

/// Counts for one completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Raw records returned by the fetch.
    pub fetched: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub created_states: usize,
    pub added_commodities: usize,
    pub added_markets: usize,
    pub inserted: usize,
    pub duplicates: usize,
    /// Older records dropped by the retention rule.
    pub evicted: usize,
    pub failures_by_kind: BTreeMap<&'static str, usize>,
}

impl IngestReport {
    fn new(source: String, started_at: DateTime<Utc>, fetched: usize) -> Self {
        Self {
            source,
            started_at,
            finished_at: started_at,
            fetched,
            success_count: 0,
            failure_count: 0,
            created_states: 0,
            added_commodities: 0,
            added_markets: 0,
            inserted: 0,
            duplicates: 0,
            evicted: 0,
            failures_by_kind: BTreeMap::new(),
        }
    }

    fn record_success(&mut self, outcome: UpsertOutcome) {
        self.success_count += 1;
        match outcome {
            UpsertOutcome::CreatedState => self.created_states += 1,
            UpsertOutcome::AddedCommodity => self.added_commodities += 1,
            UpsertOutcome::AddedMarket => self.added_markets += 1,
            UpsertOutcome::Inserted { evicted } => {
                self.inserted += 1;
                self.evicted += evicted;
            }
            UpsertOutcome::DuplicateDate => self.duplicates += 1,
        }
    }

    fn record_failure(&mut self, kind: &'static str) {
        self.failure_count += 1;
        *self.failures_by_kind.entry(kind).or_default() += 1;
    }
}

/// Drives fetch → validate → merge. One run at a time per orchestrator.
pub struct Orchestrator {
    prices: PriceStore,
    fetch_options: FetchOptions,
    run_lock: Mutex<()>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn StateStore>, fetch_options: FetchOptions) -> Self {
        Self {
            prices: PriceStore::new(store),
            fetch_options,
            run_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        self.prices.store()
    }

    /// Execute one full run against `source`.
    ///
    /// A fetch failure fails the run. Per-record failures only bump
    /// `failure_count`.
    pub fn run(&self, source: &dyn PageSource) -> Result<IngestReport, FetchError> {
        let _run = self.run_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let started_at = Utc::now();
        let source_name = source.describe();
        info!(source = %source_name, "Fetching and updating commodity data");

        let records = fetch_all(source, self.fetch_options).map_err(|err| {
            error!(source = %source_name, error = %err, "Error fetching data");
            err
        })?;

        let mut report = IngestReport::new(source_name, started_at, records.len());
        for (index, raw) in records.iter().enumerate() {
            match self.process(raw) {
                Ok(outcome) => report.record_success(outcome),
                Err(err) => {
                    warn!(
                        index,
                        kind = err.kind(),
                        state = raw.state.as_deref().unwrap_or("-"),
                        commodity = raw.commodity.as_deref().unwrap_or("-"),
                        error = %err,
                        "Skipping record"
                    );
                    report.record_failure(err.kind());
                }
            }
        }
        report.finished_at = Utc::now();

        info!(
            fetched = report.fetched,
            success_count = report.success_count,
            failure_count = report.failure_count,
            inserted = report.inserted,
            duplicates = report.duplicates,
            evicted = report.evicted,
            "Commodity data update completed"
        );
        Ok(report)
    }

    fn process(&self, raw: &RawRecord) -> Result<UpsertOutcome, IngestError> {
        let obs = normalize_record(raw)?;
        Ok(self.prices.upsert(&obs)?)
    }
}
