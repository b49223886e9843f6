//! Per-state document storage and the merge engine on top of it.
//!
//! - `StateStore`: the persistence seam, one `StateGroup` document per state
//! - `memory`: in-process store (tests, throwaway runs)
//! - `json_dir`: one JSON file per state in a directory
//! - `merge`: `PriceStore`, the hierarchical upsert with retention
//!
//! Stores are handles with an explicit lifecycle: construct with `open`, stop
//! with `close`. Every operation on a closed handle fails with
//! `StoreError::Closed`.

use crate::domain::StateGroup;
use crate::error::StoreError;

pub mod json_dir;
pub mod memory;
pub mod merge;

pub use json_dir::JsonDirStore;
pub use memory::MemoryStore;
pub use merge::{PriceStore, UpsertOutcome, merge_observation};

/// Document store keyed by state name.
///
/// Writes are version-checked: `insert_state` only succeeds for an unseen
/// state, and `replace_state` only succeeds if the stored version still equals
/// the version carried by the document being written.
pub trait StateStore: Send + Sync {
    /// Load the document for `state`, if any.
    fn find_state(&self, state: &str) -> Result<Option<StateGroup>, StoreError>;

    /// Create a new document. Returns the stored version.
    fn insert_state(&self, doc: &StateGroup) -> Result<u64, StoreError>;

    /// Overwrite an existing document. Returns the stored version.
    fn replace_state(&self, doc: &StateGroup) -> Result<u64, StoreError>;

    /// Distinct state names, sorted ascending.
    fn list_states(&self) -> Result<Vec<String>, StoreError>;

    fn close(&self) -> Result<(), StoreError>;

    fn is_open(&self) -> bool;
}
