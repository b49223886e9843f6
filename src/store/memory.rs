//! In-process document store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::domain::StateGroup;
use crate::error::StoreError;
use crate::store::StateStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<String, StateGroup>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn open() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl StateStore for MemoryStore {
    fn find_state(&self, state: &str) -> Result<Option<StateGroup>, StoreError> {
        self.ensure_open()?;
        let docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(docs.get(state).cloned())
    }

    fn insert_state(&self, doc: &StateGroup) -> Result<u64, StoreError> {
        self.ensure_open()?;
        if doc.state.is_empty() {
            return Err(StoreError::InvalidKey(doc.state.clone()));
        }
        let mut docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        if docs.contains_key(&doc.state) {
            return Err(StoreError::AlreadyExists(doc.state.clone()));
        }
        let mut stored = doc.clone();
        stored.version = 1;
        docs.insert(stored.state.clone(), stored);
        Ok(1)
    }

    fn replace_state(&self, doc: &StateGroup) -> Result<u64, StoreError> {
        self.ensure_open()?;
        let mut docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        let current = docs
            .get_mut(&doc.state)
            .ok_or_else(|| StoreError::NotFound(doc.state.clone()))?;
        if current.version != doc.version {
            return Err(StoreError::Conflict {
                state: doc.state.clone(),
                expected: doc.version,
                found: current.version,
            });
        }
        let mut stored = doc.clone();
        stored.version = doc.version + 1;
        *current = stored;
        Ok(doc.version + 1)
    }

    fn list_states(&self) -> Result<Vec<String>, StoreError> {
        self.ensure_open()?;
        let docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(docs.keys().cloned().collect())
    }

    fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn doc(state: &str) -> StateGroup {
        StateGroup {
            state: state.to_string(),
            commodities: Vec::new(),
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn insert_then_replace_bumps_version() {
        let store = MemoryStore::open();
        assert_eq!(store.insert_state(&doc("Kerala")).unwrap(), 1);

        let loaded = store.find_state("Kerala").unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(store.replace_state(&loaded).unwrap(), 2);
    }

    #[test]
    fn stale_replace_is_a_conflict() {
        let store = MemoryStore::open();
        store.insert_state(&doc("Kerala")).unwrap();
        let first = store.find_state("Kerala").unwrap().unwrap();
        let second = first.clone();

        store.replace_state(&first).unwrap();
        let err = store.replace_state(&second).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 1, found: 2, .. }));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let store = MemoryStore::open();
        store.insert_state(&doc("Kerala")).unwrap();
        assert!(matches!(
            store.insert_state(&doc("Kerala")),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn closed_store_refuses_work() {
        let store = MemoryStore::open();
        store.close().unwrap();
        assert!(!store.is_open());
        assert!(matches!(store.list_states(), Err(StoreError::Closed)));
        assert!(matches!(store.find_state("Kerala"), Err(StoreError::Closed)));
    }
}
