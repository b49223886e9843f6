//! Directory-backed document store: one pretty-printed JSON file per state.
//!
//! File names are the state name with every byte outside `[A-Za-z0-9_-]`
//! percent-encoded, so `Uttar Pradesh` lives in `Uttar%20Pradesh.json`.
//! Writes go to a uniquely named temp file in the same directory, are synced,
//! then renamed over the target. Every write holds an exclusive advisory lock
//! on `<state>.lock` for the whole read, version check and rename, so handles
//! in other processes sharing the directory serialize on it too.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use fs2::FileExt;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::domain::StateGroup;
use crate::error::StoreError;
use crate::store::StateStore;

const EXTENSION: &str = "json";
const LOCK_EXTENSION: &str = "lock";

#[derive(Debug)]
pub struct JsonDirStore {
    dir: PathBuf,
    closed: AtomicBool,
}

impl JsonDirStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), "Opened JSON document store");
        Ok(Self {
            dir,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn path_for(&self, state: &str) -> Result<PathBuf, StoreError> {
        if state.is_empty() {
            return Err(StoreError::InvalidKey(state.to_string()));
        }
        Ok(self.dir.join(format!("{}.{EXTENSION}", encode_key(state))))
    }

    /// Block until this process holds the state's write lock. Released when
    /// the returned file is dropped.
    fn lock_state(&self, path: &Path) -> Result<File, StoreError> {
        let lock_path = path.with_extension(LOCK_EXTENSION);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        file.lock_exclusive()?;
        Ok(file)
    }

    fn read_doc(&self, path: &Path) -> Result<Option<StateGroup>, StoreError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let doc = serde_json::from_reader(BufReader::new(file))?;
        Ok(Some(doc))
    }

    fn temp_doc(&self, doc: &StateGroup) -> Result<NamedTempFile, StoreError> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), doc)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }

    fn write_doc(&self, path: &Path, doc: &StateGroup) -> Result<(), StoreError> {
        self.temp_doc(doc)?.persist(path).map_err(|e| e.error)?;
        debug!(state = %doc.state, version = doc.version, path = %path.display(), "Wrote state document");
        Ok(())
    }
}

impl StateStore for JsonDirStore {
    fn find_state(&self, state: &str) -> Result<Option<StateGroup>, StoreError> {
        self.ensure_open()?;
        let path = self.path_for(state)?;
        self.read_doc(&path)
    }

    fn insert_state(&self, doc: &StateGroup) -> Result<u64, StoreError> {
        self.ensure_open()?;
        let path = self.path_for(&doc.state)?;
        let _lock = self.lock_state(&path)?;
        let mut stored = doc.clone();
        stored.version = 1;
        // No-clobber rename: an existing document is never replaced here.
        match self.temp_doc(&stored)?.persist_noclobber(&path) {
            Ok(_) => {}
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(doc.state.clone()));
            }
            Err(e) => return Err(e.error.into()),
        }
        debug!(state = %stored.state, path = %path.display(), "Created state document");
        Ok(1)
    }

    fn replace_state(&self, doc: &StateGroup) -> Result<u64, StoreError> {
        self.ensure_open()?;
        let path = self.path_for(&doc.state)?;
        let _lock = self.lock_state(&path)?;
        let current = self
            .read_doc(&path)?
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
        self.write_doc(&path, &stored)?;
        Ok(stored.version)
    }

    fn list_states(&self) -> Result<Vec<String>, StoreError> {
        self.ensure_open()?;
        let mut states = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match decode_key(stem) {
                Some(state) => states.push(state),
                None => warn!(path = %path.display(), "Skipping file with undecodable name"),
            }
        }
        states.sort();
        Ok(states)
    }

    fn close(&self) -> Result<(), StoreError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(dir = %self.dir.display(), "Closed JSON document store");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }
}

fn encode_key(state: &str) -> String {
    let mut out = String::with_capacity(state.len());
    for b in state.bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Undo `%XX` escapes. `None` on a truncated escape or non-UTF-8 result.
pub(crate) fn decode_key(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, Utc};
    use tempfile::TempDir;

    use super::*;
    use crate::domain::{PriceObservation, PriceRecord};
    use crate::store::PriceStore;

    fn obs(state: &str, market: &str) -> PriceObservation {
        PriceObservation {
            state: state.to_string(),
            commodity: "Onion".to_string(),
            market: market.to_string(),
            record: PriceRecord {
                arrival_date: NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
                district: "Nashik".to_string(),
                variety: "Red".to_string(),
                grade: "FAQ".to_string(),
                min_price: 1800.0,
                max_price: 2400.0,
                modal_price: 2200.0,
            },
        }
    }

    fn doc(state: &str) -> StateGroup {
        StateGroup::seeded(&obs(state, "Lasalgaon"), Utc::now())
    }

    #[test]
    fn keys_round_trip_through_file_names() {
        for state in ["Kerala", "Uttar Pradesh", "Jammu & Kashmir", "Tamil_Nadu", "Dadra/Nagar"] {
            let encoded = encode_key(state);
            assert!(!encoded.contains('/') && !encoded.contains(' '));
            assert_eq!(decode_key(&encoded).as_deref(), Some(state));
        }
        assert_eq!(decode_key("bad%2"), None);
    }

    #[test]
    fn documents_persist_across_handles() {
        let tmp = TempDir::new().unwrap();
        let store = JsonDirStore::open(tmp.path()).unwrap();
        store.insert_state(&doc("Uttar Pradesh")).unwrap();
        store.insert_state(&doc("Maharashtra")).unwrap();
        store.close().unwrap();

        let reopened = JsonDirStore::open(tmp.path()).unwrap();
        assert_eq!(
            reopened.list_states().unwrap(),
            vec!["Maharashtra".to_string(), "Uttar Pradesh".to_string()]
        );
        let loaded = reopened.find_state("Uttar Pradesh").unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.commodities[0].markets[0].records.len(), 1);
        assert!(tmp.path().join("Uttar%20Pradesh.json").exists());
    }

    #[test]
    fn replace_checks_version() {
        let tmp = TempDir::new().unwrap();
        let store = JsonDirStore::open(tmp.path()).unwrap();
        store.insert_state(&doc("Kerala")).unwrap();

        let a = store.find_state("Kerala").unwrap().unwrap();
        let b = a.clone();
        assert_eq!(store.replace_state(&a).unwrap(), 2);
        assert!(matches!(store.replace_state(&b), Err(StoreError::Conflict { .. })));
        assert!(matches!(store.insert_state(&b), Err(StoreError::AlreadyExists(_))));
    }

    #[test]
    fn missing_state_is_none_and_replace_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = JsonDirStore::open(tmp.path()).unwrap();
        assert!(store.find_state("Goa").unwrap().is_none());
        assert!(matches!(store.replace_state(&doc("Goa")), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn closed_store_refuses_work() {
        let tmp = TempDir::new().unwrap();
        let store = JsonDirStore::open(tmp.path()).unwrap();
        store.close().unwrap();
        assert!(matches!(store.insert_state(&doc("Goa")), Err(StoreError::Closed)));
    }

    #[test]
    fn second_handle_cannot_recreate_a_state() {
        let tmp = TempDir::new().unwrap();
        let a = JsonDirStore::open(tmp.path()).unwrap();
        let b = JsonDirStore::open(tmp.path()).unwrap();
        a.insert_state(&doc("Kerala")).unwrap();

        assert!(matches!(b.insert_state(&doc("Kerala")), Err(StoreError::AlreadyExists(_))));
        let stale = b.find_state("Kerala").unwrap().unwrap();
        assert_eq!(a.replace_state(&stale).unwrap(), 2);
        assert!(matches!(b.replace_state(&stale), Err(StoreError::Conflict { found: 2, .. })));
    }

    #[test]
    fn separate_handles_writing_one_state_lose_nothing() {
        const WRITERS: usize = 6;
        const MARKETS_EACH: usize = 5;

        let tmp = TempDir::new().unwrap();
        std::thread::scope(|scope| {
            for w in 0..WRITERS {
                let dir = tmp.path();
                scope.spawn(move || {
                    // Each writer owns its handle, as separate processes would.
                    let store: Arc<dyn StateStore> = Arc::new(JsonDirStore::open(dir).unwrap());
                    let prices = PriceStore::new(store);
                    for m in 0..MARKETS_EACH {
                        let o = obs("Kerala", &format!("M{w}-{m}"));
                        loop {
                            match prices.upsert(&o) {
                                Ok(_) => break,
                                Err(StoreError::Conflict { .. } | StoreError::AlreadyExists(_)) => continue,
                                Err(e) => panic!("writer {w}: {e}"),
                            }
                        }
                    }
                });
            }
        });

        let store = JsonDirStore::open(tmp.path()).unwrap();
        let kerala = store.find_state("Kerala").unwrap().unwrap();
        let mut markets: Vec<_> = kerala.commodities[0].markets.iter().map(|m| m.market.clone()).collect();
        markets.sort();
        let mut expected: Vec<_> = (0..WRITERS)
            .flat_map(|w| (0..MARKETS_EACH).map(move |m| format!("M{w}-{m}")))
            .collect();
        expected.sort();
        assert_eq!(markets, expected);
        assert_eq!(kerala.version, (WRITERS * MARKETS_EACH) as u64);
        assert_eq!(store.list_states().unwrap(), vec!["Kerala".to_string()]);
    }

    #[test]
    fn ignores_foreign_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("mandi.log"), "log line").unwrap();
        let store = JsonDirStore::open(tmp.path()).unwrap();
        store.insert_state(&doc("Kerala")).unwrap();
        assert_eq!(store.list_states().unwrap(), vec!["Kerala".to_string()]);
    }
}
