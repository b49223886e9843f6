//! Paginated fetch loop.
//!
//! `fetch_all` walks a `PageSource` from offset 0 until a page comes back
//! empty, advancing by the number of records actually returned so short pages
//! are fine. A single failed page aborts the whole fetch.

use tracing::{debug, info};

use crate::domain::RawRecord;
use crate::error::FetchError;

/// Upstream maximum page size.
pub const DEFAULT_PAGE_SIZE: usize = 4999;

/// Safety cap on pages per fetch.
pub const DEFAULT_MAX_PAGES: usize = 1000;

/// Anything that can serve one page of raw records.
pub trait PageSource {
    /// Fetch up to `limit` records starting at `offset`.
    ///
    /// `Ok(None)` and `Ok(Some(vec![]))` both mean "no more data".
    fn fetch_page(&self, offset: usize, limit: usize) -> Result<Option<Vec<RawRecord>>, FetchError>;

    /// Human-readable name for logs.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub page_size: usize,
    /// Maximum number of non-empty pages before giving up.
    pub max_pages: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

/// Fetch every page into one batch.
pub fn fetch_all(source: &dyn PageSource, options: FetchOptions) -> Result<Vec<RawRecord>, FetchError> {
    let page_size = options.page_size.max(1);
    let mut offset = 0usize;
    let mut pages = 0usize;
    let mut all = Vec::new();

    loop {
        if pages >= options.max_pages {
            return Err(FetchError::FetchLimitExceeded {
                max_pages: options.max_pages,
                records: all.len(),
            });
        }

        debug!(source = %source.describe(), offset, limit = page_size, "Fetching page");
        let records = match source.fetch_page(offset, page_size)? {
            Some(records) if !records.is_empty() => records,
            _ => {
                info!(total = all.len(), pages, "No more records to fetch");
                break;
            }
        };

        pages += 1;
        offset += records.len();
        all.extend(records);
        info!(page = pages, offset, total = all.len(), "Fetched page");
    }

    Ok(all)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    /// Serves pre-sized pages and remembers every request.
    struct ScriptedPages {
        pages: Vec<Result<usize, String>>,
        pub requests: RefCell<Vec<(usize, usize)>>,
    }

    impl ScriptedPages {
        fn new(sizes: &[usize]) -> Self {
            Self {
                pages: sizes.iter().map(|&n| Ok(n)).collect(),
                requests: RefCell::new(Vec::new()),
            }
        }

        fn failing_at(sizes: &[usize], fail_index: usize) -> Self {
            let mut pages: Vec<Result<usize, String>> = sizes.iter().map(|&n| Ok(n)).collect();
            pages.insert(fail_index, Err("connection reset".to_string()));
            Self {
                pages,
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl PageSource for ScriptedPages {
        fn fetch_page(&self, offset: usize, limit: usize) -> Result<Option<Vec<RawRecord>>, FetchError> {
            let index = self.requests.borrow().len();
            self.requests.borrow_mut().push((offset, limit));
            match self.pages.get(index) {
                None => Ok(None),
                Some(Err(reason)) => Err(FetchError::FetchFailed {
                    offset,
                    reason: reason.clone(),
                }),
                Some(Ok(n)) => Ok(Some(vec![RawRecord::default(); (*n).min(limit)])),
            }
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    #[test]
    fn stops_on_empty_page_and_advances_by_returned_count() {
        let source = ScriptedPages::new(&[4999, 4999, 12, 0]);
        let records = fetch_all(&source, FetchOptions::default()).unwrap();

        assert_eq!(records.len(), 10010);
        let requests = source.requests.borrow();
        assert_eq!(requests.len(), 4);
        assert_eq!(
            requests.iter().map(|(offset, _)| *offset).collect::<Vec<_>>(),
            vec![0, 4999, 9998, 10010]
        );
        assert!(requests.iter().all(|(_, limit)| *limit == DEFAULT_PAGE_SIZE));
    }

    #[test]
    fn absent_page_ends_fetch() {
        // Only two pages scripted; the third request yields `None`.
        let source = ScriptedPages::new(&[3, 2]);
        let options = FetchOptions {
            page_size: 3,
            max_pages: 10,
        };
        let records = fetch_all(&source, options).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(source.requests.borrow().len(), 3);
    }

    #[test]
    fn error_discards_accumulated_records() {
        let source = ScriptedPages::failing_at(&[10, 10, 0], 1);
        let err = fetch_all(&source, FetchOptions::default()).unwrap_err();
        assert!(matches!(err, FetchError::FetchFailed { offset: 10, .. }));
    }

    #[test]
    fn page_cap_stops_runaway_upstream() {
        let source = ScriptedPages::new(&[5, 5, 5, 5, 5]);
        let options = FetchOptions {
            page_size: 5,
            max_pages: 3,
        };
        let err = fetch_all(&source, options).unwrap_err();
        assert!(matches!(
            err,
            FetchError::FetchLimitExceeded {
                max_pages: 3,
                records: 15
            }
        ));
        assert_eq!(source.requests.borrow().len(), 3);
    }

    #[test]
    fn cap_counts_only_non_empty_pages() {
        let source = ScriptedPages::new(&[5, 5, 5]);
        let options = FetchOptions {
            page_size: 5,
            max_pages: 3,
        };
        // Three full pages, then the cap forbids the terminating request.
        assert!(fetch_all(&source, options).is_err());

        let source = ScriptedPages::new(&[5, 5, 0]);
        assert_eq!(fetch_all(&source, options).unwrap().len(), 10);
    }
}
