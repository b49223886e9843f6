//! Error types.
//!
//! Library code returns the typed enums below; the binary boundary converts
//! them into `AppError`, which carries the process exit code.
//!
//! Exit codes:
//! - 2: configuration / usage
//! - 3: document store
//! - 4: upstream fetch / terminal

use std::io;

use thiserror::Error;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Why a single raw record was rejected. Never fatal to a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid arrival date '{0}'")]
    InvalidDate(String),

    #[error("invalid `{field}` value '{value}'")]
    InvalidPrice { field: &'static str, value: String },
}

impl RecordError {
    /// Short stable label used for per-kind failure tallies.
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::MissingField(_) => "missing_field",
            RecordError::InvalidDate(_) => "invalid_date",
            RecordError::InvalidPrice { .. } => "invalid_price",
        }
    }
}

/// Fatal to the current run; the next trigger retries from scratch.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("fetch failed at offset {offset}: {reason}")]
    FetchFailed { offset: usize, reason: String },

    #[error("upstream still returning data after {max_pages} pages ({records} records); giving up")]
    FetchLimitExceeded { max_pages: usize, records: usize },
}

/// Document store failures (`PersistenceFailed` in the pipeline's terms).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("document serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("state '{state}' was modified concurrently (expected version {expected}, found {found})")]
    Conflict {
        state: String,
        expected: u64,
        found: u64,
    },

    #[error("state '{0}' already exists")]
    AlreadyExists(String),

    #[error("state '{0}' does not exist")]
    NotFound(String),

    #[error("invalid state key '{0}'")]
    InvalidKey(String),

    #[error("store is closed")]
    Closed,
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Io(_) => "store_io",
            StoreError::Serialization(_) => "store_serialization",
            StoreError::Conflict { .. } => "store_conflict",
            StoreError::AlreadyExists(_) => "store_already_exists",
            StoreError::NotFound(_) => "store_not_found",
            StoreError::InvalidKey(_) => "store_invalid_key",
            StoreError::Closed => "store_closed",
        }
    }
}

/// Any per-record failure during a run.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("persistence failed: {0}")]
    PersistenceFailed(#[from] StoreError),
}

impl IngestError {
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Record(err) => err.kind(),
            IngestError::PersistenceFailed(err) => err.kind(),
        }
    }
}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        AppError::new(4, err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::new(3, err.to_string())
    }
}
