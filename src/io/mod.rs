//! Input normalization helpers.
//!
//! - arrival-date parsing (`date`)
//! - required-field validation + observation building (`ingest`)

pub mod date;
pub mod ingest;

pub use date::*;
pub use ingest::*;
