//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - loosely typed upstream records (`RawRecord`, `RawDate`, `RawNumber`)
//! - validated observations (`PriceObservation`)
//! - the stored per-state hierarchy (`StateGroup` and its children)

pub mod types;

pub use types::*;
