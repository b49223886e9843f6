//! Upstream data sources.
//!
//! - `fetch`: the paginated fetch loop and the `PageSource` seam
//! - `agmarknet`: blocking HTTP page source for the open-data API
//! - `sample`: seeded synthetic page source

pub mod agmarknet;
pub mod fetch;
pub mod sample;

pub use agmarknet::MandiClient;
pub use fetch::{FetchOptions, PageSource, fetch_all};
pub use sample::{SampleConfig, SamplePages};
