//! Reporting utilities: run summaries and query views for the terminal.

pub mod format;

pub use format::{format_ingest_json, format_ingest_report, format_query_view, format_records_table};
