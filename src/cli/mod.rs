//! Command-line parsing for the mandi price ingester.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the ingestion and storage code.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::query::QueryPath;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "mandi", version, about = "Daily mandi commodity price ingester and browser")]
pub struct Cli {
    /// Directory holding one JSON document per state (overrides DATA_DIR).
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch every page once, merge into the store, and print the counts.
    Ingest(IngestArgs),
    /// Run an ingestion now and then every interval until killed.
    Watch(WatchArgs),
    /// Print states, commodities, markets, or records.
    Query(QueryArgs),
    /// Launch the interactive browser.
    ///
    /// Drill down state -> commodity -> market and chart the retained prices.
    Tui(TuiArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// The upstream open-data API (needs API_KEY).
    Api,
    /// Deterministic generated records, no network.
    Sample,
}

/// Where records come from and how pages are requested.
#[derive(Debug, Args, Clone)]
pub struct SourceArgs {
    #[arg(long, value_enum, default_value_t = SourceKind::Api)]
    pub source: SourceKind,

    /// Records requested per page (overrides PAGE_SIZE).
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Give up after this many non-empty pages (overrides MAX_PAGES).
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Sample source: last arrival date (defaults to today, UTC).
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub sample_end_date: Option<NaiveDate>,

    /// Sample source: number of days generated.
    #[arg(long, default_value_t = 5)]
    pub sample_days: u32,

    /// Sample source: random seed.
    #[arg(long, default_value_t = 42)]
    pub sample_seed: u64,

    /// Sample source: share of deliberately broken records.
    #[arg(long, default_value_t = 0.02)]
    pub sample_defect_rate: f64,
}

#[derive(Debug, Args, Clone)]
pub struct IngestArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Print `{"message","successCount","failureCount"}` instead of the summary.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Minutes between runs (overrides INGEST_INTERVAL_MINS).
    #[arg(long)]
    pub interval_mins: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct QueryArgs {
    /// `/`, `/state/<s>`, `/state/<s>/commodity/<c>` or `/state/<s>/commodity/<c>/market/<m>`.
    #[arg(default_value = "/")]
    pub path: QueryPath,

    /// Print the view as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct TuiArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Also run ingestion in the background every interval.
    #[arg(long)]
    pub watch: bool,

    /// Minutes between background runs (overrides INGEST_INTERVAL_MINS).
    #[arg(long)]
    pub interval_mins: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_flags_parse() {
        let cli = Cli::parse_from([
            "mandi",
            "--data-dir",
            "/tmp/mandi",
            "ingest",
            "--source",
            "sample",
            "--sample-days",
            "3",
            "--json",
        ]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/mandi")));
        let Command::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };
        assert!(args.json);
        assert_eq!(args.source.source, SourceKind::Sample);
        assert_eq!(args.source.sample_days, 3);
        assert_eq!(args.source.page_size, None);
    }

    #[test]
    fn query_path_defaults_to_root() {
        let cli = Cli::parse_from(["mandi", "query"]);
        let Command::Query(args) = cli.command else {
            panic!("expected query");
        };
        assert_eq!(args.path, QueryPath::Root);
    }

    #[test]
    fn bad_query_path_is_a_usage_error() {
        assert!(Cli::try_parse_from(["mandi", "query", "/markets"]).is_err());
    }

    #[test]
    fn global_data_dir_after_subcommand() {
        let cli = Cli::parse_from(["mandi", "watch", "--interval-mins", "5", "--data-dir", "d"]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("d")));
        let Command::Watch(args) = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(args.interval_mins, Some(5));
    }
}
