//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and loads settings
//! - opens the document store and hands it to the pipeline
//! - dispatches to ingest / watch / query / tui
//! - closes the store on the way out

use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tracing::{error, info};

use crate::cli::{Command, IngestArgs, QueryArgs, SourceArgs, SourceKind, TuiArgs, WatchArgs};
use crate::config::Settings;
use crate::data::{MandiClient, PageSource, SampleConfig, SamplePages};
use crate::error::AppError;
use crate::query::QueryService;
use crate::scheduler::IntervalScheduler;
use crate::store::{JsonDirStore, StateStore};

pub mod pipeline;

use pipeline::Orchestrator;

/// Entry point for the `mandi` binary.
pub fn run() -> Result<(), AppError> {
    // We want `mandi` and `mandi --data-dir d` to behave like `mandi tui ...`.
    //
    // Clap requires a subcommand name, so we do a small, explicit rewrite of the
    // argv list before parsing.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    let mut settings = Settings::from_env()?;
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }

    match cli.command {
        Command::Ingest(args) => handle_ingest(settings, args),
        Command::Watch(args) => handle_watch(settings, args),
        Command::Query(args) => handle_query(settings, args),
        Command::Tui(args) => handle_tui(settings, args),
    }
}

/// Everything needed to build a fresh page source for one run.
#[derive(Debug, Clone)]
pub struct SourceSpec {
    settings: Settings,
    args: SourceArgs,
}

impl SourceSpec {
    pub fn new(settings: Settings, args: SourceArgs) -> Self {
        Self { settings, args }
    }

    pub fn build(&self) -> Result<Box<dyn PageSource>, AppError> {
        match self.args.source {
            SourceKind::Api => Ok(Box::new(MandiClient::from_settings(&self.settings)?)),
            SourceKind::Sample => {
                let config = SampleConfig {
                    end_date: self
                        .args
                        .sample_end_date
                        .unwrap_or_else(|| Utc::now().date_naive()),
                    days: self.args.sample_days,
                    seed: self.args.sample_seed,
                    defect_rate: self.args.sample_defect_rate,
                };
                Ok(Box::new(SamplePages::generate(&config)?))
            }
        }
    }
}

/// Apply per-command overrides on top of the environment.
fn apply_overrides(
    mut settings: Settings,
    source: &SourceArgs,
    interval_mins: Option<u64>,
) -> Result<Settings, AppError> {
    if let Some(page_size) = source.page_size {
        settings.page_size = page_size;
    }
    if let Some(max_pages) = source.max_pages {
        settings.max_pages = max_pages;
    }
    if let Some(interval_mins) = interval_mins {
        settings.interval_mins = interval_mins;
    }
    settings.validate()?;
    Ok(settings)
}

fn open_store(settings: &Settings) -> Result<Arc<dyn StateStore>, AppError> {
    let store = JsonDirStore::open(settings.data_dir.clone())?;
    Ok(Arc::new(store))
}

/// Run `body`, then close the store even if `body` failed.
fn with_store<T>(
    store: &Arc<dyn StateStore>,
    body: impl FnOnce() -> Result<T, AppError>,
) -> Result<T, AppError> {
    let result = body();
    store.close()?;
    result
}

fn handle_ingest(settings: Settings, args: IngestArgs) -> Result<(), AppError> {
    crate::logging::init_stderr(crate::logging::DEFAULT_LEVEL);
    let settings = apply_overrides(settings, &args.source, None)?;
    let spec = SourceSpec::new(settings.clone(), args.source);
    let store = open_store(&settings)?;

    with_store(&store, || {
        let orchestrator = Orchestrator::new(Arc::clone(&store), settings.fetch_options());
        let source = spec.build()?;
        let report = orchestrator.run(source.as_ref())?;

        if args.json {
            println!("{}", crate::report::format_ingest_json(&report));
        } else {
            println!("{}", crate::report::format_ingest_report(&report));
        }
        Ok(())
    })
}

fn handle_watch(settings: Settings, args: WatchArgs) -> Result<(), AppError> {
    crate::logging::init_stderr(crate::logging::DEFAULT_LEVEL);
    let settings = apply_overrides(settings, &args.source, args.interval_mins)?;
    let spec = SourceSpec::new(settings.clone(), args.source);
    let store = open_store(&settings)?;
    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&store), settings.fetch_options()));

    info!(interval_mins = settings.interval_mins, "Watching for commodity data updates");
    with_store(&store, || {
        let job_orchestrator = Arc::clone(&orchestrator);
        let scheduler = IntervalScheduler::spawn("mandi-watch", settings.interval(), move || {
            run_once(&job_orchestrator, &spec);
        })?;
        scheduler.wait();
        Ok(())
    })
}

/// One scheduled run. Failures are logged; the next tick retries.
fn run_once(orchestrator: &Orchestrator, spec: &SourceSpec) {
    let source = match spec.build() {
        Ok(source) => source,
        Err(err) => {
            error!(error = %err, "Could not build page source");
            return;
        }
    };
    if let Ok(report) = orchestrator.run(source.as_ref()) {
        println!("{}", crate::report::format_ingest_json(&report));
    }
}

fn handle_query(settings: Settings, args: QueryArgs) -> Result<(), AppError> {
    crate::logging::init_stderr("warn");
    let store = open_store(&settings)?;

    with_store(&store, || {
        let query = QueryService::new(Arc::clone(&store));
        let view = query.query_by_path(&args.path)?;
        if args.json {
            let json = serde_json::to_string_pretty(&view)
                .map_err(|e| AppError::new(4, format!("Failed to encode view: {e}")))?;
            println!("{json}");
        } else {
            print!("{}", crate::report::format_query_view(&view));
        }
        Ok(())
    })
}

fn handle_tui(settings: Settings, args: TuiArgs) -> Result<(), AppError> {
    let settings = apply_overrides(settings, &args.source, args.interval_mins)?;
    crate::logging::init_file(&settings.log_path(), crate::logging::DEFAULT_LEVEL)?;
    let spec = SourceSpec::new(settings.clone(), args.source);
    let store = open_store(&settings)?;

    with_store(&store, || {
        let context = crate::tui::TuiContext {
            orchestrator: Arc::new(Orchestrator::new(Arc::clone(&store), settings.fetch_options())),
            query: QueryService::new(Arc::clone(&store)),
            source: spec,
            background_interval: args.watch.then(|| settings.interval()),
        };
        crate::tui::run(context)
    })
}

/// Rewrite argv so `mandi` defaults to `mandi tui`.
///
/// Rules:
/// - `mandi`                        -> `mandi tui`
/// - `mandi --data-dir d`           -> `mandi tui --data-dir d`
/// - `mandi --help/--version/-h`    -> unchanged (show top-level help/version)
/// - anything naming a subcommand   -> unchanged
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    if argv.len() < 2 {
        argv.push("tui".to_string());
        return argv;
    }

    let names_command = argv[1..].iter().any(|arg| {
        matches!(
            arg.as_str(),
            "-h" | "--help" | "-V" | "--version" | "help" | "ingest" | "watch" | "query" | "tui"
        )
    });
    if names_command {
        return argv;
    }

    argv.insert(1, "tui".to_string());
    argv
}
