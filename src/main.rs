//! Media Catalog CLI
//!
//! Incremental media scanner that keeps a content-addressed SQLite catalog.

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use media_catalog::{
    format_file_size, EntryId, ProgressReporter, ScanConfig, ScanOrchestrator, ScanReport,
    SqliteCatalog,
};

const ABOUT: &str = r#"
Media Catalog - incremental media scanner

Examples:
  media_catalog scan -r /path/to/media            Scan a directory (incremental)
  media_catalog scan -r /media --full             Re-hash every file
  media_catalog scan -r /media --no-recursive     Only the top-level directory
  media_catalog scan -r /media --hidden           Include dot files
  media_catalog scan --config scan.json --json    Load options, print JSON
  media_catalog rescan                            Re-hash entries modified on disk
  media_catalog verify 42                         Check entry 42 against its file
  media_catalog --db library.db stats             Catalog summary
"#;

/// Progress messages are throttled to this interval
const PROGRESS_INTERVAL_MS: u64 = 200;

#[derive(Parser)]
#[command(name = "media_catalog")]
#[command(author, version, about = ABOUT, long_about = None)]
struct Cli {
    /// SQLite catalog file
    #[arg(short = 'd', long, global = true, default_value = "media_catalog.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a directory into the catalog
    Scan {
        /// Root directory to scan
        #[arg(short = 'r', long)]
        root: Option<PathBuf>,

        /// Only scan the root directory itself
        #[arg(long)]
        no_recursive: bool,

        /// Include hidden files and directories
        #[arg(long)]
        hidden: bool,

        /// Re-hash and reconcile every file, even unchanged ones
        #[arg(long)]
        full: bool,

        /// Hash worker threads (0 = auto-detect)
        #[arg(short = 'w', long)]
        workers: Option<usize>,

        /// Files per catalog transaction
        #[arg(short = 'b', long)]
        batch_size: Option<usize>,

        /// JSON file with scan options; command-line flags take precedence
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Emit JSON-lines progress on stderr
        #[arg(long)]
        progress: bool,
    },

    /// Re-hash catalog entries whose files changed on disk
    Rescan {
        #[arg(long)]
        json: bool,

        #[arg(long)]
        progress: bool,
    },

    /// Check that an entry's file still matches its stored digest
    Verify {
        /// Catalog entry id
        id: i64,
    },

    /// Show catalog totals
    Stats,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("{}", ABOUT);
        println!("Use 'media_catalog --help' for the full option list");
        return ExitCode::SUCCESS;
    };

    match run(cli.db, command) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(db: PathBuf, command: Commands) -> Result<ExitCode, Box<dyn Error>> {
    match command {
        Commands::Scan {
            root,
            no_recursive,
            hidden,
            full,
            workers,
            batch_size,
            config,
            json,
            progress,
        } => {
            let base = match config {
                Some(path) => ScanConfig::from_json_file(&path)?,
                None => ScanConfig::default(),
            };
            let mut builder = media_catalog::config::ScanConfigBuilder::from_config(base);
            if let Some(root) = root {
                builder = builder.root(root);
            }
            if no_recursive {
                builder = builder.recursive(false);
            }
            if hidden {
                builder = builder.include_hidden(true);
            }
            if full {
                builder = builder.incremental(false);
            }
            if let Some(workers) = workers {
                builder = builder.workers(workers);
            }
            if let Some(batch_size) = batch_size {
                builder = builder.batch_size(batch_size);
            }
            let config = builder.build();
            if config.root.as_os_str().is_empty() {
                return Err("no root directory given (use -r or a config file)".into());
            }
            let db_path = config.db_path.clone().unwrap_or(db);

            info!("Catalog: {:?}", db_path);
            info!("Workers: {}", config.effective_workers());
            info!("Batch size: {}", config.effective_batch_size());

            let reporter = Arc::new(ProgressReporter::new(progress, PROGRESS_INTERVAL_MS));
            reporter.report_start(&config);

            let catalog = SqliteCatalog::open(&db_path)?;
            let mut scanner = ScanOrchestrator::from_config(catalog, &config)?
                .with_progress(ProgressReporter::callback(Arc::clone(&reporter)));
            let report = scanner.scan_directory(
                &config.root,
                config.recursive,
                config.include_hidden,
                config.incremental,
            )?;
            scanner.shutdown();

            finish(&reporter, &report, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Rescan { json, progress } => {
            let config = ScanConfig::default();
            let reporter = Arc::new(ProgressReporter::new(progress, PROGRESS_INTERVAL_MS));

            let catalog = SqliteCatalog::open(&db)?;
            let mut scanner = ScanOrchestrator::from_config(catalog, &config)?
                .with_progress(ProgressReporter::callback(Arc::clone(&reporter)));
            let report = scanner.rescan_modified()?;
            scanner.shutdown();

            finish(&reporter, &report, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Verify { id } => {
            let catalog = SqliteCatalog::open(&db)?;
            let scanner = ScanOrchestrator::from_config(catalog, &ScanConfig::default())?;
            let id = EntryId(id);
            let ok = scanner.verify_integrity(id);
            scanner.shutdown();

            if ok {
                println!("{}: OK", id);
                Ok(ExitCode::SUCCESS)
            } else {
                println!("{}: FAILED", id);
                Ok(ExitCode::from(1))
            }
        }
        Commands::Stats => {
            let catalog = SqliteCatalog::open(&db)?;
            let total = catalog.entry_count()?;
            let unprocessed = catalog.unprocessed_entries()?.len();
            let mut counts: Vec<_> = catalog.media_type_counts()?.into_iter().collect();
            counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.as_str().cmp(b.0.as_str())));
            let total_size: u64 = media_catalog::Catalog::entries(&catalog)?
                .iter()
                .map(|e| e.size)
                .sum();

            println!("Catalog {:?}:", db);
            println!("  Entries: {}", total);
            println!("  Total size: {}", format_file_size(total_size));
            println!("  Awaiting metadata: {}", unprocessed);
            for (media_type, count) in counts {
                println!("  {:<10} {}", media_type.as_str(), count);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn finish(reporter: &ProgressReporter, report: &ScanReport, json: bool) -> Result<(), Box<dyn Error>> {
    for message in &report.errors {
        reporter.report_error(message);
    }
    reporter.report_done(report);

    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}
