//! usgmon - directory usage monitor.
//!
//! Usage:
//!   usgmon serve                     Run the monitoring daemon
//!   usgmon scan <PATH> [--depth N]   One-shot scan
//!   usgmon query <DIR>               Usage history of one directory
//!   usgmon top <BASE>                Largest changes under a base path
//!   usgmon --help                    Show help

mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail, eyre};
use serde::Serialize;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use usgmon_core::{
    BatchScan, Config, ScanResult, StrategyKind, UsageRecord, format_duration, parse_duration,
};
use usgmon_daemon::{Daemon, DaemonOptions};
use usgmon_scan::{ScanOptions, Scanner};
use usgmon_store::{ChangeDirection, QueryOptions, SqliteStore, TopChangerOptions, UsageStore};

#[derive(Parser)]
#[command(
    name = "usgmon",
    version,
    about = "Directory usage monitor",
    long_about = "usgmon periodically measures the size of directories at a fixed depth \
                  under each monitored path and keeps the history for trend analysis.\n\n\
                  Run `usgmon serve` as a daemon, or use the other subcommands for \
                  one-shot scans and history queries."
)]
struct Cli {
    /// Configuration file (default: /etc/usgmon/usgmon.toml, then the user
    /// config directory, then ./usgmon.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level or filter directive (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitoring daemon until SIGINT or SIGTERM
    Serve,

    /// One-shot scan of a directory
    Scan {
        /// Directory to scan
        path: PathBuf,

        /// Depth of the directories to measure (0 = the path itself)
        #[arg(short, long, default_value = "0")]
        depth: u32,

        /// Concurrent measurements (default: from config)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Size strategy: auto, xattr, du, walk (default: from config)
        #[arg(short, long)]
        strategy: Option<StrategyKind>,

        /// Descend through symlinks to directories
        #[arg(long)]
        follow_symlinks: bool,

        /// Glob of directory names or relative paths to skip (repeatable)
        #[arg(short, long)]
        exclude: Vec<String>,

        /// Give up after this long and report partial results (e.g., "30s", "10m")
        #[arg(long, default_value = "10m")]
        timeout: String,

        /// Store the results in the database
        #[arg(long)]
        store: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the usage history of a directory
    Query {
        /// Directory to look up
        directory: PathBuf,

        /// Only records from the last N days
        #[arg(long, conflicts_with = "since")]
        days: Option<u32>,

        /// Only records since this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// Maximum number of records to show
        #[arg(short = 'n', long, default_value = "100")]
        limit: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the directories that changed most under a base path
    Top {
        /// Monitored base path
        base_path: PathBuf,

        /// Look back N days from now
        #[arg(long, default_value = "7", conflicts_with = "since")]
        days: u32,

        /// Start of the window (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// End of the window, inclusive (YYYY-MM-DD; default: now)
        #[arg(long)]
        until: Option<String>,

        /// increase, decrease or both
        #[arg(long, default_value = "both")]
        direction: ChangeDirection,

        /// Minimum absolute change (e.g., "100M", "1G")
        #[arg(long, default_value = "0")]
        min_change: String,

        /// Maximum number of directories to show
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).wrap_err("Loading configuration")?;

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    logging::init(level, config.logging.format)?;

    match cli.command {
        Command::Serve => run_serve(config).await?,
        Command::Scan {
            path,
            depth,
            workers,
            strategy,
            follow_symlinks,
            exclude,
            timeout,
            store,
            format,
        } => {
            let scanner = Scanner::with_kind(
                workers.unwrap_or(config.scan.workers),
                strategy.unwrap_or(config.scan.strategy),
            );
            let options = ScanOptions::new(follow_symlinks, &exclude)?;
            let timeout = parse_duration(&timeout)?;
            let scan = run_scan(&scanner, &path, depth, &options, timeout, format).await?;
            if store {
                store_results(&config, &path, &scan)?;
            }
        }
        Command::Query {
            directory,
            days,
            since,
            limit,
            format,
        } => {
            let since = match (days, since) {
                (Some(days), _) => Some(Utc::now() - chrono::Duration::days(i64::from(days))),
                (None, Some(since)) => Some(parse_date(&since)?),
                (None, None) => None,
            };
            let options = QueryOptions {
                since,
                limit: Some(limit),
                ..QueryOptions::for_directory(directory)
            };
            run_query(&config, &options, format)?;
        }
        Command::Top {
            base_path,
            days,
            since,
            until,
            direction,
            min_change,
            limit,
            format,
        } => {
            let until = match until {
                Some(until) => end_of_day(&until)?,
                None => Utc::now(),
            };
            let since = match since {
                Some(since) => parse_date(&since)?,
                None => Utc::now() - chrono::Duration::days(i64::from(days)),
            };
            let options = TopChangerOptions {
                base_path,
                since,
                until,
                direction,
                min_change_bytes: parse_size(&min_change)?,
                limit,
            };
            run_top(&config, &options, format)?;
        }
    }

    Ok(())
}

/// Run the daemon until a termination signal arrives.
async fn run_serve(config: Config) -> Result<()> {
    let store = open_store(&config)?;
    let options = DaemonOptions::from_config(&config);
    let daemon = Daemon::new(config, Arc::new(store), options)?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            shutdown.cancel();
        });
    }

    info!(
        paths = daemon.config().paths.len(),
        database = %daemon.config().database.path.display(),
        "usgmon daemon starting"
    );
    daemon.run(shutdown).await;
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn wait_for_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = interrupt => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// Scan once, print the results sorted by path, and return the scan.
async fn run_scan(
    scanner: &Scanner,
    path: &Path,
    depth: u32,
    options: &ScanOptions,
    timeout: std::time::Duration,
    format: OutputFormat,
) -> Result<BatchScan> {
    let metadata =
        std::fs::metadata(path).wrap_err_with(|| format!("Accessing {}", path.display()))?;
    if !metadata.is_dir() {
        bail!("{} is not a directory", path.display());
    }

    eprintln!("Scanning {} at depth {}...", path.display(), depth);

    let cancel = CancellationToken::new();
    let deadline = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {}
                _ = wait_for_signal() => {}
            }
            cancel.cancel();
        })
    };

    let mut scan = scanner
        .scan_path(path, depth, options, &cancel)
        .await
        .wrap_err("Scan failed")?;
    deadline.abort();
    scan.sort_by_path();

    if scan.cancelled {
        warn!(
            timeout = %format_duration(timeout),
            completed = scan.results.len(),
            "Scan stopped early; results are partial"
        );
    }

    match format {
        OutputFormat::Text => {
            let width = scan
                .results
                .iter()
                .map(|r| r.path.as_os_str().len())
                .max()
                .unwrap_or(0);
            for result in &scan.results {
                match &result.outcome {
                    Ok(size) => {
                        println!("{:<width$}  {}", result.path.display(), format_size(*size))
                    }
                    Err(err) => println!("{:<width$}  (error: {})", result.path.display(), err),
                }
            }
        }
        OutputFormat::Json => {
            let rows: Vec<ScanRow<'_>> = scan.results.iter().map(ScanRow::from).collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }

    Ok(scan)
}

/// Persist the successful results of a one-shot scan as one scan record.
/// A scan cut short by the timeout is recorded as cancelled.
fn store_results(config: &Config, base: &Path, scan: &BatchScan) -> Result<()> {
    let store = open_store(config)?;
    let scan_id = store.start_scan(base).wrap_err("Creating scan record")?;

    let records: Vec<UsageRecord> = scan
        .results
        .iter()
        .filter_map(|r| {
            r.size()
                .map(|size| UsageRecord::now(base, r.path.clone(), size, &scan_id))
        })
        .collect();

    store
        .record_usage_batch(&records)
        .wrap_err("Storing results")?;
    if scan.cancelled {
        store
            .fail_scan(&scan_id, "cancelled")
            .wrap_err("Recording cancelled scan")?;
    } else {
        store
            .complete_scan(&scan_id, records.len() as u64)
            .wrap_err("Completing scan")?;
    }

    info!(count = records.len(), scan_id = %scan_id, "Results stored");
    Ok(())
}

/// Print a directory's history, newest first, with the change from the
/// previous sample.
fn run_query(config: &Config, options: &QueryOptions, format: OutputFormat) -> Result<()> {
    let store = open_store(config)?;
    let records = store.query_usage(options).wrap_err("Querying usage")?;

    if records.is_empty() {
        println!("No records found");
        return Ok(());
    }

    let changes: Vec<Option<i64>> = (0..records.len())
        .map(|i| {
            records
                .get(i + 1)
                .map(|prev| records[i].size_bytes as i64 - prev.size_bytes as i64)
        })
        .collect();

    match format {
        OutputFormat::Text => {
            println!("{:<16}  {:>12}  {:>12}", "TIMESTAMP", "SIZE", "CHANGE");
            for (record, change) in records.iter().zip(&changes) {
                let change = match change {
                    Some(0) | None => "-".to_string(),
                    Some(diff) => format_change(*diff),
                };
                println!(
                    "{:<16}  {:>12}  {:>12}",
                    format_time(&record.recorded_at),
                    format_size(record.size_bytes),
                    change
                );
            }
        }
        OutputFormat::Json => {
            let rows: Vec<HistoryRow> = records
                .iter()
                .zip(&changes)
                .map(|(record, change)| HistoryRow {
                    timestamp: record.recorded_at,
                    size_bytes: record.size_bytes,
                    size_human: format_size(record.size_bytes),
                    change_from: *change,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }

    Ok(())
}

/// Print the largest changes under a base path.
fn run_top(config: &Config, options: &TopChangerOptions, format: OutputFormat) -> Result<()> {
    let store = open_store(config)?;
    let changes = store.top_changers(options).wrap_err("Querying top changers")?;

    match format {
        OutputFormat::Text => {
            if changes.is_empty() {
                println!("No changes found");
                return Ok(());
            }
            println!(
                "Changes under {} from {} to {}",
                options.base_path.display(),
                format_time(&options.since),
                format_time(&options.until)
            );
            println!();
            println!(
                "{:<40}  {:>12}  {:>12}  {:>12}  {:>8}",
                "DIRECTORY", "START", "END", "CHANGE", "PERCENT"
            );
            for change in &changes {
                println!(
                    "{:<40}  {:>12}  {:>12}  {:>12}  {:>7.1}%",
                    truncate(&change.directory.display().to_string(), 40),
                    format_size(change.start_size),
                    format_size(change.end_size),
                    format_change(change.change_bytes),
                    change.change_percent
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&changes)?);
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    SqliteStore::open(&config.database.path)
        .wrap_err_with(|| format!("Opening database {}", config.database.path.display()))
}

#[derive(Serialize)]
struct ScanRow<'a> {
    path: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_human: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    duration_ms: u128,
}

impl<'a> From<&'a ScanResult> for ScanRow<'a> {
    fn from(result: &'a ScanResult) -> Self {
        Self {
            path: &result.path,
            size_bytes: result.size(),
            size_human: result.size().map(format_size),
            error: result.error().map(ToString::to_string),
            duration_ms: result.duration.as_millis(),
        }
    }
}

#[derive(Serialize)]
struct HistoryRow {
    timestamp: DateTime<Utc>,
    size_bytes: u64,
    size_human: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    change_from: Option<i64>,
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Signed human-readable size difference.
fn format_change(diff: i64) -> String {
    let size = format_size(diff.unsigned_abs());
    if diff < 0 {
        format!("-{size}")
    } else {
        format!("+{size}")
    }
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Truncate a string to max length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 1).collect();
        format!("{kept}…")
    }
}

/// Parse a calendar date (YYYY-MM-DD) as midnight UTC.
fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .wrap_err_with(|| format!("Invalid date {s:?} (use YYYY-MM-DD)"))?;
    date.and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
        .ok_or_else(|| eyre!("Invalid date {s:?}"))
}

/// Last instant of a calendar date, at the precision timestamps are stored.
fn end_of_day(s: &str) -> Result<DateTime<Utc>> {
    Ok(parse_date(s)? + chrono::Duration::days(1) - chrono::Duration::microseconds(1))
}

/// Parse a size string (e.g., "512", "1K", "10MB", "1.5G", "2T").
fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();
    let digits = s.trim_end_matches(|c: char| !c.is_ascii_digit() && c != '.');
    let unit = s[digits.len()..].trim();

    let multiplier: u64 = match unit.trim_end_matches("IB").trim_end_matches('B') {
        "" => 1,
        "K" => 1024,
        "M" => 1024 * 1024,
        "G" => 1024 * 1024 * 1024,
        "T" => 1024 * 1024 * 1024 * 1024,
        _ => bail!("Invalid size {s:?}: expected a number with an optional K/M/G/T suffix"),
    };
    let num: f64 = digits
        .parse()
        .wrap_err_with(|| format!("Invalid size {s:?}"))?;

    Ok((num * multiplier as f64) as u64)
}
