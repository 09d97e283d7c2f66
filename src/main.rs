//! tally - concurrent disk usage crawler.
//!
//! Usage:
//!   tally [ROOTS]...          Count files and bytes under each root
//!   tally -v [ROOTS]...       Also print running totals every 500ms
//!   tally --help              Show help
//!
//! Press Enter while a crawl runs to cancel it.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tally_core::{CrawlConfig, CrawlOutcome, Parallelism};
use tally_crawl::Crawler;

#[derive(Parser)]
#[command(
    name = "tally",
    version,
    about = "Report the disk space used by one or more directories",
    long_about = "tally walks every root concurrently and reports how many files it \
                  found and how many bytes they hold.\n\n\
                  Press Enter while it runs to cancel the crawl."
)]
struct Cli {
    /// Directories (or files) to measure; defaults to the current directory
    roots: Vec<PathBuf>,

    /// Print running totals periodically (text output only)
    #[arg(short, long)]
    verbose: bool,

    /// Milliseconds between progress lines
    #[arg(long, value_name = "MS")]
    interval: Option<u64>,

    /// Number of directory workers (0 = one per CPU)
    #[arg(short = 'j', long, conflicts_with = "unbounded")]
    jobs: Option<usize>,

    /// Spawn one task per directory instead of using a worker pool
    #[arg(long)]
    unbounded: bool,

    /// Do not watch standard input for a cancel keypress
    #[arg(long)]
    no_cancel: bool,

    /// Cancel the crawl after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<f64>,

    /// Print the totals gathered so far when cancelled
    #[arg(long)]
    partial: bool,

    /// Skip entries whose name starts with a dot
    #[arg(long)]
    no_hidden: bool,

    /// Skip entries matching this glob (repeatable)
    #[arg(long, value_name = "GLOB")]
    ignore: Vec<String>,

    /// Do not descend into directories on other filesystems
    #[arg(short = 'x', long)]
    one_file_system: bool,

    /// Count hardlinked files only once
    #[arg(long)]
    dedupe_hardlinks: bool,

    /// Append a human-readable size to the final line
    #[arg(short = 'H', long)]
    human: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Load base configuration from a JSON file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing();

    let config = build_config(&cli)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = runtime.block_on(run(config, &cli));

    // A pending stdin read cannot be interrupted; do not wait for it.
    runtime.shutdown_background();
    result
}

/// Diagnostics go to stderr; `RUST_LOG` overrides the default level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Merge the optional config file with command line flags.
fn build_config(cli: &Cli) -> Result<CrawlConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str::<CrawlConfig>(&raw)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        }
        None => CrawlConfig::default(),
    };

    if !cli.roots.is_empty() {
        config.roots = cli.roots.clone();
    }
    config.verbose |= cli.verbose;
    if let Some(interval) = cli.interval {
        config.tick_interval_ms = interval;
    }
    if cli.unbounded {
        config.parallelism = Parallelism::Unbounded;
    } else if let Some(jobs) = cli.jobs {
        config.parallelism = Parallelism::Bounded(jobs);
    }
    if let Some(secs) = cli.timeout {
        config.timeout_ms = Some((secs.max(0.0) * 1000.0) as u64);
    }
    config.report_partial |= cli.partial;
    if cli.no_hidden {
        config.include_hidden = false;
    }
    config.ignore_patterns.extend(cli.ignore.iter().cloned());
    if cli.one_file_system {
        config.cross_filesystems = false;
    }
    config.dedupe_hardlinks |= cli.dedupe_hardlinks;

    // Progress lines would interleave with the JSON document on stdout.
    if config.verbose && matches!(cli.format, OutputFormat::Json) {
        bail!("Progress output (--verbose) is not available with --format json");
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run(config: CrawlConfig, cli: &Cli) -> Result<()> {
    let crawler = Crawler::new(config);

    let printer = matches!(cli.format, OutputFormat::Text).then(|| {
        let mut progress_rx = crawler.subscribe();
        tokio::spawn(async move {
            loop {
                match progress_rx.recv().await {
                    Ok(progress) => println!("{progress}"),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let trigger = (!cli.no_cancel).then(tokio::io::stdin);
    let outcome = crawler
        .run_with_trigger(trigger, CancellationToken::new())
        .await
        .context("Crawl failed")?;

    let report_partial = crawler.config().report_partial;
    drop(crawler);
    if let Some(printer) = printer {
        printer.await.context("Progress printer failed")?;
    }

    match cli.format {
        OutputFormat::Text => print_text(&outcome, report_partial, cli.human),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
    }

    Ok(())
}

fn print_text(outcome: &CrawlOutcome, report_partial: bool, human: bool) {
    if let Some(line) = summary_line(outcome, report_partial, human) {
        println!("{line}");
    }
    if let Some(line) = warning_line(outcome) {
        eprintln!("{line}");
    }
}

/// Final totals line; cancelled crawls only get one with `--partial`.
fn summary_line(outcome: &CrawlOutcome, report_partial: bool, human: bool) -> Option<String> {
    let label = if outcome.is_complete() {
        "Total"
    } else if report_partial {
        "Partial"
    } else {
        return None;
    };

    Some(if human {
        format!(
            "{label}: {} ({})",
            outcome.totals,
            format_size(outcome.totals.bytes)
        )
    } else {
        format!("{label}: {}", outcome.totals)
    })
}

fn warning_line(outcome: &CrawlOutcome) -> Option<String> {
    outcome
        .has_warnings()
        .then(|| format!("{} entries could not be read", outcome.warnings.len()))
}

/// Format bytes as human-readable size.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tally_core::{AggregateState, CrawlStatus, CrawlWarning, WarningKind};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tally").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = build_config(&parse(&[])).unwrap();
        assert_eq!(config.effective_roots(), vec![PathBuf::from(".")]);
        assert!(!config.verbose);
        assert_eq!(config.parallelism, Parallelism::default());
        assert!(!config.report_partial);
    }

    #[test]
    fn test_flags_map_to_config() {
        let config = build_config(&parse(&[
            "-v",
            "--unbounded",
            "--timeout",
            "1.5",
            "--partial",
            "--no-hidden",
            "--ignore",
            "*.tmp",
            "a",
            "b",
        ]))
        .unwrap();

        assert_eq!(config.roots, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert!(config.verbose);
        assert_eq!(config.parallelism, Parallelism::Unbounded);
        assert_eq!(config.timeout_ms, Some(1500));
        assert!(config.report_partial);
        assert!(!config.include_hidden);
        assert_eq!(config.ignore_patterns, vec!["*.tmp".to_string()]);
    }

    #[test]
    fn test_jobs_conflict_with_unbounded() {
        let result = Cli::try_parse_from(["tally", "-j", "4", "--unbounded"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_file_is_merged() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tally.json");
        std::fs::write(&path, r#"{"roots": ["/data"], "tick_interval_ms": 250}"#).unwrap();

        let config = build_config(&parse(&["--config", path.to_str().unwrap(), "-j", "3"])).unwrap();
        assert_eq!(config.roots, vec![PathBuf::from("/data")]);
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.parallelism, Parallelism::Bounded(3));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        assert!(build_config(&parse(&["--ignore", "a["])).is_err());
    }

    #[test]
    fn test_verbose_rejected_with_json() {
        assert!(build_config(&parse(&["-v", "-f", "json"])).is_err());
        assert!(build_config(&parse(&["-f", "json"])).is_ok());
        assert!(build_config(&parse(&["-v", "-f", "text"])).is_ok());
    }

    fn outcome(status: CrawlStatus, warnings: usize) -> CrawlOutcome {
        CrawlOutcome {
            roots: vec![PathBuf::from(".")],
            totals: AggregateState {
                files: 3,
                bytes: 35,
            },
            status,
            elapsed: Duration::from_millis(20),
            warnings: (0..warnings)
                .map(|i| CrawlWarning::new(format!("/x/{i}"), "denied", WarningKind::PermissionDenied))
                .collect(),
        }
    }

    #[test]
    fn test_summary_line() {
        let done = outcome(CrawlStatus::Completed, 0);
        assert_eq!(
            summary_line(&done, false, false).as_deref(),
            Some("Total: 3 files 0.00000 GB")
        );
        assert_eq!(
            summary_line(&done, false, true).as_deref(),
            Some("Total: 3 files 0.00000 GB (35 B)")
        );

        let cancelled = outcome(CrawlStatus::Cancelled, 0);
        assert_eq!(summary_line(&cancelled, false, false), None);
        assert_eq!(
            summary_line(&cancelled, true, false).as_deref(),
            Some("Partial: 3 files 0.00000 GB")
        );
    }

    #[test]
    fn test_warning_count_reported_even_when_cancelled() {
        let cancelled = outcome(CrawlStatus::Cancelled, 2);
        assert_eq!(summary_line(&cancelled, false, false), None);
        assert_eq!(
            warning_line(&cancelled).as_deref(),
            Some("2 entries could not be read")
        );
        assert_eq!(warning_line(&outcome(CrawlStatus::Completed, 0)), None);
    }
}
