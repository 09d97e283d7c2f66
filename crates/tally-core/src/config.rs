//! Crawl configuration types.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::CrawlError;

/// Default interval between progress snapshots, in milliseconds.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 500;

/// Default capacity of the size event stream.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// How directory traversal work is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parallelism {
    /// Fixed pool of workers pulling directories from a shared queue
    /// (0 = one worker per available CPU).
    Bounded(usize),
    /// One concurrent task per discovered subdirectory, no upper bound.
    Unbounded,
}

impl Parallelism {
    /// Resolve the number of pool workers, or `None` for unbounded fan-out.
    pub fn worker_count(&self) -> Option<usize> {
        match *self {
            Self::Bounded(0) => Some(
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4),
            ),
            Self::Bounded(n) => Some(n),
            Self::Unbounded => None,
        }
    }
}

impl Default for Parallelism {
    fn default() -> Self {
        Self::Bounded(0)
    }
}

/// Configuration for one crawl.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct CrawlConfig {
    /// Root paths to crawl. An empty list means the current directory.
    #[builder(default)]
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    /// Publish periodic progress snapshots.
    #[builder(default = "false")]
    #[serde(default)]
    pub verbose: bool,

    /// Interval between progress snapshots in milliseconds.
    #[builder(default = "DEFAULT_TICK_INTERVAL_MS")]
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Traversal scheduling strategy.
    #[builder(default)]
    #[serde(default)]
    pub parallelism: Parallelism,

    /// Capacity of the size event stream between walkers and the aggregator.
    #[builder(default = "DEFAULT_CHANNEL_CAPACITY")]
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Include hidden entries (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Entry names to skip (glob syntax).
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Descend into directories on a different device than their root.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub cross_filesystems: bool,

    /// Count a file with several hardlinks only once.
    #[builder(default = "false")]
    #[serde(default)]
    pub dedupe_hardlinks: bool,

    /// Cancel the crawl after this many milliseconds.
    #[builder(default)]
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Report the totals gathered so far when the crawl is cancelled.
    #[builder(default = "false")]
    #[serde(default)]
    pub report_partial: bool,
}

fn default_true() -> bool {
    true
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl CrawlConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        check_settings(
            self.roots.as_deref().unwrap_or_default(),
            self.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS),
            self.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY),
            self.ignore_patterns.as_deref().unwrap_or_default(),
        )
        .map_err(|e| e.to_string())
    }
}

/// Checks shared by the builder and [`CrawlConfig::validate`].
fn check_settings(
    roots: &[PathBuf],
    tick_interval_ms: u64,
    channel_capacity: usize,
    ignore_patterns: &[String],
) -> Result<(), CrawlError> {
    if roots.iter().any(|r| r.as_os_str().is_empty()) {
        return Err(CrawlError::invalid_config("Root path cannot be empty"));
    }
    if tick_interval_ms == 0 {
        return Err(CrawlError::invalid_config(
            "Tick interval must be greater than zero",
        ));
    }
    if channel_capacity == 0 {
        return Err(CrawlError::invalid_config(
            "Channel capacity must be greater than zero",
        ));
    }
    compile_ignore(ignore_patterns).map(|_| ())
}

fn compile_ignore(patterns: &[String]) -> Result<GlobSet, CrawlError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| CrawlError::InvalidPattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| CrawlError::InvalidPattern {
        pattern: patterns.join(","),
        source,
    })
}

impl CrawlConfig {
    /// Create a new crawl config builder.
    pub fn builder() -> CrawlConfigBuilder {
        CrawlConfigBuilder::default()
    }

    /// Create a simple config crawling the given roots.
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            verbose: false,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            parallelism: Parallelism::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            include_hidden: true,
            ignore_patterns: Vec::new(),
            cross_filesystems: true,
            dedupe_hardlinks: false,
            timeout_ms: None,
            report_partial: false,
        }
    }

    /// Roots to crawl, falling back to the current directory.
    pub fn effective_roots(&self) -> Vec<PathBuf> {
        if self.roots.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            self.roots.clone()
        }
    }

    /// Interval between progress snapshots.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Deadline after which the crawl is cancelled, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Re-run builder validation on a config that was deserialized or
    /// mutated directly.
    pub fn validate(&self) -> Result<(), CrawlError> {
        check_settings(
            &self.roots,
            self.tick_interval_ms,
            self.channel_capacity,
            &self.ignore_patterns,
        )
    }

    /// Compile the name filter used while walking.
    pub fn entry_filter(&self) -> Result<EntryFilter, CrawlError> {
        Ok(EntryFilter {
            ignore: compile_ignore(&self.ignore_patterns)?,
            include_hidden: self.include_hidden,
        })
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::new(Vec::<PathBuf>::new())
    }
}

/// Compiled filter deciding which directory entries are skipped.
#[derive(Debug, Clone)]
pub struct EntryFilter {
    ignore: GlobSet,
    include_hidden: bool,
}

impl EntryFilter {
    /// Check if an entry with this file name should be skipped.
    pub fn should_skip(&self, name: &OsStr) -> bool {
        if !self.include_hidden && name.as_encoded_bytes().first() == Some(&b'.') {
            return true;
        }
        !self.ignore.is_empty() && self.ignore.is_match(name)
    }
}
