//! Core types for tally.
//!
//! This crate provides the data shared between the crawl engine and the
//! command line front end: configuration, running totals, progress
//! snapshots, warnings, and the final crawl outcome.

mod config;
mod error;
mod outcome;
mod totals;

pub use config::{
    CrawlConfig, CrawlConfigBuilder, DEFAULT_CHANNEL_CAPACITY, DEFAULT_TICK_INTERVAL_MS,
    EntryFilter, Parallelism,
};
pub use error::{CrawlError, CrawlWarning, WarningKind};
pub use outcome::{CrawlOutcome, CrawlStatus};
pub use totals::{AggregateState, ProgressSnapshot, SizeEvent};
