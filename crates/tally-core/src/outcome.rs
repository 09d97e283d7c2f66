//! Result of a finished crawl.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CrawlWarning;
use crate::totals::AggregateState;

/// How a crawl terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    /// Every root was walked to the end.
    Completed,
    /// The cancel signal fired; totals cover only what was counted before.
    Cancelled,
}

/// Totals and diagnostics of one crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlOutcome {
    /// Roots that were crawled.
    pub roots: Vec<PathBuf>,

    /// Final totals.
    pub totals: AggregateState,

    /// Terminal state.
    pub status: CrawlStatus,

    /// Duration of the crawl.
    pub elapsed: Duration,

    /// Entries that could not be read.
    pub warnings: Vec<CrawlWarning>,
}

impl CrawlOutcome {
    /// Check if the crawl ran to completion.
    pub fn is_complete(&self) -> bool {
        self.status == CrawlStatus::Completed
    }

    /// Check if there were any warnings during the crawl.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
