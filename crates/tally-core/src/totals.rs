//! Running totals, size events, and progress snapshots.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Size of one discovered regular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeEvent {
    /// Size in bytes.
    pub bytes: u64,
}

impl SizeEvent {
    /// Create a size event.
    pub fn new(bytes: u64) -> Self {
        Self { bytes }
    }
}

/// File and byte counters accumulated by the aggregator.
///
/// Both counters only ever grow during a crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateState {
    /// Number of regular files counted.
    pub files: u64,
    /// Sum of their sizes in bytes.
    pub bytes: u64,
}

impl AggregateState {
    /// Create empty totals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one file.
    pub fn record(&mut self, event: SizeEvent) {
        self.files += 1;
        self.bytes = self.bytes.saturating_add(event.bytes);
    }

    /// Byte total in decimal gigabytes.
    pub fn gigabytes(&self) -> f64 {
        self.bytes as f64 / 1e9
    }
}

/// Formats as `<files> files <gigabytes, 5 decimals> GB`.
impl fmt::Display for AggregateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} files {:.5} GB", self.files, self.gigabytes())
    }
}

/// Point-in-time read of the running totals, for display only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Totals at the time of the tick.
    pub totals: AggregateState,
    /// Time elapsed since the crawl started.
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Create a snapshot.
    pub fn new(totals: AggregateState, elapsed: Duration) -> Self {
        Self { totals, elapsed }
    }

    /// Calculate scan rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.totals.files as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Calculate scan rate in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.totals.bytes as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.totals.fmt(f)
    }
}
