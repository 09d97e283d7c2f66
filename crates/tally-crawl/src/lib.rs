//! Concurrent disk usage crawling for tally.
//!
//! # Overview
//!
//! `tally-crawl` walks one or more roots in parallel and sums the sizes of
//! every regular file underneath. It is a fan-out/fan-in pipeline:
//!
//! - **Walkers** list directories concurrently and push one size per file
//!   into a bounded stream
//! - **One aggregator** owns the running totals and is the stream's only
//!   consumer
//! - **Progress ticks** publish snapshots of the totals in verbose mode
//! - **Cancel triggers** (a keypress, a deadline) stop the count early; the
//!   aggregator then drains the stream so no walker stays blocked
//!
//! # Example
//!
//! ```rust,no_run
//! use tally_crawl::{CrawlConfig, Crawler};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), tally_crawl::CrawlError> {
//! let crawler = Crawler::new(CrawlConfig::new(["/path/to/scan"]));
//! let outcome = crawler.run(CancellationToken::new()).await?;
//!
//! println!("Total: {}", outcome.totals);
//! # Ok(())
//! # }
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use tally_crawl::{CrawlConfig, Crawler};
//!
//! let config = CrawlConfig::builder().verbose(true).build().unwrap();
//! let crawler = Crawler::new(config);
//! let mut progress_rx = crawler.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(progress) = progress_rx.recv().await {
//!         println!("{progress}");
//!     }
//! });
//! ```

mod aggregator;
mod canceller;
mod crawler;
mod inode;
mod source;
mod ticker;
mod tracker;
mod walker;

pub use aggregator::{AggregateResult, Aggregator};
pub use canceller::{TriggerOutcome, watch_deadline, watch_input};
pub use crawler::Crawler;
pub use inode::{InodeKey, InodeTracker};
pub use source::{EntryKind, FileInfo, inspect, inspect_root};
pub use ticker::ProgressTicker;
pub use tracker::{TaskGuard, TaskTracker};
pub use walker::{DirTask, Walker};

// Re-export core types for convenience
pub use tally_core::{
    AggregateState, CrawlConfig, CrawlError, CrawlOutcome, CrawlStatus, CrawlWarning,
    Parallelism, ProgressSnapshot, SizeEvent, WarningKind,
};
