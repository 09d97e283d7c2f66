//! Crawl orchestration.

use tokio::io::AsyncRead;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::debug;

use tally_core::{CrawlConfig, CrawlError, CrawlOutcome, ProgressSnapshot};

use crate::aggregator::Aggregator;
use crate::canceller;
use crate::ticker::ProgressTicker;
use crate::tracker::TaskTracker;
use crate::walker::Walker;

/// Capacity of the progress broadcast channel.
const PROGRESS_CHANNEL_SIZE: usize = 100;

/// Runs walkers, the aggregator and the cancel triggers for one config.
pub struct Crawler {
    config: CrawlConfig,
    progress_tx: broadcast::Sender<ProgressSnapshot>,
}

impl Crawler {
    /// Create a crawler for the given configuration.
    pub fn new(config: CrawlConfig) -> Self {
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_SIZE);
        Self {
            config,
            progress_tx,
        }
    }

    /// Configuration this crawler runs with.
    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Subscribe to progress snapshots (published only in verbose mode).
    ///
    /// The receiver closes once the crawler is dropped.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressSnapshot> {
        self.progress_tx.subscribe()
    }

    /// Crawl every root; stops early when `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<CrawlOutcome, CrawlError> {
        self.run_with_trigger(None::<tokio::io::Empty>, cancel).await
    }

    /// Crawl every root, additionally cancelling when one byte arrives on
    /// `trigger`.
    ///
    /// Every task started here has exited or been released by the time this
    /// returns, whichever way the crawl ended. Dropping the returned future
    /// aborts the walk and the triggers; traversal tasks that are already
    /// running see the closed size stream and stop at their next entry.
    pub async fn run_with_trigger<R>(
        &self,
        trigger: Option<R>,
        cancel: CancellationToken,
    ) -> Result<CrawlOutcome, CrawlError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        self.config.validate()?;

        let started = Instant::now();
        let roots = self.config.effective_roots();
        let (size_tx, size_rx) = mpsc::channel(self.config.channel_capacity);
        let (warning_tx, mut warning_rx) = mpsc::unbounded_channel();
        let tracker = TaskTracker::new();
        let walker = Walker::new(&self.config, size_tx, tracker.clone(), warning_tx)?;

        // Fired once the aggregator is done; releases every trigger task.
        let shutdown = CancellationToken::new();
        let mut triggers = JoinSet::new();
        if let Some(trigger) = trigger {
            triggers.spawn(canceller::watch_input(
                trigger,
                cancel.clone(),
                shutdown.clone(),
            ));
        }
        if let Some(timeout) = self.config.timeout() {
            triggers.spawn(canceller::watch_deadline(
                timeout,
                cancel.clone(),
                shutdown.clone(),
            ));
        }

        let ticker = ProgressTicker::from_config(&self.config);
        debug!(
            roots = roots.len(),
            parallelism = ?self.config.parallelism,
            progress = ticker.is_enabled(),
            "starting crawl"
        );
        let walk = AbortOnDropHandle::new(tokio::spawn({
            let roots = roots.clone();
            async move {
                walker.walk(roots).await;
                // Dropping the walker drops the last size sender and closes the stream.
            }
        }));

        let aggregator = Aggregator::new(started, self.progress_tx.clone());
        let result = aggregator.run(size_rx, ticker, cancel).await;
        shutdown.cancel();

        let walked = walk.await;
        while let Some(joined) = triggers.join_next().await {
            let outcome = joined.map_err(task_failed)?;
            debug!(?outcome, "cancel trigger finished");
        }
        walked.map_err(task_failed)?;

        let summary = ProgressSnapshot::new(result.totals, started.elapsed());
        debug!(
            outstanding = tracker.outstanding(),
            status = ?result.status,
            files_per_second = summary.files_per_second(),
            bytes_per_second = summary.bytes_per_second(),
            "crawl finished"
        );

        let mut warnings = Vec::new();
        while let Ok(warning) = warning_rx.try_recv() {
            warnings.push(warning);
        }

        Ok(CrawlOutcome {
            roots,
            totals: result.totals,
            status: result.status,
            elapsed: summary.elapsed,
            warnings,
        })
    }
}

fn task_failed(err: JoinError) -> CrawlError {
    CrawlError::Task {
        message: err.to_string(),
    }
}
