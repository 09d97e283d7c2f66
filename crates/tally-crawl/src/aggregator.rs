//! Single consumer of the size stream.

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use tally_core::{AggregateState, CrawlStatus, ProgressSnapshot, SizeEvent};

use crate::ticker::ProgressTicker;

/// Totals and terminal state returned by [`Aggregator::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateResult {
    /// Totals counted before the stream closed or cancellation was observed.
    pub totals: AggregateState,
    /// How the event loop ended.
    pub status: CrawlStatus,
}

/// Owns the running totals and multiplexes sizes, ticks and cancellation.
#[derive(Debug)]
pub struct Aggregator {
    state: AggregateState,
    started: Instant,
    progress_tx: broadcast::Sender<ProgressSnapshot>,
}

impl Aggregator {
    /// Create an aggregator publishing snapshots on `progress_tx`.
    pub fn new(started: Instant, progress_tx: broadcast::Sender<ProgressSnapshot>) -> Self {
        Self {
            state: AggregateState::new(),
            started,
            progress_tx,
        }
    }

    /// Current totals.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::new(self.state, self.started.elapsed())
    }

    /// Consume the stream until it closes or `cancel` fires.
    ///
    /// After cancellation the remaining events are drained without being
    /// counted, so producers blocked on a full stream can finish.
    pub async fn run(
        mut self,
        mut stream: mpsc::Receiver<SizeEvent>,
        mut ticker: ProgressTicker,
        cancel: CancellationToken,
    ) -> AggregateResult {
        loop {
            tokio::select! {
                event = stream.recv() => match event {
                    Some(event) => self.state.record(event),
                    None => {
                        debug!(files = self.state.files, bytes = self.state.bytes, "size stream closed");
                        return self.finish(CrawlStatus::Completed);
                    }
                },
                () = ticker.tick() => {
                    // No subscribers is fine.
                    let _ = self.progress_tx.send(self.snapshot());
                }
                () = cancel.cancelled() => {
                    let drained = drain(&mut stream).await;
                    debug!(drained, "cancelled, discarded remaining size events");
                    return self.finish(CrawlStatus::Cancelled);
                }
            }
        }
    }

    fn finish(self, status: CrawlStatus) -> AggregateResult {
        AggregateResult {
            totals: self.state,
            status,
        }
    }
}

/// Read and discard everything until every sender is gone.
async fn drain(stream: &mut mpsc::Receiver<SizeEvent>) -> u64 {
    let mut drained = 0;
    while stream.recv().await.is_some() {
        drained += 1;
    }
    drained
}
