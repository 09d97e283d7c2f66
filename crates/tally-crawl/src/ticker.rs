//! Periodic progress ticks.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use tally_core::CrawlConfig;

/// Tick source driving progress snapshots.
///
/// Carries no state of its own; the aggregator reads its totals whenever a
/// tick fires. A disabled ticker never fires.
#[derive(Debug)]
pub struct ProgressTicker {
    interval: Option<Interval>,
}

impl ProgressTicker {
    /// Ticker firing every `period`, first one `period` from now.
    ///
    /// Ticks missed while the aggregator was busy are delivered in a burst,
    /// so a crawl lasting `D` yields at least `D / period` ticks.
    pub fn new(period: Duration) -> Self {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        Self {
            interval: Some(interval),
        }
    }

    /// Ticker that never fires.
    pub fn disabled() -> Self {
        Self { interval: None }
    }

    /// Enabled only in verbose mode.
    pub fn from_config(config: &CrawlConfig) -> Self {
        if config.verbose {
            Self::new(config.tick_interval())
        } else {
            Self::disabled()
        }
    }

    /// Check if this ticker ever fires.
    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    /// Wait for the next tick. Cancel safe.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }
}
