//! External cancel triggers.
//!
//! Both triggers fire the crawl's cancel token at most once and return as
//! soon as the crawl's shutdown token fires, so neither outlives the crawl.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a trigger task returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The trigger fired the cancel token.
    Fired,
    /// The crawl finished first.
    Released,
    /// The trigger source ended or failed without firing.
    Exhausted,
}

/// Cancel the crawl when one byte arrives on `trigger`.
///
/// End of input or a read error does not cancel.
pub async fn watch_input<R>(
    mut trigger: R,
    cancel: CancellationToken,
    shutdown: CancellationToken,
) -> TriggerOutcome
where
    R: AsyncRead + Unpin,
{
    let mut byte = [0u8; 1];
    tokio::select! {
        () = shutdown.cancelled() => TriggerOutcome::Released,
        read = trigger.read(&mut byte) => match read {
            Ok(0) => {
                debug!("cancel input closed");
                TriggerOutcome::Exhausted
            }
            Ok(_) => {
                debug!("cancel requested from input");
                cancel.cancel();
                TriggerOutcome::Fired
            }
            Err(err) => {
                warn!(%err, "failed to read cancel input");
                TriggerOutcome::Exhausted
            }
        },
    }
}

/// Cancel the crawl once `after` has elapsed.
pub async fn watch_deadline(
    after: Duration,
    cancel: CancellationToken,
    shutdown: CancellationToken,
) -> TriggerOutcome {
    tokio::select! {
        () = shutdown.cancelled() => TriggerOutcome::Released,
        () = tokio::time::sleep(after) => {
            debug!(?after, "crawl deadline reached");
            cancel.cancel();
            TriggerOutcome::Fired
        }
    }
}
