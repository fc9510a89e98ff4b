//! Polling loop driving one source's stability tracker

use crate::dispatch::DispatchSender;
use crate::registry::Source;
use crate::tracker::StabilityTracker;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Owns one source's tracker for the lifetime of the loop
pub struct WatcherLoop {
    tracker: StabilityTracker,
}

impl WatcherLoop {
    pub fn new(source: Source) -> Self {
        Self { tracker: StabilityTracker::new(source) }
    }

    /// Poll until `shutdown` fires or every worker is gone
    ///
    /// Settled files are sent one by one; a full channel holds the loop
    /// here, so the next poll waits for the workers.
    pub async fn run(mut self, dispatch: DispatchSender, shutdown: CancellationToken) {
        let name = self.tracker.source().name.clone();
        let poll_interval = self.tracker.source().poll_interval;
        info!("Watching source '{}' every {:?}", name, poll_interval);

        loop {
            let settled = self.tracker.poll();
            debug!("Source '{}': {} tracked, {} settled", name, self.tracker.len(), settled.len());

            for event in settled {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        info!("Watcher for '{}' stopping", name);
                        return;
                    }
                    sent = dispatch.send(event) => {
                        if let Err(e) = sent {
                            warn!("Watcher for '{}' stopping: {}", name, e);
                            return;
                        }
                    }
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Watcher for '{}' stopping", name);
                    return;
                }
                _ = sleep(poll_interval) => {}
            }
        }
    }
}
