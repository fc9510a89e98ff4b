//! Wires sources, watchers, the dispatch channel and the worker pool together

use crate::dispatch::dispatch_channel;
use crate::registry::SourceRegistry;
use crate::watcher::WatcherLoop;
use crate::worker::{CommandRelocator, PoolStats, Relocate, WorkerPool};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The relocation daemon, ready to start
pub struct RelocationService {
    registry: SourceRegistry,
    relocator: Arc<dyn Relocate>,
}

impl RelocationService {
    /// Service that runs each source's external relocation command
    pub fn new(registry: SourceRegistry) -> Self {
        let relocator = Arc::new(CommandRelocator::new(registry.command_timeout()));
        Self::with_relocator(registry, relocator)
    }

    pub fn with_relocator(registry: SourceRegistry, relocator: Arc<dyn Relocate>) -> Self {
        Self { registry, relocator }
    }

    /// Spawn one watcher per source and the worker pool on the current runtime
    pub fn start(self, shutdown: CancellationToken) -> ServiceHandle {
        let (tx, rx) = dispatch_channel(self.registry.queue_capacity());
        let pool = WorkerPool::new(self.registry.max_processes(), self.relocator);

        info!(
            "Starting {} watcher(s) and {} worker(s), queue capacity {}",
            self.registry.len(),
            pool.size(),
            self.registry.queue_capacity()
        );

        let mut tasks: Vec<JoinHandle<()>> = self
            .registry
            .sources()
            .iter()
            .cloned()
            .map(|source| tokio::spawn(WatcherLoop::new(source).run(tx.clone(), shutdown.clone())))
            .collect();

        // Only watchers hold senders from here on
        drop(tx);

        tasks.extend(pool.spawn(rx, shutdown.clone()));

        ServiceHandle { tasks, stats: pool.stats(), shutdown }
    }
}

/// Running service
pub struct ServiceHandle {
    tasks: Vec<JoinHandle<()>>,
    stats: Arc<PoolStats>,
    shutdown: CancellationToken,
}

impl ServiceHandle {
    pub fn stats(&self) -> Arc<PoolStats> {
        Arc::clone(&self.stats)
    }

    /// Ask every watcher and worker to stop at its next suspension point
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for every task to finish and log a summary
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            task.await.context("Relocation task panicked")?;
        }

        info!(
            "Relocation service stopped: {} attempted, {} succeeded, {} failed",
            self.stats.attempted(),
            self.stats.succeeded(),
            self.stats.failed()
        );

        Ok(())
    }
}
