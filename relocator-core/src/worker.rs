//! Relocation workers
//!
//! A fixed number of workers drain the shared dispatch channel. Each event is
//! handed to a [`Relocate`] implementation exactly once; the outcome is
//! logged and counted, never retried and never reported back to the watcher.

use crate::dispatch::{DispatchEvent, DispatchReceiver};
use crate::error::RelocationError;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Performs the relocation of one settled file
#[async_trait]
pub trait Relocate: Send + Sync {
    async fn relocate(&self, event: &DispatchEvent) -> Result<(), RelocationError>;
}

/// Runs the source's external command as
/// `<command> <name> <namespace> <class> <path> <destination>`
#[derive(Debug, Clone)]
pub struct CommandRelocator {
    timeout: Duration,
}

impl CommandRelocator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn command_for(event: &DispatchEvent) -> Command {
        let snapshot = &event.snapshot;
        let mut cmd = Command::new(&snapshot.command);
        cmd.arg(&snapshot.name)
            .arg(&snapshot.namespace)
            .arg(&snapshot.class)
            .arg(&event.path)
            .arg(&snapshot.destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Relocate for CommandRelocator {
    async fn relocate(&self, event: &DispatchEvent) -> Result<(), RelocationError> {
        let command = event.snapshot.command.clone();

        let mut child = Self::command_for(event)
            .spawn()
            .map_err(|source| RelocationError::Launch { command: command.clone(), source })?;

        // Dropping the child on timeout kills it
        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status.map_err(|source| RelocationError::Launch { command: command.clone(), source })?,
            Err(_) => return Err(RelocationError::TimedOut { command, timeout: self.timeout }),
        };

        if status.success() {
            Ok(())
        } else {
            Err(RelocationError::ExitStatus { command, code: status.code() })
        }
    }
}

/// Counters shared by every worker in a pool
#[derive(Debug, Default)]
pub struct PoolStats {
    attempted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl PoolStats {
    pub fn attempted(&self) -> u64 {
        self.attempted.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Fixed-size set of relocation workers
pub struct WorkerPool {
    size: usize,
    relocator: Arc<dyn Relocate>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    pub fn new(size: usize, relocator: Arc<dyn Relocate>) -> Self {
        Self { size: size.max(1), relocator, stats: Arc::new(PoolStats::default()) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn stats(&self) -> Arc<PoolStats> {
        Arc::clone(&self.stats)
    }

    /// Spawn every worker on the current runtime
    pub fn spawn(&self, receiver: DispatchReceiver, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        (0..self.size)
            .map(|id| {
                let worker = Worker {
                    id,
                    relocator: Arc::clone(&self.relocator),
                    stats: Arc::clone(&self.stats),
                };
                tokio::spawn(worker.run(receiver.clone(), shutdown.clone()))
            })
            .collect()
    }
}

struct Worker {
    id: usize,
    relocator: Arc<dyn Relocate>,
    stats: Arc<PoolStats>,
}

impl Worker {
    async fn run(self, receiver: DispatchReceiver, shutdown: CancellationToken) {
        debug!("Worker {} started", self.id);

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = receiver.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    warn!("Worker {}: shutdown interrupted relocation of {:?}", self.id, event.path);
                    break;
                }
                _ = self.handle(&event) => {}
            }
        }

        debug!("Worker {} stopped", self.id);
    }

    async fn handle(&self, event: &DispatchEvent) {
        let snapshot = &event.snapshot;
        info!(
            "Worker {}: relocating {:?} for {}:{}:{} to {}",
            self.id, event.path, snapshot.name, snapshot.namespace, snapshot.class, snapshot.destination
        );

        self.stats.attempted.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        match self.relocator.relocate(event).await {
            Ok(()) => {
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                info!("Worker {}: relocated {:?} in {:?}", self.id, event.path, started.elapsed());
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Worker {}: relocation of {:?} failed: {}", self.id, event.path, e);
            }
        }
    }
}
