//! Foreground daemon: watch every source until Ctrl-C

use super::load_registry;
use anyhow::Result;
use relocator_core::RelocationService;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn execute(config: Option<&Path>) -> Result<()> {
    let registry = load_registry(config)?;
    if registry.is_empty() {
        warn!("No sources configured, nothing to watch");
    }

    let shutdown = CancellationToken::new();
    let handle = RelocationService::new(registry).start(shutdown.clone());

    // Set up signal handler for graceful shutdown
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, shutting down");
        }
        signal_shutdown.cancel();
    });

    handle.join().await
}
