// Command handlers, one module per subcommand

pub mod check;
pub mod init;
pub mod run;

use anyhow::{Context, Result};
use relocator_core::{Settings, SourceRegistry};
use std::path::Path;
use tracing::info;

/// Find, parse and resolve the configuration
pub fn load_registry(config: Option<&Path>) -> Result<SourceRegistry> {
    let (path, settings) = Settings::discover(config).context("Failed to load configuration")?;
    info!("Loaded configuration from {:?}", path);

    SourceRegistry::from_settings(&settings)
        .with_context(|| format!("Invalid configuration in {:?}", path))
}
