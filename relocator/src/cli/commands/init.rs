//! Write a starter configuration file

use crate::cli::app::InitArgs;
use anyhow::{Context, Result, bail};
use relocator_core::Settings;
use tracing::info;

pub fn execute(args: InitArgs) -> Result<()> {
    if args.path.exists() && !args.force {
        bail!("{:?} already exists (use --force to overwrite)", args.path);
    }

    std::fs::write(&args.path, Settings::sample_toml())
        .with_context(|| format!("Failed to write {:?}", args.path))?;

    info!("Wrote starter configuration to {:?}", args.path);
    println!("Edit {} and start watching with `relocator run`", args.path.display());
    Ok(())
}
