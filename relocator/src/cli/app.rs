use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "relocator",
    version,
    about = "Relocator - hand finished files to a relocation command",
    long_about = "Relocator polls glob patterns, waits until each matching file has stopped growing, and then runs the configured relocation command for it exactly once."
)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file (defaults to relocator.toml, then config.json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch all configured sources until interrupted (default)
    #[command(about = "Watch all configured sources and relocate settled files")]
    Run,

    /// Validate the configuration and show the resolved sources
    #[command(about = "Load the configuration and print the resolved sources")]
    Check,

    /// Write a starter configuration file
    #[command(about = "Write a starter configuration file")]
    Init(InitArgs),
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Where to write the configuration
    #[arg(default_value = "relocator.toml")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(short, long)]
    pub force: bool,
}
