use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Parse CLI arguments first to get verbosity level
    let cli = Cli::parse();

    // Initialize tracing with appropriate verbosity
    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = cli.config.as_deref();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            info!("Starting relocator");
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(cli::commands::run::execute(config))?;
        }
        Commands::Check => {
            cli::commands::check::execute(config)?;
        }
        Commands::Init(args) => {
            cli::commands::init::execute(args)?;
        }
    }

    Ok(())
}
