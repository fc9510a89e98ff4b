//! Print the resolved configuration without watching anything

use super::load_registry;
use anyhow::Result;
use relocator_core::SourceRegistry;
use std::path::Path;

pub fn execute(config: Option<&Path>) -> Result<()> {
    let registry = load_registry(config)?;
    print!("{}", render(&registry));
    Ok(())
}

fn render(registry: &SourceRegistry) -> String {
    let mut out = format!(
        "workers: {}, queue: {}, command timeout: {:?}\n",
        registry.max_processes(),
        registry.queue_capacity(),
        registry.command_timeout()
    );

    for source in registry.sources() {
        out.push_str(&format!(
            "{} [{}:{}] -> {} via {} (stable {:?}, poll {:?})\n",
            source.name,
            source.namespace,
            source.class,
            source.destination,
            source.command,
            source.stability_interval,
            source.poll_interval
        ));
        for pattern in &source.patterns {
            out.push_str(&format!("    {}\n", pattern));
        }
    }

    out
}
