//! Source registry: settings resolved into immutable watch sources

use crate::config::{Settings, SourceSettings};
use crate::error::ConfigError;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_MAX_PROCESSES: usize = 10;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_STABILITY_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3600);

/// Identity, destination and command of a source, copied by value into every
/// tracked file so a dispatched event never depends on the live source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub name: String,
    pub namespace: String,
    pub class: String,
    pub destination: String,
    pub command: String,
}

/// A configured watch target with every interval resolved
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub namespace: String,
    pub class: String,
    pub destination: String,
    pub patterns: Vec<String>,
    pub command: String,
    pub stability_interval: Duration,
    pub poll_interval: Duration,
}

impl Source {
    pub fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            class: self.class.clone(),
            destination: self.destination.clone(),
            command: self.command.clone(),
        }
    }

    fn resolve(raw: &SourceSettings, poll: Duration, stability: Duration) -> Self {
        Self {
            name: raw.name.clone(),
            namespace: raw.namespace.clone(),
            class: raw.class.clone(),
            destination: raw.destination.clone(),
            patterns: raw.glob.clone(),
            command: raw.relocate.clone(),
            stability_interval: raw.stability_interval.map_or(stability, |s| seconds_or(s, stability)),
            poll_interval: raw.poll_interval.map_or(poll, |s| seconds_or(s, poll)),
        }
    }
}

/// Set of watch sources plus the global pool settings
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<Source>,
    max_processes: usize,
    queue_capacity: usize,
    command_timeout: Duration,
}

impl SourceRegistry {
    /// Validate `settings` and resolve every interval, logging the result
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        settings.validate()?;

        if settings.daemon {
            warn!("Daemon mode is not supported; running in the foreground");
        }

        let max_processes = count_or(settings.max_processes, DEFAULT_MAX_PROCESSES);
        let queue_capacity = count_or(settings.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        let command_timeout = seconds_or(settings.command_timeout, DEFAULT_COMMAND_TIMEOUT);
        let poll = seconds_or(settings.poll_interval, DEFAULT_POLL_INTERVAL);
        let stability = seconds_or(settings.stability_interval, DEFAULT_STABILITY_INTERVAL);

        info!(
            "Global settings: max_processes={}, poll_interval={:?}, stability_interval={:?}, queue_capacity={}, command_timeout={:?}",
            max_processes, poll, stability, queue_capacity, command_timeout
        );

        let sources: Vec<Source> = settings
            .sources
            .iter()
            .map(|raw| Source::resolve(raw, poll, stability))
            .collect();

        for source in &sources {
            info!(
                "Source: name={}, namespace={}, class={}, destination={}, stability_interval={:?}, poll_interval={:?}, glob={:?}",
                source.name,
                source.namespace,
                source.class,
                source.destination,
                source.stability_interval,
                source.poll_interval,
                source.patterns
            );
        }

        Ok(Self { sources, max_processes, queue_capacity, command_timeout })
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn max_processes(&self) -> usize {
        self.max_processes
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

fn seconds_or(value: i64, default: Duration) -> Duration {
    if value <= 0 { default } else { Duration::from_secs(value as u64) }
}

fn count_or(value: i64, default: usize) -> usize {
    if value <= 0 { default } else { value as usize }
}
