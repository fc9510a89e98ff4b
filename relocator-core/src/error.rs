//! Error types for the relocation engine
//!
//! Only configuration errors are fatal. Everything else is recovered by the
//! component that detects it and surfaces in the logs.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or resolving settings
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid TOML
    #[error("Failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// The settings file is not valid JSON
    #[error("Failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// No settings file was given and none of the default locations exist
    #[error("No config file found (looked for {})", .searched.join(", "))]
    NotFound { searched: Vec<String> },

    /// The settings parsed but describe an unusable source
    #[error("Invalid source '{source_name}': {message}")]
    Invalid { source_name: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid { source_name: source_name.into(), message: message.into() }
    }
}

/// Failure of a single relocation command
#[derive(Debug, Error)]
pub enum RelocationError {
    /// The command could not be started at all
    #[error("Failed to launch '{command}': {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and reported failure
    #[error("'{command}' exited with {}", exit_code_label(.code))]
    ExitStatus { command: String, code: Option<i32> },

    /// The command was killed after exceeding its deadline
    #[error("'{command}' timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// The dispatch channel has no receivers left
#[derive(Debug, Error)]
#[error("Dispatch channel closed, dropping {path:?}")]
pub struct DispatchError {
    pub path: PathBuf,
}
