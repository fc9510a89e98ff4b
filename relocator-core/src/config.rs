//! Settings file loading
//!
//! Settings are read once at start-up and handed to the
//! [`SourceRegistry`](crate::registry::SourceRegistry), which resolves every
//! interval into a concrete duration. TOML is the native format; JSON files
//! written for the older `config.json` layout (PascalCase keys, optionally
//! wrapped in a `Root` object) load unchanged.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Config files tried, in order, when no explicit path is given
pub const DEFAULT_CONFIG_FILES: &[&str] = &["relocator.toml", "config.json"];

/// Raw settings as written in the config file
///
/// Numeric fields are kept signed and unresolved: zero or negative values
/// mean "use the default" and are replaced by the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Accepted for compatibility; the process always stays in the foreground
    #[serde(default, alias = "Daemon")]
    pub daemon: bool,

    /// Number of concurrent relocation workers
    #[serde(default, alias = "MaxProc")]
    pub max_processes: i64,

    /// Seconds between two polls of a source
    #[serde(default, alias = "IntervalPoll")]
    pub poll_interval: i64,

    /// Seconds a file size must stay unchanged before relocation
    #[serde(default, alias = "IntervalElapsed")]
    pub stability_interval: i64,

    /// Capacity of the queue between watchers and workers
    #[serde(default)]
    pub queue_capacity: i64,

    /// Seconds a relocation command may run before it is killed
    #[serde(default)]
    pub command_timeout: i64,

    #[serde(default, alias = "Relocators")]
    pub sources: Vec<SourceSettings>,
}

/// One watched location as written in the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSettings {
    #[serde(alias = "Name")]
    pub name: String,

    #[serde(default, alias = "NameSpace")]
    pub namespace: String,

    #[serde(default, alias = "Class")]
    pub class: String,

    #[serde(default, alias = "Destination")]
    pub destination: String,

    /// Glob patterns evaluated on every poll, in order
    #[serde(default, alias = "Glob")]
    pub glob: Vec<String>,

    /// External command invoked for each settled file
    #[serde(default, alias = "Relocate")]
    pub relocate: String,

    /// Per-source override of the global stability interval
    #[serde(default, alias = "Interval", skip_serializing_if = "Option::is_none")]
    pub stability_interval: Option<i64>,

    /// Per-source override of the global poll interval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<i64>,
}

impl Settings {
    /// Load settings from a file, picking the parser from the extension
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        debug!("Loading settings from {:?} (json: {})", path, is_json);

        if is_json { Self::from_json_str(&content) } else { Self::from_toml_str(&content) }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Parse JSON settings, unwrapping a top-level `Root` object if present
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let mut value: serde_json::Value = serde_json::from_str(content)?;

        if let Some(root) = value.as_object_mut().and_then(|obj| obj.remove("Root")) {
            value = root;
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Load from `explicit` or, failing that, the first default file that exists
    pub fn discover(explicit: Option<&Path>) -> Result<(PathBuf, Self), ConfigError> {
        if let Some(path) = explicit {
            return Ok((path.to_path_buf(), Self::from_file(path)?));
        }

        for candidate in DEFAULT_CONFIG_FILES {
            let path = Path::new(candidate);
            if path.exists() {
                return Ok((path.to_path_buf(), Self::from_file(path)?));
            }
        }

        Err(ConfigError::NotFound {
            searched: DEFAULT_CONFIG_FILES.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Reject sources that could never relocate anything
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (idx, source) in self.sources.iter().enumerate() {
            if source.name.trim().is_empty() {
                return Err(ConfigError::invalid(format!("#{}", idx), "name is empty"));
            }
            if source.relocate.trim().is_empty() {
                return Err(ConfigError::invalid(&source.name, "relocate command is empty"));
            }
            if source.glob.is_empty() {
                return Err(ConfigError::invalid(&source.name, "no glob patterns configured"));
            }

            for pattern in &source.glob {
                if let Err(e) = glob::Pattern::new(pattern) {
                    warn!(
                        "Source '{}': pattern {:?} is invalid and will never match: {}",
                        source.name, pattern, e
                    );
                }
            }
        }

        Ok(())
    }

    /// Starter config written by `relocator init`
    pub fn sample_toml() -> &'static str {
        SAMPLE_TOML
    }
}

const SAMPLE_TOML: &str = r#"# relocator configuration
#
# Zero or negative numbers fall back to the defaults shown here.

# Concurrent relocation commands
max_processes = 10

# Seconds between polls of each source
poll_interval = 5

# Seconds a file must keep the same size before it is relocated
stability_interval = 60

# Settled files that may wait for a free worker before watchers block
queue_capacity = 32

# Seconds before a relocation command is killed
command_timeout = 3600

[[sources]]
name = "uploads"
namespace = "default"
class = "incoming"
destination = "/srv/processed"
glob = ["/srv/incoming/*.dat"]
# Invoked as: <relocate> <name> <namespace> <class> <path> <destination>
relocate = "/usr/local/bin/relocate-file"
# stability_interval = 120
# poll_interval = 2
"#;
