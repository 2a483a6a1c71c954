use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use event_scribe::SinkOptions;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_destination")]
    pub destination: PathBuf,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default)]
    pub events: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destination: default_destination(),
            tag: default_tag(),
            events: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn sink_options(&self) -> SinkOptions {
        SinkOptions {
            destination: self.destination.clone(),
            events: self.events.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_destination() -> PathBuf {
    PathBuf::from("events.log")
}

fn default_tag() -> String {
    "request".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load configuration from a YAML file.
///
/// If the file does not exist a default configuration is returned and a
/// warning is emitted.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "configuration file not found; using defaults"
        );
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

    load_from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))
}

pub fn load_from_str(contents: &str) -> Result<Config, serde_yml::Error> {
    serde_yml::from_str(contents)
}
