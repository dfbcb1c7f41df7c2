//! Runtime configuration loaded from a TOML file.
//!
//! Values missing from the file use defaults; a missing file means all
//! defaults. Command-line flags override whatever is loaded here.

use crate::error::Result;
use clap::ValueEnum;
use serde::Deserialize;
use std::path::Path;

/// Which deployment layout the engine runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Each stage has its own topic subscription; job status is tracked.
    #[default]
    Topic,
    /// Every stage consumes one queue and republishes to it.
    Queue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub variant: Variant,

    /// Queue consumed by every stage in the `queue` variant.
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_queue_name() -> String {
    "jobs".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            variant: Variant::default(),
            queue_name: default_queue_name(),
            log_filter: default_log_filter(),
        }
    }
}

impl RuntimeConfig {
    /// Loads the configuration from `path`, or the defaults when no path is
    /// given or the file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(path)?;
                Ok(toml::from_str(&contents)?)
            }
            _ => Ok(Self::default()),
        }
    }
}
