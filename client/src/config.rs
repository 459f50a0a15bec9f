//! Configuration file parser for the figbridge CLI
//!
//! Supports figbridge-cli.yml with the bridge address and the
//! polling interval used by `poll --follow`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Bridge base URL
    #[serde(default = "default_bridge")]
    pub bridge: String,

    /// Seconds between polls in follow mode
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            bridge: default_bridge(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

fn default_bridge() -> String {
    "http://localhost:3055".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

impl CliConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: CliConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(self.bridge.starts_with("http://") || self.bridge.starts_with("https://")) {
            anyhow::bail!("bridge must be an http(s) URL, got '{}'", self.bridge);
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be at least 1");
        }
        Ok(())
    }

    /// Search for config file in standard locations
    pub fn find_config() -> Option<PathBuf> {
        let candidates = ["figbridge-cli.yml", "figbridge-cli.yaml", ".figbridge-cli.yml"];

        for name in &candidates {
            let path = PathBuf::from(name);
            if path.exists() {
                return Some(path);
            }
        }

        let home = dirs::home_dir()?;
        candidates.iter().map(|name| home.join(name)).find(|path| path.exists())
    }

    /// Load the discovered config file, or defaults when there is none
    pub fn discover() -> Result<Self> {
        match Self::find_config() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }
}
