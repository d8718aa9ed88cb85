//! Act coordinator configuration

use std::path::{Path, PathBuf};

use eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default bound on passes in one fixed-point flush
pub const DEFAULT_MAX_FLUSH_PASSES: usize = 1000;

/// Act coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActConfig {
    /// Max passes a single fixed-point flush may take before failing
    #[serde(default = "default_max_flush_passes")]
    pub max_flush_passes: usize,

    /// Report updates made while no act scope is active
    #[serde(default = "default_true")]
    pub warn_unwrapped_updates: bool,

    /// Report asynchronous scopes whose result is never awaited
    #[serde(default = "default_true")]
    pub warn_unawaited: bool,

    /// Log level for binaries embedding the coordinator
    #[serde(default)]
    pub log_level: Option<String>,
}

fn default_max_flush_passes() -> usize {
    DEFAULT_MAX_FLUSH_PASSES
}

fn default_true() -> bool {
    true
}

impl Default for ActConfig {
    fn default() -> Self {
        Self {
            max_flush_passes: DEFAULT_MAX_FLUSH_PASSES,
            warn_unwrapped_updates: true,
            warn_unawaited: true,
            log_level: None,
        }
    }
}

impl ActConfig {
    /// Load config from file, or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        debug!(?path, "ActConfig::load: called");
        if let Some(config_path) = path {
            debug!(?config_path, "ActConfig::load: explicit path");
            let content = std::fs::read_to_string(config_path)?;
            let config: ActConfig = serde_yaml::from_str(&content)?;
            return Ok(config);
        }

        // Try default locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("actcoord").join("config.yml")),
            Some(PathBuf::from("actcoord.yml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                debug!(?path, "ActConfig::load: found default location");
                let content = std::fs::read_to_string(path)?;
                let config: ActConfig = serde_yaml::from_str(&content)?;
                return Ok(config);
            }
        }

        debug!("ActConfig::load: no config file, using defaults");
        Ok(ActConfig::default())
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        debug!(?path, "ActConfig::save: called");
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
