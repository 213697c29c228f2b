// src/config.rs

use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CleanerError, Result};

pub const CONFIG_ENV_VAR: &str = "SKRIPCLEAN_CONFIG";

/// Folder names pruned from oversized-folder scans unless the caller overrides them.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    "Windows",
    "Program Files",
    "Program Files (x86)",
    "ProgramData",
    "System Volume Information",
    "$Recycle.Bin",
    "AppData",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanerConfig {
    // Size cache
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64, // Default: 3600 seconds
    #[serde(default)]
    pub cache_dir: Option<PathBuf>, // Default: app-local `cache`, then per-user data dir

    // Folder scan
    #[serde(default = "default_exclusions")]
    pub exclusions: Vec<String>,
    #[serde(default = "default_parallel_scans")]
    pub max_parallel_scans: usize, // Default: num_cpus::get()

    // Cleanup
    #[serde(default)]
    pub rules_file: Option<PathBuf>, // Default: embedded rule table
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_exclusions() -> Vec<String> {
    DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect()
}

fn default_parallel_scans() -> usize {
    num_cpus::get()
}

impl Default for CleanerConfig {
    fn default() -> Self {
        CleanerConfig {
            cache_ttl_secs: default_cache_ttl(),
            cache_dir: None,
            exclusions: default_exclusions(),
            max_parallel_scans: default_parallel_scans(),
            rules_file: None,
        }
    }
}

impl CleanerConfig {
    /// Defaults, or the JSON document named by `SKRIPCLEAN_CONFIG`.
    pub fn load() -> Result<Self> {
        match env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(PathBuf::from(path)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: PathBuf) -> Result<Self> {
        let raw = fs::read_to_string(&path).map_err(|e| {
            CleanerError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: CleanerConfig = serde_json::from_str(raw)
            .map_err(|e| CleanerError::InvalidConfig(format!("malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_secs == 0 {
            return Err(CleanerError::InvalidConfig(
                "cache_ttl_secs must be positive".into(),
            ));
        }
        if self.max_parallel_scans == 0 {
            return Err(CleanerError::InvalidConfig(
                "max_parallel_scans must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
