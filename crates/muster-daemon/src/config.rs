//! Configuration loading

use anyhow::Result;
use muster_adb::AdbConfig;
use muster_discovery::ScanConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub adb: AdbSection,
    #[serde(default)]
    pub discovery: DiscoverySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdbSection {
    /// Path to the adb binary
    #[serde(default = "default_adb_path")]
    pub path: String,
    /// TCP debug port devices listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bound on a single connect attempt in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Device list poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for AdbSection {
    fn default() -> Self {
        Self {
            path: default_adb_path(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

fn default_adb_path() -> String {
    "adb".to_string()
}

fn default_port() -> u16 {
    5555
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_poll_interval() -> u64 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySection {
    /// Probes issued concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Bound on local subnet detection in milliseconds
    #[serde(default = "default_detect_timeout")]
    pub detect_timeout_ms: u64,
    /// Bound on a single probe in milliseconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            detect_timeout_ms: default_detect_timeout(),
            probe_timeout_ms: default_probe_timeout(),
        }
    }
}

fn default_batch_size() -> usize {
    20
}

fn default_detect_timeout() -> u64 {
    1500
}

fn default_probe_timeout() -> u64 {
    1000
}

impl Config {
    pub fn to_adb_config(&self) -> AdbConfig {
        AdbConfig {
            adb_path: self.adb.path.clone(),
            port: self.adb.port,
            connect_timeout_ms: self.adb.connect_timeout_ms,
        }
    }

    pub fn to_scan_config(&self) -> ScanConfig {
        ScanConfig {
            batch_size: self.discovery.batch_size,
            detect_timeout_ms: self.discovery.detect_timeout_ms,
            probe_timeout_ms: self.discovery.probe_timeout_ms,
            use_detection: true,
        }
    }
}

/// Load configuration from file, falling back to defaults when absent
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
