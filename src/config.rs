//! `windowtrail.toml`, created with defaults on first use.
//!
//! ```toml
//! [general]
//! buffer_size = 500
//! write_interval = 3
//! excluded_processes = "explorer.exe,SystemSettings.exe"
//! poll_interval = 1
//! log_retention_days = 30
//!
//! [office]
//! office_cache_timeout = 5
//! office_retry_interval = 5
//! office_com_timeout = 30
//! cache_capacity = 50
//!
//! [selector]
//! error_threshold = 5
//! error_reset_interval = 60
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const CONFIG_FILE_NAME: &str = "windowtrail.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub buffer_size: usize,
    /// Seconds between forced flushes.
    pub write_interval: u64,
    /// Comma separated process names.
    pub excluded_processes: String,
    pub poll_interval: u64,
    pub log_retention_days: usize,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            buffer_size: 500,
            write_interval: 3,
            excluded_processes: "explorer.exe,SystemSettings.exe".into(),
            poll_interval: 1,
            log_retention_days: 30,
        }
    }
}

impl GeneralSettings {
    pub fn excluded_processes(&self) -> Vec<String> {
        self.excluded_processes
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn write_interval(&self) -> Duration {
        Duration::from_secs(self.write_interval.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfficeSettings {
    /// Seconds a resolved document stays in the cache.
    pub office_cache_timeout: u64,
    /// Minimum seconds between reconnect attempts.
    pub office_retry_interval: u64,
    /// Seconds of inactivity after which an automation session is released.
    pub office_com_timeout: u64,
    pub cache_capacity: usize,
}

impl Default for OfficeSettings {
    fn default() -> Self {
        Self {
            office_cache_timeout: 5,
            office_retry_interval: 5,
            office_com_timeout: 30,
            cache_capacity: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub error_threshold: u32,
    /// Seconds between resets of all detector error counters.
    pub error_reset_interval: u64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            error_threshold: 5,
            error_reset_interval: 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub office: OfficeSettings,
    pub selector: SelectorConfig,
}

pub struct Config {
    path: PathBuf,
    values: toml::Table,
    defaults: toml::Table,
    settings: Settings,
}

fn to_table(settings: &Settings) -> Result<toml::Table> {
    match toml::Value::try_from(settings)? {
        toml::Value::Table(v) => Ok(v),
        other => bail!("Settings serialized into {}", other.type_str()),
    }
}

impl Config {
    /// Reads the config at `path`, writing the defaults there first if it doesn't exist.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = toml::to_string_pretty(&Settings::default())?;
            std::fs::write(path, content)
                .with_context(|| format!("Failed to create default config {path:?}"))?;
            info!("Created default config {path:?}");
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {path:?}"))?;
        let values: toml::Table = content
            .parse()
            .with_context(|| format!("Config {path:?} is not valid toml"))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Config {path:?} has invalid values"))?;
        debug!("Loaded config {settings:?}");

        Ok(Self {
            path: path.to_path_buf(),
            values,
            defaults: to_table(&Settings::default())?,
            settings,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Raw value of `key` in `[section]`. Keys missing from the file resolve to their default.
    pub fn get_value(&self, section: &str, key: &str) -> Result<String> {
        let lookup = |table: &toml::Table| {
            table
                .get(section)
                .and_then(toml::Value::as_table)
                .and_then(|v| v.get(key))
                .map(|v| match v {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
        };
        lookup(&self.values)
            .or_else(|| lookup(&self.defaults))
            .ok_or_else(|| anyhow!("Unknown config key [{section}] {key}"))
    }
}
