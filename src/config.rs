// Configuration management module
// Handles loading, saving, and validating configuration

use crate::scrobbler::request::Period;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Timeout in seconds for each Last.fm request
    pub request_timeout: u64,

    /// Delay in seconds before announcing a successful scrobble
    pub scrobble_notify_delay: u64,

    /// Station list (JSON); defaults to `stations.json` next to the config file
    #[serde(default)]
    pub stations_file: Option<PathBuf>,

    /// Text cleanup configuration
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Chart defaults
    #[serde(default)]
    pub chart: ChartConfig,

    /// Last.fm API account
    pub lastfm: LastFmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Enable text cleanup
    pub enabled: bool,

    /// Regex patterns to remove from stream artist/title text
    /// Applied in order, each pattern is removed from the text
    pub patterns: Vec<String>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: vec![
                r"\s*\[Explicit\]".to_string(),
                r"\s*\[Clean\]".to_string(),
                r"\s*\(Explicit\)".to_string(),
                r"\s*\(Clean\)".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    /// One of 7day, 1month, 3month, 6month, 12month, overall
    pub period: String,

    /// Number of artists to show
    pub limit: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            period: Period::Week.to_string(),
            limit: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LastFmConfig {
    pub api_key: String,
    pub api_secret: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout: 10,
            scrobble_notify_delay: 4,
            stations_file: None,
            cleanup: CleanupConfig::default(),
            chart: ChartConfig::default(),
            lastfm: LastFmConfig::default(),
        }
    }
}

impl Config {
    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;

        Ok(config_dir.join("radio_scrobbler.conf"))
    }

    /// Load configuration from the default path, creating it if needed
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from file, or create default if it doesn't exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            log::info!("Config file not found, creating default at {:?}", config_path);
            let default_config = Self::default();
            default_config.save_to(config_path)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(config_path, content).context("Failed to write config file")?;

        log::info!("Config saved to {:?}", config_path);

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout == 0 {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        if self.chart.limit == 0 {
            anyhow::bail!("chart.limit must be greater than 0");
        }

        self.chart_period()?;

        if self.lastfm.api_key.is_empty() || self.lastfm.api_secret.is_empty() {
            log::warn!("Last.fm api_key/api_secret are not set; Last.fm features are unavailable");
        }

        Ok(())
    }

    /// Ensure the Last.fm API account is configured
    pub fn require_lastfm(&self) -> Result<&LastFmConfig> {
        if self.lastfm.api_key.is_empty() {
            anyhow::bail!("Last.fm api_key is required (get one at https://www.last.fm/api)");
        }
        if self.lastfm.api_secret.is_empty() {
            anyhow::bail!("Last.fm api_secret is required");
        }
        Ok(&self.lastfm)
    }

    pub fn chart_period(&self) -> Result<Period> {
        self.chart.period.parse()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn scrobble_notify_delay(&self) -> Duration {
        Duration::from_secs(self.scrobble_notify_delay)
    }

    /// Station list path, defaulting to `stations.json` beside the config file
    pub fn stations_path(&self) -> Result<PathBuf> {
        match &self.stations_file {
            Some(path) => Ok(path.clone()),
            None => {
                let config_dir = dirs::config_dir().context("Failed to get config directory")?;
                Ok(config_dir.join("radio-scrobbler").join("stations.json"))
            }
        }
    }
}
