// Station list
// Loads, searches and edits the JSON list of internet radio stations

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Description given to stations the user adds by hand
const USER_STATION_DESC: &str = "User station";

/// An internet radio station
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Station {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "streamURL", default)]
    pub stream_url: String,
    #[serde(rename = "imageURL", default)]
    pub image_url: String,
    #[serde(rename = "desc", default)]
    pub description: String,
    #[serde(rename = "longDesc", default)]
    pub long_description: String,
}

impl Station {
    pub fn new(name: impl Into<String>, stream_url: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stream_url: stream_url.into(),
            description: description.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StationsFile {
    #[serde(default)]
    station: Vec<Station>,
}

#[derive(Debug, Clone, Default)]
pub struct StationList {
    stations: Vec<Station>,
}

impl StationList {
    pub fn new(stations: Vec<Station>) -> Self {
        Self { stations }
    }

    /// Load `{"station": [...]}` from disk; a missing file is an empty list
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("No station list at {:?}", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read station list")?;
        let file: StationsFile =
            serde_json::from_str(&content).context("Failed to parse station list")?;

        log::debug!("Loaded {} stations from {:?}", file.station.len(), path);
        Ok(Self::new(file.station))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create station list directory")?;
        }

        let file = StationsFile {
            station: self.stations.clone(),
        };
        let content =
            serde_json::to_string_pretty(&file).context("Failed to serialize station list")?;
        fs::write(path, content).context("Failed to write station list")?;
        Ok(())
    }

    pub fn all(&self) -> &[Station] {
        &self.stations
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Stations whose name contains `text`, ignoring case
    pub fn search(&self, text: &str) -> Vec<&Station> {
        let needle = text.to_lowercase();
        self.stations
            .iter()
            .filter(|station| station.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Exact name match, ignoring case
    pub fn find(&self, name: &str) -> Option<&Station> {
        let needle = name.to_lowercase();
        self.stations
            .iter()
            .find(|station| station.name.to_lowercase() == needle)
    }

    /// Add a station by name and stream URL
    pub fn add(&mut self, name: &str, stream_url: &str) -> Result<()> {
        if name.trim().is_empty() {
            anyhow::bail!("station name must not be empty");
        }
        if !stream_url.starts_with("http://") && !stream_url.starts_with("https://") {
            anyhow::bail!("stream URL must be http(s): {}", stream_url);
        }
        if self.find(name).is_some() {
            anyhow::bail!("a station named '{}' already exists", name);
        }

        self.stations
            .push(Station::new(name.trim(), stream_url, USER_STATION_DESC));
        Ok(())
    }

    /// Remove a station by name; returns whether anything was removed
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.stations.len();
        let needle = name.to_lowercase();
        self.stations.retain(|station| station.name.to_lowercase() != needle);
        self.stations.len() != before
    }
}
