use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::models::Coordinates;
use crate::pipeline::{DEFAULT_PAGE_SIZE, DEFAULT_RADIUS_KM};

pub const CONFIG_FILE: &str = "config.json";

/// Template written by `civic init`.
pub const DEFAULT_CONFIG: &str = include_str!("../resources/config.json");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeocoderProvider {
    /// Offline keyword table with a jittered fallback.
    #[default]
    Keyword,
    /// OpenStreetMap Nominatim over HTTP.
    Nominatim,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub provider: GeocoderProvider,
    pub nominatim_url: String,
    pub user_agent: String,
    /// Minimum spacing between consecutive lookups.
    pub min_interval_ms: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        GeocoderConfig {
            provider: GeocoderProvider::Keyword,
            nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: "civic-reports/0.1".to_string(),
            min_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub page_size: usize,
    pub search_radius_km: f64,
    /// Centre used when a geocode has nothing better to offer.
    pub default_location: Coordinates,
    pub geocoder: GeocoderConfig,
    /// Prefix for upload paths that are not already absolute URLs.
    pub upload_base_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            page_size: DEFAULT_PAGE_SIZE,
            search_radius_km: DEFAULT_RADIUS_KM,
            default_location: Coordinates::new(40.7128, -74.0060),
            geocoder: GeocoderConfig::default(),
            upload_base_url: None,
        }
    }
}

impl Config {
    /// Reads `config.json` from the data directory, falling back to defaults
    /// when the file does not exist.
    pub fn load(civic_dir: &Path) -> Result<Self> {
        let path = civic_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }
}
