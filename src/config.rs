//! Runtime settings read from the environment (and `.env`, loaded by the binary).

use anyhow::{Context, Result};

use crate::enrich::DEFAULT_COUNTRY;
use crate::geocode::DEFAULT_BASE_URL;

pub const DEFAULT_LOG_FILE: &str = "logs/cardio_ingest.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Mapbox token; geocoding is disabled without one.
    pub mapbox_access_token: Option<String>,
    pub geocode_base_url: String,
    pub geocode_country: String,
    pub geocode_concurrency: usize,
    pub log_file_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mapbox_access_token: None,
            geocode_base_url: DEFAULT_BASE_URL.to_string(),
            geocode_country: DEFAULT_COUNTRY.to_string(),
            geocode_concurrency: 1,
            log_file_path: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let geocode_concurrency = match get("GEOCODE_CONCURRENCY") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .with_context(|| {
                    format!("GEOCODE_CONCURRENCY must be a positive integer, got '{raw}'")
                })?
                .max(1),
            None => defaults.geocode_concurrency,
        };

        Ok(Self {
            mapbox_access_token: get("MAPBOX_ACCESS_TOKEN"),
            geocode_base_url: get("GEOCODE_BASE_URL").unwrap_or(defaults.geocode_base_url),
            geocode_country: get("GEOCODE_COUNTRY").unwrap_or(defaults.geocode_country),
            geocode_concurrency,
            log_file_path: get("LOG_FILE_PATH").unwrap_or(defaults.log_file_path),
        })
    }

    pub fn geocoding_enabled(&self) -> bool {
        self.mapbox_access_token.is_some()
    }
}
