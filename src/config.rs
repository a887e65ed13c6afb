use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::DatasetId;
use crate::error::LabelerError;

pub const DEFAULT_CONFIG_FILE: &str = "ipeds-labeler.json";
pub const DEFAULT_BASE_URL: &str = "https://nces.ed.gov/ipeds/datacenter/data/";
pub const DEFAULT_REQUEST_PAUSE_MS: u64 = 2000;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub request_pause_ms: Option<u64>,
    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DatasetEntry {
    Shorthand(String),
    Detailed(DatasetEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatasetEntryObject {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub base_url: String,
    pub workdir: Utf8PathBuf,
    pub request_pause: Duration,
    pub datasets: Vec<DatasetId>,
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub datasets: Vec<String>,
    pub base_url: Option<String>,
    pub workdir: Option<String>,
    pub request_pause_ms: Option<u64>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the config file and applies command-line overrides. A missing
    /// default config file is treated as an empty config.
    pub fn resolve_with_overrides(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, LabelerError> {
        let mut config = match Self::load(path) {
            Err(LabelerError::MissingConfig) => Config::default(),
            other => other?,
        };

        if !overrides.datasets.is_empty() {
            config.datasets = overrides
                .datasets
                .into_iter()
                .map(DatasetEntry::Shorthand)
                .collect();
        }
        if overrides.base_url.is_some() {
            config.base_url = overrides.base_url;
        }
        if overrides.workdir.is_some() {
            config.workdir = overrides.workdir;
        }
        if overrides.request_pause_ms.is_some() {
            config.request_pause_ms = overrides.request_pause_ms;
        }
        Self::resolve_config(config)
    }

    fn load(path: Option<&str>) -> Result<Config, LabelerError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(LabelerError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| LabelerError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| LabelerError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, LabelerError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let datasets = config
            .datasets
            .into_iter()
            .map(|entry| match entry {
                DatasetEntry::Shorthand(value) => value.parse(),
                DatasetEntry::Detailed(obj) => obj.id.parse(),
            })
            .collect::<Result<Vec<DatasetId>, LabelerError>>()?;

        let mut base_url = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(ResolvedConfig {
            schema_version,
            base_url,
            workdir: Utf8PathBuf::from(config.workdir.unwrap_or_else(|| ".".to_string())),
            request_pause: Duration::from_millis(
                config.request_pause_ms.unwrap_or(DEFAULT_REQUEST_PAUSE_MS),
            ),
            datasets,
        })
    }
}
