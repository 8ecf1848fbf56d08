use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::catalog::DEFAULT_API_BASE;
use crate::domain::{DatasetId, SpreadsheetFormat};
use crate::error::HarvestError;
use crate::layout::Layout;

pub const DEFAULT_CONFIG_FILE: &str = "opendata-harvest.json";
pub const DEFAULT_DATASETS: [&str; 3] = ["157217", "152223", "156470"];

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub datasets: Vec<String>,
    #[serde(default)]
    pub format: Option<SpreadsheetFormat>,
    #[serde(default)]
    pub temp_dir: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub converter: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub convert_timeout_secs: Option<u64>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub verify_archives: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub api_base: String,
    pub datasets: Vec<DatasetId>,
    pub format: SpreadsheetFormat,
    pub temp_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub converter: Option<String>,
    pub request_timeout: Duration,
    pub convert_timeout: Duration,
    pub delay: Duration,
    pub verify_archives: bool,
}

impl ResolvedConfig {
    pub fn layout(&self) -> Layout {
        Layout::new(self.temp_dir.clone(), self.output_dir.clone(), self.format)
    }

    /// Ids from the config file, or the built-in list when it names none.
    pub fn datasets_or_default(&self) -> Vec<DatasetId> {
        if !self.datasets.is_empty() {
            return self.datasets.clone();
        }
        DEFAULT_DATASETS
            .iter()
            .filter_map(|id| id.parse().ok())
            .collect()
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicitly named file must exist; the default file is optional.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, HarvestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| HarvestError::ConfigParse(err.to_string()))?;
        tracing::debug!(path = %config_path.display(), "loaded config");

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, HarvestError> {
        let format = config.format.unwrap_or(SpreadsheetFormat::Ods);
        let datasets = config
            .datasets
            .iter()
            .map(|id| id.parse())
            .collect::<Result<Vec<DatasetId>, HarvestError>>()?;

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            api_base: config
                .api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            datasets,
            format,
            temp_dir: config
                .temp_dir
                .map(Utf8PathBuf::from)
                .unwrap_or_else(|| Layout::default_temp_root(format)),
            output_dir: config
                .output_dir
                .map(Utf8PathBuf::from)
                .unwrap_or_else(|| Utf8PathBuf::from("raw")),
            converter: config.converter,
            request_timeout: Duration::from_secs(config.request_timeout_secs.unwrap_or(30)),
            convert_timeout: Duration::from_secs(config.convert_timeout_secs.unwrap_or(30)),
            delay: Duration::from_millis(config.delay_ms.unwrap_or(1000)),
            verify_archives: config.verify_archives.unwrap_or(true),
        })
    }
}
