use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::domain::DatasetId;
use crate::error::HarvestError;

pub const DEFAULT_API_BASE: &str = "https://data.gov.tw/api/v2/rest/dataset";
pub const CATALOG_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Sentinel used when a distribution does not declare its record count.
pub const UNKNOWN_AMOUNT: &str = "N/A";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataDocument {
    #[serde(default)]
    pub result: Option<DatasetResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetResult {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub distribution: Vec<Distribution>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    #[serde(default)]
    pub resource_download_url: String,
    #[serde(default)]
    pub resource_description: String,
    #[serde(default, deserialize_with = "amount_as_string")]
    pub resource_amount: Option<String>,
}

impl MetadataDocument {
    pub fn distributions(&self) -> &[Distribution] {
        self.result
            .as_ref()
            .map(|result| result.distribution.as_slice())
            .unwrap_or_default()
    }

    pub fn title(&self) -> Option<&str> {
        self.result.as_ref().and_then(|result| result.title.as_deref())
    }
}

// The API serves the amount as a string most of the time, occasionally as a
// bare number.
fn amount_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

pub trait CatalogClient {
    fn fetch_dataset(&self, id: &DatasetId) -> Result<MetadataDocument, HarvestError>;
}

impl<T: CatalogClient + ?Sized> CatalogClient for &T {
    fn fetch_dataset(&self, id: &DatasetId) -> Result<MetadataDocument, HarvestError> {
        (**self).fetch_dataset(id)
    }
}

#[derive(Clone)]
pub struct CatalogHttpClient {
    client: Client,
    api_base: String,
}

impl CatalogHttpClient {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CATALOG_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| HarvestError::MetadataHttp(err.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn dataset_url(&self, id: &DatasetId) -> String {
        format!("{}/{}", self.api_base, id.as_str())
    }
}

impl CatalogClient for CatalogHttpClient {
    fn fetch_dataset(&self, id: &DatasetId) -> Result<MetadataDocument, HarvestError> {
        let url = self.dataset_url(id);
        tracing::info!(dataset = %id, %url, "fetching dataset metadata");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| HarvestError::MetadataHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "metadata request failed".to_string());
            return Err(HarvestError::MetadataStatus { status, message });
        }
        let body = response
            .text()
            .map_err(|err| HarvestError::MetadataHttp(err.to_string()))?;
        serde_json::from_str(&body).map_err(|err| HarvestError::MetadataParse(err.to_string()))
    }
}
