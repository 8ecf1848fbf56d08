use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::HarvestError;

/// Offset between the ROC (Minguo) calendar and the common era.
pub const ROC_YEAR_OFFSET: u16 = 1911;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SpreadsheetFormat {
    Ods,
    Xlsx,
    Xls,
}

impl SpreadsheetFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SpreadsheetFormat::Ods => "ods",
            SpreadsheetFormat::Xlsx => "xlsx",
            SpreadsheetFormat::Xls => "xls",
        }
    }

    /// ODF and OOXML documents are zip containers; legacy `.xls` is not.
    pub fn is_zip_container(self) -> bool {
        matches!(self, SpreadsheetFormat::Ods | SpreadsheetFormat::Xlsx)
    }

    pub fn matches_url(self, url: &str) -> bool {
        let needle = format!(".{}", self.extension());
        url.to_lowercase().contains(&needle)
    }
}

impl fmt::Display for SpreadsheetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for SpreadsheetFormat {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "ods" => Ok(SpreadsheetFormat::Ods),
            "xlsx" => Ok(SpreadsheetFormat::Xlsx),
            "xls" => Ok(SpreadsheetFormat::Xls),
            _ => Err(HarvestError::InvalidFormat(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetId(String);

impl DatasetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && !matches!(normalized, "." | "..")
            && !normalized
                .chars()
                .any(|ch| ch.is_whitespace() || matches!(ch, '/' | '?' | '#' | '%'));
        if !is_valid {
            return Err(HarvestError::InvalidDatasetId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for DatasetId {
    type Error = HarvestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DatasetId> for String {
    fn from(value: DatasetId) -> Self {
        value.0
    }
}

/// Normalized common-era year of a resource, or `unknown` when neither the
/// filename nor the description carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Year {
    CommonEra(u16),
    Unknown,
}

impl Year {
    pub fn from_roc(roc: u16) -> Self {
        Year::CommonEra(roc + ROC_YEAR_OFFSET)
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Year::CommonEra(year) => write!(f, "{year}"),
            Year::Unknown => write!(f, "unknown"),
        }
    }
}

impl Serialize for Year {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
