use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::catalog::{MetadataDocument, UNKNOWN_AMOUNT};
use crate::domain::{SpreadsheetFormat, Year};

// ASCII and full-width digits both occur in catalog text.
static FILENAME_ROC_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9０-９]{3})").unwrap());
static DESCRIPTION_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9０-９]{3,4})年").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceDescriptor {
    pub url: String,
    pub year: Year,
    pub description: String,
    pub records: String,
}

/// Collects one descriptor per distribution whose download URL carries the
/// requested spreadsheet extension.
pub fn extract_resources(
    document: &MetadataDocument,
    format: SpreadsheetFormat,
) -> Vec<ResourceDescriptor> {
    document
        .distributions()
        .iter()
        .filter(|dist| format.matches_url(&dist.resource_download_url))
        .map(|dist| ResourceDescriptor {
            url: dist.resource_download_url.clone(),
            year: derive_year(&dist.resource_download_url, &dist.resource_description),
            description: dist.resource_description.clone(),
            records: dist
                .resource_amount
                .clone()
                .unwrap_or_else(|| UNKNOWN_AMOUNT.to_string()),
        })
        .collect()
}

/// Filename prefix wins over prose: `104_x.ods` is ROC 104, otherwise the
/// first `NNN年`/`NNNN年` in the description, otherwise unknown.
pub fn derive_year(url: &str, description: &str) -> Year {
    if let Some(year) = year_from_filename(url_basename(url)) {
        return year;
    }
    year_from_description(description).unwrap_or(Year::Unknown)
}

pub fn url_basename(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

fn year_from_filename(basename: &str) -> Option<Year> {
    let caps = FILENAME_ROC_PREFIX.captures(basename)?;
    let roc = parse_digits(&caps[1])?;
    Some(Year::from_roc(roc))
}

fn year_from_description(description: &str) -> Option<Year> {
    let caps = DESCRIPTION_YEAR.captures(description)?;
    let digits = &caps[1];
    let value = parse_digits(digits)?;
    if digits.chars().count() == 3 {
        Some(Year::from_roc(value))
    } else {
        Some(Year::CommonEra(value))
    }
}

fn parse_digits(digits: &str) -> Option<u16> {
    digits.chars().try_fold(0u16, |acc, ch| {
        let digit = match ch {
            '0'..='9' => ch.to_digit(10)?,
            '０'..='９' => u32::from(ch) - u32::from('０'),
            _ => return None,
        };
        acc.checked_mul(10)?.checked_add(u16::try_from(digit).ok()?)
    })
}
