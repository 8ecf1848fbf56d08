use serde_json::json;

use opendata_harvest::catalog::MetadataDocument;
use opendata_harvest::domain::{SpreadsheetFormat, Year};
use opendata_harvest::extract::{derive_year, extract_resources};

fn document(value: serde_json::Value) -> MetadataDocument {
    serde_json::from_value(value).unwrap()
}

#[test]
fn scenario_descriptor() {
    let doc = document(json!({"result": {"distribution": [{
        "resourceDownloadUrl": "https://data.gov.tw/files/104_data.ods",
        "resourceDescription": "104年資料",
        "resourceAmount": "500"
    }]}}));

    let resources = extract_resources(&doc, SpreadsheetFormat::Ods);
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].url, "https://data.gov.tw/files/104_data.ods");
    assert_eq!(resources[0].year, Year::CommonEra(2015));
    assert_eq!(resources[0].year.to_string(), "2015");
    assert_eq!(resources[0].description, "104年資料");
    assert_eq!(resources[0].records, "500");
}

#[test]
fn filters_by_extension_case_insensitively() {
    let doc = document(json!({"result": {"distribution": [
        {"resourceDownloadUrl": "https://x/110_A.ODS", "resourceDescription": "", "resourceAmount": "1"},
        {"resourceDownloadUrl": "https://x/110_a.csv", "resourceDescription": "110年", "resourceAmount": "1"},
        {"resourceDownloadUrl": "https://x/110_a.xlsx", "resourceDescription": "110年", "resourceAmount": "1"},
        {"resourceDescription": "no url at all"}
    ]}}));

    let ods = extract_resources(&doc, SpreadsheetFormat::Ods);
    assert_eq!(ods.len(), 1);
    assert_eq!(ods[0].url, "https://x/110_A.ODS");

    let xlsx = extract_resources(&doc, SpreadsheetFormat::Xlsx);
    assert_eq!(xlsx.len(), 1);
    assert_eq!(xlsx[0].year, Year::CommonEra(2021));
}

#[test]
fn missing_amount_uses_sentinel() {
    let doc = document(json!({"result": {"distribution": [
        {"resourceDownloadUrl": "https://x/data.ods", "resourceDescription": "統計表"}
    ]}}));

    let resources = extract_resources(&doc, SpreadsheetFormat::Ods);
    assert_eq!(resources[0].records, "N/A");
    assert_eq!(resources[0].year, Year::Unknown);
    assert_eq!(resources[0].year.to_string(), "unknown");
}

#[test]
fn year_derivation_fallback_order() {
    assert_eq!(derive_year("https://x/104_foo.ods", ""), Year::CommonEra(2015));
    assert_eq!(
        derive_year("https://x/population.ods", "112年各縣市資料"),
        Year::CommonEra(2023)
    );
    assert_eq!(derive_year("https://x/population.ods", "人口資料"), Year::Unknown);
}

#[test]
fn directory_digits_do_not_count() {
    assert_eq!(
        derive_year("https://x/104/population.ods", "民國100年"),
        Year::CommonEra(2011)
    );
}

#[test]
fn full_width_description_year() {
    let doc = document(json!({"result": {"distribution": [{
        "resourceDownloadUrl": "https://data.gov.tw/files/population.ods",
        "resourceDescription": "１０４年資料",
        "resourceAmount": "12"
    }]}}));

    let resources = extract_resources(&doc, SpreadsheetFormat::Ods);
    assert_eq!(resources[0].year, Year::CommonEra(2015));
}
