use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use camino::Utf8PathBuf;
use serde_json::json;

use opendata_harvest::catalog::{CatalogClient, MetadataDocument};
use opendata_harvest::convert::{Converter, expected_output};
use opendata_harvest::domain::{DatasetId, SpreadsheetFormat, Year};
use opendata_harvest::download::Downloader;
use opendata_harvest::error::HarvestError;
use opendata_harvest::layout::Layout;
use opendata_harvest::output::JsonOutput;
use opendata_harvest::pipeline::{FailureKind, Pipeline, PipelineOptions, ResourceOutcome};

struct MockCatalog {
    body: serde_json::Value,
    fail: bool,
    calls: RefCell<usize>,
}

impl MockCatalog {
    fn with(body: serde_json::Value) -> Self {
        Self {
            body,
            fail: false,
            calls: RefCell::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            body: json!({}),
            fail: true,
            calls: RefCell::new(0),
        }
    }
}

impl CatalogClient for MockCatalog {
    fn fetch_dataset(&self, _id: &DatasetId) -> Result<MetadataDocument, HarvestError> {
        *self.calls.borrow_mut() += 1;
        if self.fail {
            return Err(HarvestError::MetadataStatus {
                status: 500,
                message: "boom".to_string(),
            });
        }
        Ok(serde_json::from_value(self.body.clone()).unwrap())
    }
}

#[derive(Default)]
struct MockDownloader {
    fail: bool,
    calls: RefCell<Vec<String>>,
}

impl Downloader for MockDownloader {
    fn download(&self, url: &str, destination: &Path) -> Result<(), HarvestError> {
        self.calls.borrow_mut().push(url.to_string());
        if self.fail {
            return Err(HarvestError::DownloadStatus {
                status: 406,
                message: "Not Acceptable".to_string(),
            });
        }
        fs::write(destination, b"spreadsheet-bytes").unwrap();
        Ok(())
    }
}

enum ConvertBehavior {
    Succeed,
    Reject,
    Hang,
}

struct MockConverter {
    behavior: ConvertBehavior,
    calls: RefCell<Vec<PathBuf>>,
}

impl MockConverter {
    fn new(behavior: ConvertBehavior) -> Self {
        Self {
            behavior,
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl Converter for MockConverter {
    fn convert(&self, source: &Path, target_dir: &Path) -> Result<PathBuf, HarvestError> {
        self.calls.borrow_mut().push(source.to_path_buf());
        match self.behavior {
            ConvertBehavior::Succeed => {
                let produced = expected_output(source, target_dir);
                fs::write(&produced, b"col_a,col_b\n1,2\n").unwrap();
                Ok(produced)
            }
            ConvertBehavior::Reject => {
                Err(HarvestError::ConversionFailed("source file could not be loaded".to_string()))
            }
            ConvertBehavior::Hang => Err(HarvestError::ConversionTimeout { seconds: 30 }),
        }
    }
}

fn layout_in(root: &Path) -> Layout {
    let root = Utf8PathBuf::from_path_buf(root.to_path_buf()).unwrap();
    Layout::new(root.join("temp_ods"), root.join("raw"), SpreadsheetFormat::Ods)
}

fn options() -> PipelineOptions {
    PipelineOptions {
        delay: Duration::ZERO,
        verify_archives: false,
    }
}

fn scenario_metadata() -> serde_json::Value {
    json!({
        "success": true,
        "result": {
            "title": "各鄉鎮市區人口密度",
            "distribution": [
                {
                    "resourceDownloadUrl": "https://www.ris.gov.tw/info-popudata/app/awFastDownload/file/104_data.ods",
                    "resourceDescription": "104年資料",
                    "resourceAmount": "500",
                    "resourceFormat": "ODS"
                },
                {
                    "resourceDownloadUrl": "https://www.ris.gov.tw/info-popudata/app/awFastDownload/file/104_data.csv",
                    "resourceDescription": "104年資料",
                    "resourceAmount": "500"
                }
            ]
        }
    })
}

#[test]
fn scenario_converts_and_cleans_up() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout_in(temp.path());
    let pipeline = Pipeline::new(
        MockCatalog::with(scenario_metadata()),
        MockDownloader::default(),
        MockConverter::new(ConvertBehavior::Succeed),
        layout.clone(),
        options(),
    );
    let id: DatasetId = "157217".parse().unwrap();

    let report = pipeline.run(std::slice::from_ref(&id), &JsonOutput);

    let dataset = &report.datasets[0];
    assert_eq!(dataset.dataset_id, "157217");
    assert_eq!(dataset.title.as_deref(), Some("各鄉鎮市區人口密度"));
    assert_eq!(dataset.resources.len(), 1);
    let resource = &dataset.resources[0];
    assert_eq!(resource.year, Year::CommonEra(2015));
    assert_eq!(resource.description, "104年資料");
    assert_eq!(resource.records, "500");
    assert_eq!(resource.outcome, ResourceOutcome::Converted);

    let output = layout.output_path(&id, Year::CommonEra(2015));
    let temp_file = layout.temp_path(&id, Year::CommonEra(2015));
    assert!(output.as_std_path().is_file());
    assert!(output.ends_with("raw/157217/2015.csv"));
    assert!(!temp_file.as_std_path().exists());
    assert!(temp_file.ends_with("temp_ods/157217/2015.ods"));
    assert!(!report.has_failures());
}

#[test]
fn existing_output_skips_network_and_conversion() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout_in(temp.path());
    let id: DatasetId = "157217".parse().unwrap();
    let output = layout.output_path(&id, Year::CommonEra(2015));
    fs::create_dir_all(output.parent().unwrap().as_std_path()).unwrap();
    fs::write(output.as_std_path(), b"already here").unwrap();

    let downloader = MockDownloader::default();
    let converter = MockConverter::new(ConvertBehavior::Succeed);
    let pipeline = Pipeline::new(
        MockCatalog::with(scenario_metadata()),
        downloader,
        converter,
        layout,
        options(),
    );

    let first = pipeline.run(std::slice::from_ref(&id), &JsonOutput);
    let second = pipeline.run(std::slice::from_ref(&id), &JsonOutput);

    for report in [&first, &second] {
        assert_eq!(report.datasets[0].resources[0].outcome, ResourceOutcome::Skipped);
    }
    assert_eq!(fs::read(output.as_std_path()).unwrap(), b"already here");
}

#[test]
fn second_run_performs_no_work() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout_in(temp.path());
    let id: DatasetId = "157217".parse().unwrap();

    let first = Pipeline::new(
        MockCatalog::with(scenario_metadata()),
        MockDownloader::default(),
        MockConverter::new(ConvertBehavior::Succeed),
        layout.clone(),
        options(),
    );
    first.run(std::slice::from_ref(&id), &JsonOutput);

    let downloader = MockDownloader::default();
    let converter = MockConverter::new(ConvertBehavior::Succeed);
    let catalog = MockCatalog::with(scenario_metadata());
    let report = {
        let second = Pipeline::new(&catalog, &downloader, &converter, layout, options());
        second.run(std::slice::from_ref(&id), &JsonOutput)
    };

    assert_eq!(report.datasets[0].resources[0].outcome, ResourceOutcome::Skipped);
    assert!(downloader.calls.borrow().is_empty());
    assert!(converter.calls.borrow().is_empty());
    assert_eq!(*catalog.calls.borrow(), 1);
}

#[test]
fn conversion_failure_retains_download() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout_in(temp.path());
    let id: DatasetId = "157217".parse().unwrap();
    let pipeline = Pipeline::new(
        MockCatalog::with(scenario_metadata()),
        MockDownloader::default(),
        MockConverter::new(ConvertBehavior::Reject),
        layout.clone(),
        options(),
    );

    let report = pipeline.run(std::slice::from_ref(&id), &JsonOutput);

    let outcome = &report.datasets[0].resources[0].outcome;
    assert!(matches!(
        outcome,
        ResourceOutcome::Failed {
            kind: FailureKind::Conversion,
            ..
        }
    ));
    let temp_file = layout.temp_path(&id, Year::CommonEra(2015));
    assert!(temp_file.as_std_path().is_file());
    assert!(!layout.output_path(&id, Year::CommonEra(2015)).as_std_path().exists());
    assert!(report.has_failures());
}

#[test]
fn conversion_timeout_is_reported_distinctly() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout_in(temp.path());
    let id: DatasetId = "157217".parse().unwrap();
    let pipeline = Pipeline::new(
        MockCatalog::with(scenario_metadata()),
        MockDownloader::default(),
        MockConverter::new(ConvertBehavior::Hang),
        layout.clone(),
        options(),
    );

    let report = pipeline.run(std::slice::from_ref(&id), &JsonOutput);

    assert!(matches!(
        report.datasets[0].resources[0].outcome,
        ResourceOutcome::Failed {
            kind: FailureKind::ConversionTimeout,
            ..
        }
    ));
    assert!(layout.temp_path(&id, Year::CommonEra(2015)).as_std_path().is_file());
}

#[test]
fn download_failure_skips_conversion() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout_in(temp.path());
    let id: DatasetId = "157217".parse().unwrap();
    let downloader = MockDownloader {
        fail: true,
        calls: RefCell::new(Vec::new()),
    };
    let converter = MockConverter::new(ConvertBehavior::Succeed);
    let catalog = MockCatalog::with(scenario_metadata());
    let report =
        Pipeline::new(&catalog, &downloader, &converter, layout.clone(), options())
            .run(std::slice::from_ref(&id), &JsonOutput);

    assert!(matches!(
        report.datasets[0].resources[0].outcome,
        ResourceOutcome::Failed {
            kind: FailureKind::Download,
            ..
        }
    ));
    assert_eq!(downloader.calls.borrow().len(), 1);
    assert!(converter.calls.borrow().is_empty());
    assert!(!layout.temp_path(&id, Year::CommonEra(2015)).as_std_path().exists());
}

#[test]
fn corrupt_archive_is_caught_before_conversion() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout_in(temp.path());
    let id: DatasetId = "157217".parse().unwrap();
    let downloader = MockDownloader::default();
    let converter = MockConverter::new(ConvertBehavior::Succeed);
    let catalog = MockCatalog::with(scenario_metadata());
    let report = Pipeline::new(
        &catalog,
        &downloader,
        &converter,
        layout.clone(),
        PipelineOptions {
            delay: Duration::ZERO,
            verify_archives: true,
        },
    )
    .run(std::slice::from_ref(&id), &JsonOutput);

    assert!(matches!(
        report.datasets[0].resources[0].outcome,
        ResourceOutcome::Failed {
            kind: FailureKind::InvalidDownload,
            ..
        }
    ));
    assert!(converter.calls.borrow().is_empty());
    assert!(layout.temp_path(&id, Year::CommonEra(2015)).as_std_path().is_file());
}

#[test]
fn metadata_failure_does_not_stop_the_run() {
    let temp = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        MockCatalog::failing(),
        MockDownloader::default(),
        MockConverter::new(ConvertBehavior::Succeed),
        layout_in(temp.path()),
        options(),
    );
    let ids = ["157217", "152223"]
        .iter()
        .map(|id| id.parse::<DatasetId>().unwrap())
        .collect::<Vec<_>>();

    let report = pipeline.run(&ids, &JsonOutput);

    assert_eq!(report.datasets.len(), 2);
    for dataset in &report.datasets {
        assert!(dataset.error.as_deref().unwrap().contains("500"));
        assert!(dataset.resources.is_empty());
    }
    assert!(report.has_failures());
}

#[test]
fn missing_result_means_no_resources() {
    let temp = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        MockCatalog::with(json!({"success": false})),
        MockDownloader::default(),
        MockConverter::new(ConvertBehavior::Succeed),
        layout_in(temp.path()),
        options(),
    );
    let id: DatasetId = "156470".parse().unwrap();

    let report = pipeline.run(std::slice::from_ref(&id), &JsonOutput);

    assert!(report.datasets[0].error.is_none());
    assert!(report.datasets[0].resources.is_empty());
    assert!(!report.has_failures());
}
