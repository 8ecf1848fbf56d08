use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use serde::Serialize;

use crate::catalog::CatalogClient;
use crate::convert::{Converter, convert_to_path};
use crate::domain::{DatasetId, Year};
use crate::download::Downloader;
use crate::error::HarvestError;
use crate::extract::{ResourceDescriptor, extract_resources};
use crate::fs_util;
use crate::layout::Layout;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Courtesy pause after every attempted resource.
    pub delay: Duration,
    pub verify_archives: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            verify_archives: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Download,
    InvalidDownload,
    Conversion,
    ConversionTimeout,
    Filesystem,
}

impl FailureKind {
    pub fn classify(error: &HarvestError) -> Self {
        match error {
            HarvestError::DownloadHttp(_) | HarvestError::DownloadStatus { .. } => {
                FailureKind::Download
            }
            HarvestError::InvalidDownload(_) => FailureKind::InvalidDownload,
            HarvestError::ConversionTimeout { .. } => FailureKind::ConversionTimeout,
            HarvestError::ConverterMissing(_)
            | HarvestError::ConversionFailed(_)
            | HarvestError::ConvertedOutputMissing(_) => FailureKind::Conversion,
            _ => FailureKind::Filesystem,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResourceOutcome {
    Skipped,
    Converted,
    Failed { kind: FailureKind, message: String },
}

impl ResourceOutcome {
    fn from_result(result: Result<(), HarvestError>) -> Self {
        match result {
            Ok(()) => ResourceOutcome::Converted,
            Err(err) => ResourceOutcome::Failed {
                kind: FailureKind::classify(&err),
                message: err.to_string(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ResourceOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceReport {
    pub url: String,
    pub year: Year,
    pub description: String,
    pub records: String,
    pub temp_path: String,
    pub output_path: String,
    pub outcome: ResourceOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetReport {
    pub dataset_id: String,
    pub title: Option<String>,
    pub error: Option<String>,
    pub resources: Vec<ResourceReport>,
}

impl DatasetReport {
    pub fn failed_resources(&self) -> usize {
        self.resources
            .iter()
            .filter(|resource| resource.outcome.is_failure())
            .count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: String,
    pub finished_at: String,
    pub datasets: Vec<DatasetReport>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.datasets
            .iter()
            .any(|dataset| dataset.error.is_some() || dataset.failed_resources() > 0)
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct Pipeline<C: CatalogClient, D: Downloader, V: Converter> {
    catalog: C,
    downloader: D,
    converter: V,
    layout: Layout,
    options: PipelineOptions,
}

impl<C: CatalogClient, D: Downloader, V: Converter> Pipeline<C, D, V> {
    pub fn new(
        catalog: C,
        downloader: D,
        converter: V,
        layout: Layout,
        options: PipelineOptions,
    ) -> Self {
        Self {
            catalog,
            downloader,
            converter,
            layout,
            options,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Processes every dataset in order. A failing dataset never stops the
    /// ones after it.
    pub fn run(&self, ids: &[DatasetId], sink: &dyn ProgressSink) -> RunReport {
        let started_at = iso_timestamp();
        let datasets = ids
            .iter()
            .map(|id| self.process_dataset(id, sink))
            .collect();
        sink.event(ProgressEvent {
            message: "run complete".to_string(),
            elapsed: None,
        });
        RunReport {
            started_at,
            finished_at: iso_timestamp(),
            datasets,
        }
    }

    /// Fetch and extract only.
    pub fn resources(&self, id: &DatasetId) -> Result<Vec<ResourceDescriptor>, HarvestError> {
        let document = self.catalog.fetch_dataset(id)?;
        Ok(extract_resources(&document, self.layout.format()))
    }

    pub fn process_dataset(&self, id: &DatasetId, sink: &dyn ProgressSink) -> DatasetReport {
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; dataset {id}"),
            elapsed: None,
        });
        let document = match self.catalog.fetch_dataset(id) {
            Ok(document) => document,
            Err(err) => {
                tracing::warn!(dataset = %id, error = %err, "skipping dataset");
                return DatasetReport {
                    dataset_id: id.to_string(),
                    title: None,
                    error: Some(err.to_string()),
                    resources: Vec::new(),
                };
            }
        };

        let resources = extract_resources(&document, self.layout.format());
        tracing::info!(
            dataset = %id,
            title = document.title().unwrap_or_default(),
            count = resources.len(),
            "found {} resources",
            self.layout.format()
        );
        sink.event(ProgressEvent {
            message: format!("phase=Extract; {} resources", resources.len()),
            elapsed: None,
        });

        let reports = resources
            .iter()
            .map(|resource| self.process_resource(id, resource, sink))
            .collect();

        DatasetReport {
            dataset_id: id.to_string(),
            title: document.title().map(str::to_string),
            error: None,
            resources: reports,
        }
    }

    fn process_resource(
        &self,
        id: &DatasetId,
        resource: &ResourceDescriptor,
        sink: &dyn ProgressSink,
    ) -> ResourceReport {
        let temp_path = self.layout.temp_path(id, resource.year);
        let output_path = self.layout.output_path(id, resource.year);
        tracing::info!(
            dataset = %id,
            year = %resource.year,
            records = %resource.records,
            "processing {}",
            resource.description
        );

        let outcome = if self.layout.output_exists(&output_path) {
            tracing::info!(path = %output_path, "output already exists, skipping");
            sink.event(ProgressEvent {
                message: format!("phase=Skip; {output_path}"),
                elapsed: None,
            });
            ResourceOutcome::Skipped
        } else {
            let start = Instant::now();
            let result = self.fetch_and_convert(resource, &temp_path, &output_path, sink);
            if let Err(err) = &result {
                tracing::warn!(dataset = %id, year = %resource.year, error = %err, "resource failed");
            }
            sink.event(ProgressEvent {
                message: format!("phase=Done; {}", resource.year),
                elapsed: Some(start.elapsed()),
            });
            if !self.options.delay.is_zero() {
                thread::sleep(self.options.delay);
            }
            ResourceOutcome::from_result(result)
        };

        ResourceReport {
            url: resource.url.clone(),
            year: resource.year,
            description: resource.description.clone(),
            records: resource.records.clone(),
            temp_path: temp_path.to_string(),
            output_path: output_path.to_string(),
            outcome,
        }
    }

    fn fetch_and_convert(
        &self,
        resource: &ResourceDescriptor,
        temp_path: &Utf8Path,
        output_path: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<(), HarvestError> {
        Layout::ensure_parent(temp_path)?;
        sink.event(ProgressEvent {
            message: format!("phase=Download; {}", resource.url),
            elapsed: None,
        });
        self.downloader
            .download(&resource.url, temp_path.as_std_path())?;

        sink.event(ProgressEvent {
            message: format!("phase=Convert; {temp_path}"),
            elapsed: None,
        });
        let converted = self.verify_and_convert(temp_path, output_path);
        self.cleanup_or_retain(temp_path, output_path);
        if converted.is_ok() {
            tracing::info!(path = %output_path, "converted");
        }
        converted
    }

    fn verify_and_convert(
        &self,
        temp_path: &Utf8Path,
        output_path: &Utf8Path,
    ) -> Result<(), HarvestError> {
        if self.options.verify_archives && self.layout.format().is_zip_container() {
            fs_util::validate_zip(temp_path.as_std_path())?;
        }
        convert_to_path(
            &self.converter,
            temp_path.as_std_path(),
            output_path.as_std_path(),
        )
    }

    // The temp file goes only once the output is on disk.
    fn cleanup_or_retain(&self, temp_path: &Utf8Path, output_path: &Utf8Path) {
        if !self.layout.output_exists(output_path) {
            tracing::info!(path = %temp_path, "output not created, keeping downloaded file");
            return;
        }
        match Layout::remove_temp(temp_path) {
            Ok(()) => tracing::debug!(path = %temp_path, "removed temporary file"),
            Err(err) => tracing::warn!(error = %err, "could not remove temporary file"),
        }
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
