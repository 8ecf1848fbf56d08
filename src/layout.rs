use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{DatasetId, SpreadsheetFormat, Year};
use crate::error::HarvestError;

pub const OUTPUT_EXTENSION: &str = "csv";

/// On-disk layout shared by every run. The presence of the output file is
/// the only record of completed work, so these paths must stay stable.
#[derive(Debug, Clone)]
pub struct Layout {
    temp_root: Utf8PathBuf,
    output_root: Utf8PathBuf,
    format: SpreadsheetFormat,
}

impl Layout {
    pub fn new(temp_root: Utf8PathBuf, output_root: Utf8PathBuf, format: SpreadsheetFormat) -> Self {
        Self {
            temp_root,
            output_root,
            format,
        }
    }

    pub fn default_temp_root(format: SpreadsheetFormat) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("temp_{}", format.extension()))
    }

    pub fn temp_root(&self) -> &Utf8Path {
        &self.temp_root
    }

    pub fn output_root(&self) -> &Utf8Path {
        &self.output_root
    }

    pub fn format(&self) -> SpreadsheetFormat {
        self.format
    }

    pub fn temp_path(&self, id: &DatasetId, year: Year) -> Utf8PathBuf {
        self.temp_root
            .join(id.as_str())
            .join(format!("{year}.{}", self.format.extension()))
    }

    pub fn output_path(&self, id: &DatasetId, year: Year) -> Utf8PathBuf {
        self.output_root
            .join(id.as_str())
            .join(format!("{year}.{OUTPUT_EXTENSION}"))
    }

    pub fn output_exists(&self, path: &Utf8Path) -> bool {
        path.as_std_path().is_file()
    }

    pub fn ensure_parent(path: &Utf8Path) -> Result<(), HarvestError> {
        if let Some(parent) = path.parent() {
            if !parent.as_str().is_empty() {
                fs::create_dir_all(parent.as_std_path())
                    .map_err(|err| HarvestError::Filesystem(format!("create {parent}: {err}")))?;
            }
        }
        Ok(())
    }

    pub fn remove_temp(path: &Utf8Path) -> Result<(), HarvestError> {
        fs::remove_file(path.as_std_path())
            .map_err(|err| HarvestError::Filesystem(format!("remove {path}: {err}")))
    }
}
