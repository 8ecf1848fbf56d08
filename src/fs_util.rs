use std::fs;
use std::io;
use std::path::Path;

use zip::ZipArchive;

use crate::error::HarvestError;

/// Reads every entry of a zip-container spreadsheet (ODS/XLSX) to the end so
/// truncated bodies and HTML error pages are caught before conversion.
pub fn validate_zip(zip_path: &Path) -> Result<(), HarvestError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        HarvestError::Filesystem(format!("open archive {}: {err}", zip_path.display()))
    })?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| HarvestError::InvalidDownload(err.to_string()))?;
    if archive.len() == 0 {
        return Err(HarvestError::InvalidDownload(
            "archive has no entries".to_string(),
        ));
    }

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| HarvestError::InvalidDownload(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink())
            .map_err(|err| HarvestError::InvalidDownload(err.to_string()))?;
    }
    Ok(())
}
