use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("invalid dataset id: {0:?}")]
    InvalidDatasetId(String),

    #[error("invalid spreadsheet format: {0}")]
    InvalidFormat(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("metadata request failed: {0}")]
    MetadataHttp(String),

    #[error("metadata endpoint returned status {status}: {message}")]
    MetadataStatus { status: u16, message: String },

    #[error("failed to parse metadata document: {0}")]
    MetadataParse(String),

    #[error("download request failed: {0}")]
    DownloadHttp(String),

    #[error("download returned status {status}: {message}")]
    DownloadStatus { status: u16, message: String },

    #[error("downloaded file is not a readable spreadsheet archive: {0}")]
    InvalidDownload(String),

    #[error("converter not found: {0}")]
    #[diagnostic(help("install LibreOffice or set `converter` in the config file"))]
    ConverterMissing(String),

    #[error("conversion failed: {0}")]
    ConversionFailed(String),

    #[error("conversion timed out after {seconds}s")]
    ConversionTimeout { seconds: u64 },

    #[error("converter did not produce expected output: {0}")]
    ConvertedOutputMissing(PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
