use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONNECTION, HeaderMap, HeaderValue, REFERER, USER_AGENT};

use crate::error::HarvestError;

pub const CHUNK_SIZE: usize = 8192;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const BROWSER_ACCEPT: &str =
    "application/vnd.oasis.opendocument.spreadsheet, application/octet-stream, */*";
const BROWSER_ACCEPT_LANGUAGE: &str = "zh-TW,zh;q=0.9,en;q=0.8";
const SOURCE_REFERER: &str = "https://data.gov.tw/";

pub trait Downloader {
    /// Writes the body at `url` to `destination`. On error nothing is left at
    /// `destination`.
    fn download(&self, url: &str, destination: &Path) -> Result<(), HarvestError>;
}

impl<T: Downloader + ?Sized> Downloader for &T {
    fn download(&self, url: &str, destination: &Path) -> Result<(), HarvestError> {
        (**self).download(url, destination)
    }
}

/// One way of issuing the GET. Strategies are tried in order until one
/// succeeds.
#[derive(Clone)]
pub struct RequestStrategy {
    name: &'static str,
    client: Client,
}

impl RequestStrategy {
    pub fn new(name: &'static str, client: Client) -> Self {
        Self { name, client }
    }

    /// One-off request with the browser header set and no connection reuse.
    pub fn primary(timeout: Duration) -> Result<Self, HarvestError> {
        let client = Client::builder()
            .default_headers(browser_headers("close"))
            .pool_max_idle_per_host(0)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .timeout(timeout)
            .build()
            .map_err(|err| HarvestError::DownloadHttp(err.to_string()))?;
        Ok(Self::new("primary", client))
    }

    /// Persistent session with a cookie jar. Same headers as the primary
    /// attempt, but cookies set by the origin on the first answer are replayed.
    pub fn browser_session(timeout: Duration) -> Result<Self, HarvestError> {
        let client = Client::builder()
            .default_headers(browser_headers("keep-alive"))
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(timeout)
            .build()
            .map_err(|err| HarvestError::DownloadHttp(err.to_string()))?;
        Ok(Self::new("session", client))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn fetch_to(&self, url: &str, destination: &Path) -> Result<u64, HarvestError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| HarvestError::DownloadHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .status()
                .canonical_reason()
                .unwrap_or("download failed")
                .to_string();
            return Err(HarvestError::DownloadStatus { status, message });
        }

        let parent = destination
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::Builder::new()
            .prefix(".partial-")
            .tempfile_in(parent)
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        let written = stream_to(&mut response, temp.as_file_mut())
            .map_err(|err| HarvestError::DownloadHttp(format!("reading body: {err}")))?;
        temp.persist(destination)
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        Ok(written)
    }
}

/// Desktop-browser header set. The origin answers 406 to requests without
/// it. Encoding preference is negotiated by the client itself so compressed
/// bodies get decoded.
fn browser_headers(connection: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE),
    );
    headers.insert(CONNECTION, HeaderValue::from_static(connection));
    headers.insert(REFERER, HeaderValue::from_static(SOURCE_REFERER));
    headers
}

#[derive(Clone)]
pub struct HttpDownloader {
    strategies: Vec<RequestStrategy>,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Result<Self, HarvestError> {
        Ok(Self::with_strategies(vec![
            RequestStrategy::primary(timeout)?,
            RequestStrategy::browser_session(timeout)?,
        ]))
    }

    pub fn with_strategies(strategies: Vec<RequestStrategy>) -> Self {
        Self { strategies }
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, destination: &Path) -> Result<(), HarvestError> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                HarvestError::Filesystem(format!("create {}: {err}", parent.display()))
            })?;
        }

        let mut last_error = None;
        for strategy in &self.strategies {
            tracing::info!(strategy = strategy.name(), %url, "downloading");
            match strategy.fetch_to(url, destination) {
                Ok(bytes) => {
                    tracing::info!(
                        strategy = strategy.name(),
                        bytes,
                        path = %destination.display(),
                        "downloaded"
                    );
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(strategy = strategy.name(), %url, error = %err, "download attempt failed");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            HarvestError::DownloadHttp("no download strategy configured".to_string())
        }))
    }
}

/// Copies `reader` into `writer` chunk by chunk, in order.
pub fn stream_to<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> io::Result<u64> {
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        writer.write_all(&buffer[..read])?;
        total += read as u64;
    }
    writer.flush()?;
    Ok(total)
}
