use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::HarvestError;
use crate::layout::OUTPUT_EXTENSION;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_PROGRAMS: [&str; 2] = ["libreoffice", "soffice"];

pub trait Converter {
    /// Converts `source` into `target_dir` and returns the path the tool
    /// actually wrote.
    fn convert(&self, source: &Path, target_dir: &Path) -> Result<PathBuf, HarvestError>;
}

impl<T: Converter + ?Sized> Converter for &T {
    fn convert(&self, source: &Path, target_dir: &Path) -> Result<PathBuf, HarvestError> {
        (**self).convert(source, target_dir)
    }
}

/// Runs the converter and moves its auto-named output to `destination`.
pub fn convert_to_path<V: Converter + ?Sized>(
    converter: &V,
    source: &Path,
    destination: &Path,
) -> Result<(), HarvestError> {
    let target_dir = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(target_dir).map_err(|err| {
        HarvestError::Filesystem(format!("create {}: {err}", target_dir.display()))
    })?;

    let produced = converter.convert(source, target_dir)?;
    if !produced.is_file() {
        return Err(HarvestError::ConvertedOutputMissing(produced));
    }
    if produced != destination {
        fs::rename(&produced, destination).map_err(|err| {
            HarvestError::Filesystem(format!(
                "rename {} -> {}: {err}",
                produced.display(),
                destination.display()
            ))
        })?;
    }
    Ok(())
}

/// Where a headless office suite drops its output: same stem, new extension.
pub fn expected_output(source: &Path, target_dir: &Path) -> PathBuf {
    let stem = source.file_stem().unwrap_or(source.as_os_str());
    let mut name = stem.to_os_string();
    name.push(".");
    name.push(OUTPUT_EXTENSION);
    target_dir.join(name)
}

/// LibreOffice (or anything with the same command line) in headless mode.
#[derive(Debug, Clone)]
pub struct SofficeConverter {
    program: Option<PathBuf>,
    requested: String,
    timeout: Duration,
}

impl SofficeConverter {
    /// Resolves `program` on `PATH`, or the first of `libreoffice`/`soffice`
    /// when none is configured.
    pub fn new(program: Option<&str>, timeout: Duration) -> Self {
        let (requested, resolved) = match program {
            Some(name) => (name.to_string(), resolve_program(name)),
            None => (
                DEFAULT_PROGRAMS.join(" or "),
                DEFAULT_PROGRAMS.iter().find_map(|name| find_in_path(name)),
            ),
        };
        Self {
            program: resolved,
            requested,
            timeout,
        }
    }

    pub fn program(&self) -> Option<&Path> {
        self.program.as_deref()
    }

    fn require_program(&self) -> Result<&PathBuf, HarvestError> {
        self.program
            .as_ref()
            .ok_or_else(|| HarvestError::ConverterMissing(self.requested.clone()))
    }

    fn build_args(source: &Path, target_dir: &Path) -> Vec<String> {
        vec![
            "--headless".to_string(),
            "--convert-to".to_string(),
            OUTPUT_EXTENSION.to_string(),
            "--outdir".to_string(),
            target_dir.to_string_lossy().to_string(),
            source.to_string_lossy().to_string(),
        ]
    }

    fn run_with_timeout(&self, program: &Path, args: &[String]) -> Result<(), HarvestError> {
        tracing::debug!(program = %program.display(), ?args, "running converter");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => {
                    HarvestError::ConverterMissing(program.display().to_string())
                }
                _ => HarvestError::ConversionFailed(err.to_string()),
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match wait_with_timeout(&mut child, self.timeout)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                // Readers are left detached: a grandchild may still hold the pipes.
                return Err(HarvestError::ConversionTimeout {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let stdout = join_output(stdout);
        if !stdout.is_empty() {
            tracing::debug!(output = %stdout, "converter stdout");
        }
        if status.success() {
            return Ok(());
        }
        let stderr = join_output(stderr);
        let message = if stderr.is_empty() {
            format!("{} exited with {status}", program.display())
        } else {
            stderr
        };
        Err(HarvestError::ConversionFailed(message))
    }
}

impl Converter for SofficeConverter {
    fn convert(&self, source: &Path, target_dir: &Path) -> Result<PathBuf, HarvestError> {
        let program = self.require_program()?;
        let args = Self::build_args(source, target_dir);
        tracing::info!(source = %source.display(), "converting to {OUTPUT_EXTENSION}");
        self.run_with_timeout(program, &args)?;
        Ok(expected_output(source, target_dir))
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>, HarvestError> {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {
                if started.elapsed() >= timeout {
                    return Ok(None);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(err) => return Err(HarvestError::ConversionFailed(err.to_string())),
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            String::from_utf8_lossy(&buffer).trim().to_string()
        })
    })
}

fn join_output(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn resolve_program(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }
    find_in_path(name)
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.is_file() {
            return Some(plain);
        }
    }
    None
}
