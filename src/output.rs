use std::io::{self, Write};

use serde::Serialize;

use crate::extract::ResourceDescriptor;
use crate::pipeline::{ProgressEvent, ProgressSink, ResourceOutcome, RunReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_resources(resources: &[ResourceListing]) -> io::Result<()> {
        Self::print_json(&resources)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human mode: progress goes to the log, the summary to stdout.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::debug!(?elapsed, "{}", event.message),
            None => tracing::debug!("{}", event.message),
        }
    }
}

impl ConsoleOutput {
    pub fn print_report(report: &RunReport) {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let cyan = "\x1b[36m";
        let red = "\x1b[31m";
        let reset = "\x1b[0m";

        let mut converted = 0usize;
        let mut skipped = 0usize;
        let mut failed = 0usize;
        for dataset in &report.datasets {
            for resource in &dataset.resources {
                match resource.outcome {
                    ResourceOutcome::Converted => converted += 1,
                    ResourceOutcome::Skipped => skipped += 1,
                    ResourceOutcome::Failed { .. } => failed += 1,
                }
            }
        }

        println!("{cyan}opendata-harvest summary{reset}");
        println!("{green}converted: {converted}{reset}  {yellow}skipped: {skipped}{reset}  {red}failed: {failed}{reset}");

        for dataset in &report.datasets {
            let title = dataset.title.as_deref().unwrap_or("");
            if let Some(error) = &dataset.error {
                println!("{red}x {} {title}: {error}{reset}", dataset.dataset_id);
                continue;
            }
            println!("{cyan}* {} {title}{reset}", dataset.dataset_id);
            for resource in &dataset.resources {
                match &resource.outcome {
                    ResourceOutcome::Converted => {
                        println!("{green}   {} -> {}{reset}", resource.year, resource.output_path)
                    }
                    ResourceOutcome::Skipped => println!(
                        "{yellow}   {} already at {}{reset}",
                        resource.year, resource.output_path
                    ),
                    ResourceOutcome::Failed { kind, message } => println!(
                        "{red}   {} {kind:?}: {message}{reset}",
                        resource.year
                    ),
                }
            }
        }
    }

    pub fn print_resources(resources: &[ResourceListing]) {
        for listing in resources {
            let state = if listing.output_exists { "done" } else { "pending" };
            println!(
                "{}\t{}\t{}\t{}\t{}",
                listing.resource.year,
                listing.resource.records,
                state,
                listing.output_path,
                listing.resource.url
            );
        }
    }
}

/// A descriptor plus where it would land, for dry runs.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceListing {
    #[serde(flatten)]
    pub resource: ResourceDescriptor,
    pub output_path: String,
    pub output_exists: bool,
}
