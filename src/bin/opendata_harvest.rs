use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use opendata_harvest::catalog::CatalogHttpClient;
use opendata_harvest::config::{ConfigLoader, ResolvedConfig};
use opendata_harvest::convert::SofficeConverter;
use opendata_harvest::domain::{DatasetId, SpreadsheetFormat};
use opendata_harvest::download::HttpDownloader;
use opendata_harvest::error::HarvestError;
use opendata_harvest::layout::Layout;
use opendata_harvest::output::{ConsoleOutput, JsonOutput, OutputMode, ResourceListing};
use opendata_harvest::pipeline::{Pipeline, PipelineOptions};

#[derive(Parser)]
#[command(name = "opendata-harvest")]
#[command(about = "Download data.gov.tw spreadsheet resources and convert them to CSV")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch, download and convert the given datasets")]
    Run(RunArgs),
    #[command(about = "List the spreadsheet resources of a dataset without downloading")]
    Resources(ResourcesArgs),
}

#[derive(Args)]
struct CommonArgs {
    #[arg(long)]
    format: Option<SpreadsheetFormat>,

    #[arg(long)]
    temp_dir: Option<String>,

    #[arg(long)]
    output_dir: Option<String>,
}

#[derive(Args)]
struct RunArgs {
    dataset_ids: Vec<String>,

    #[command(flatten)]
    common: CommonArgs,

    #[arg(long)]
    delay_ms: Option<u64>,
}

#[derive(Args)]
struct ResourcesArgs {
    dataset_id: String,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<HarvestError>() {
                return ExitCode::from(map_exit_code(error));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::InvalidDatasetId(_)
        | HarvestError::InvalidFormat(_)
        | HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_) => 2,
        HarvestError::MetadataHttp(_)
        | HarvestError::MetadataStatus { .. }
        | HarvestError::MetadataParse(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            apply_overrides(&mut config, &args.common);
            if let Some(delay_ms) = args.delay_ms {
                config.delay = Duration::from_millis(delay_ms);
            }
            let ids = if args.dataset_ids.is_empty() {
                config.datasets_or_default()
            } else {
                parse_ids(&args.dataset_ids)?
            };
            run_pipeline(&config, &ids, output_mode)
        }
        Commands::Resources(args) => {
            apply_overrides(&mut config, &args.common);
            let id = args.dataset_id.parse::<DatasetId>()?;
            run_resources(&config, &id, output_mode)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn apply_overrides(config: &mut ResolvedConfig, common: &CommonArgs) {
    if let Some(format) = common.format {
        // A format switch moves the default temp root along with it.
        if config.temp_dir == Layout::default_temp_root(config.format) {
            config.temp_dir = Layout::default_temp_root(format);
        }
        config.format = format;
    }
    if let Some(dir) = &common.temp_dir {
        config.temp_dir = Utf8PathBuf::from(dir);
    }
    if let Some(dir) = &common.output_dir {
        config.output_dir = Utf8PathBuf::from(dir);
    }
}

fn parse_ids(values: &[String]) -> Result<Vec<DatasetId>, HarvestError> {
    values.iter().map(|value| value.parse()).collect()
}

fn build_pipeline(
    config: &ResolvedConfig,
) -> Result<Pipeline<CatalogHttpClient, HttpDownloader, SofficeConverter>, HarvestError> {
    let catalog = CatalogHttpClient::new(&config.api_base, config.request_timeout)?;
    let downloader = HttpDownloader::new(config.request_timeout)?;
    let converter = SofficeConverter::new(config.converter.as_deref(), config.convert_timeout);
    if converter.program().is_none() {
        tracing::warn!("no converter found on PATH; downloads will be kept unconverted");
    }
    Ok(Pipeline::new(
        catalog,
        downloader,
        converter,
        config.layout(),
        PipelineOptions {
            delay: config.delay,
            verify_archives: config.verify_archives,
        },
    ))
}

fn run_pipeline(
    config: &ResolvedConfig,
    ids: &[DatasetId],
    output_mode: OutputMode,
) -> miette::Result<ExitCode> {
    let pipeline = build_pipeline(config)?;
    let report = match output_mode {
        OutputMode::Json => {
            let report = pipeline.run(ids, &JsonOutput);
            JsonOutput::print_report(&report).into_diagnostic()?;
            report
        }
        OutputMode::Human => {
            let report = pipeline.run(ids, &ConsoleOutput);
            ConsoleOutput::print_report(&report);
            report
        }
    };
    if report.has_failures() {
        return Ok(ExitCode::from(3));
    }
    Ok(ExitCode::SUCCESS)
}

fn run_resources(
    config: &ResolvedConfig,
    id: &DatasetId,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let pipeline = build_pipeline(config)?;
    let layout = pipeline.layout();
    let listings = pipeline
        .resources(id)?
        .into_iter()
        .map(|resource| {
            let output_path = layout.output_path(id, resource.year);
            ResourceListing {
                output_exists: layout.output_exists(&output_path),
                output_path: output_path.to_string(),
                resource,
            }
        })
        .collect::<Vec<_>>();

    match output_mode {
        OutputMode::Json => JsonOutput::print_resources(&listings).into_diagnostic()?,
        OutputMode::Human => ConsoleOutput::print_resources(&listings),
    }
    Ok(())
}
