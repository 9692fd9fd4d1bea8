use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use camels_core::{Config, RunSummary};
use clap::Parser;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Builds the CAMELS station table and streamflow array store.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML run configuration; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip download and extraction and read the existing data directory
    #[arg(long)]
    offline: bool,

    /// Directory for the output files
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    match execute(cli) {
        Ok(summary) => {
            println!("{}", summary_table(&summary));
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<RunSummary> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if cli.offline {
        config.sources.download = false;
    }
    if let Some(output_dir) = cli.output_dir {
        config.output_dir = output_dir;
    }

    info!(
        data_dir = %config.data_dir.display(),
        output_dir = %config.output_dir.display(),
        download = config.sources.download,
        "starting conversion"
    );
    camels_core::run(&config).context("CAMELS conversion failed")
}

fn summary_table(summary: &RunSummary) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Item", "Value"]);

    let range = match (summary.time_start, summary.time_end) {
        (Some(start), Some(end)) => format!("{start} .. {end}"),
        _ => "empty".to_string(),
    };
    let dropped = if summary.dropped_stations.is_empty() {
        "none".to_string()
    } else {
        summary.dropped_stations.join(", ")
    };

    table.add_row(vec!["Stations".to_string(), summary.station_count.to_string()]);
    table.add_row(vec!["Dropped (geometry only)".to_string(), dropped]);
    table.add_row(vec![
        "Without geometry".to_string(),
        summary.missing_geometry.len().to_string(),
    ]);
    table.add_row(vec![
        "Attribute variables".to_string(),
        summary.attribute_columns.to_string(),
    ]);
    table.add_row(vec!["Days".to_string(), summary.time_steps.to_string()]);
    table.add_row(vec!["Date range".to_string(), range]);
    table.add_row(vec![
        "Missing discharge".to_string(),
        format!("{} of {}", summary.missing_cells, summary.total_cells),
    ]);
    table.add_row(vec![
        "Station table".to_string(),
        summary.tabular_path.display().to_string(),
    ]);
    table.add_row(vec![
        "Array store".to_string(),
        summary.array_store_path.display().to_string(),
    ]);
    for archive in &summary.archives {
        table.add_row(vec![archive.name.clone(), archive.blake3.clone()]);
    }
    table
}
