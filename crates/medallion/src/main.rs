use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use polars::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use medallion_core::config::PipelineConfig;
use medallion_core::gold::aggregate;
use medallion_core::ingestion::{ingest, FileStatus, IngestOptions};
use medallion_core::outputs;
use medallion_core::silver::clean;

mod charts;

#[derive(Parser, Debug)]
#[command(author, version, about = "Bronze/silver/gold batch data pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full ingest -> clean -> aggregate pipeline
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to the pipeline config YAML file
    #[arg(short, long)]
    config: PathBuf,
    /// Skip chart rendering after the layers are written
    #[arg(long)]
    no_charts: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let config = PipelineConfig::from_path(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    let run_id = Uuid::new_v4();
    info!(%run_id, "starting pipeline run");

    info!("step 1: ingesting raw files into the bronze layer");
    let options = IngestOptions {
        lineage_dir: config.lineage.then(|| config.bronze_path.join("raw")),
        ..IngestOptions::default()
    };
    let batch = ingest(&config.input_path, &config.schema, &options)?;
    for report in &batch.reports {
        if report.status != FileStatus::Accepted {
            warn!(
                path = %report.path.display(),
                status = ?report.status,
                detail = report.detail.as_deref().unwrap_or(""),
                "file skipped"
            );
        }
    }
    if batch.source_missing || batch.frame.height() == 0 {
        bail!("no data ingested; halting before writing an empty bronze layer");
    }
    let bronze_file = config.bronze_path.join("bronze_data.parquet");
    outputs::write_parquet(&batch.frame, &bronze_file)?;
    info!(path = %bronze_file.display(), rows = batch.frame.height(), "bronze layer saved");

    info!("step 2: cleaning bronze into the silver layer");
    let cleaned = clean(&batch.frame, &config.cleaning, Utc::now())?;
    let silver_file = config.silver_path.join("silver_data.parquet");
    outputs::write_parquet(&cleaned.frame, &silver_file)?;
    info!(
        path = %silver_file.display(),
        rows = cleaned.report.rows_out,
        duplicates_removed = cleaned.report.duplicates_removed,
        critical_dropped = cleaned.report.critical_dropped,
        "silver layer saved"
    );

    info!("step 3: aggregating silver into the gold layer");
    let gold = aggregate(&cleaned.frame, &config.aggregation, Utc::now())?;
    let gold_file = config.gold_path.join("gold_data.parquet");
    outputs::write_parquet(&gold, &gold_file)?;
    info!(path = %gold_file.display(), groups = gold.height(), "gold layer saved");

    print_gold_summary(&gold);

    if !args.no_charts && gold.height() > 0 {
        let charts_dir = config.gold_path.join("charts");
        match std::fs::create_dir_all(&charts_dir) {
            Err(err) => warn!(%err, "could not create charts directory"),
            Ok(()) => {
                if let Err(err) = charts::render_sum_by_key(
                    &gold,
                    &config.aggregation.group_key,
                    &charts_dir.join("sum_by_key.png"),
                ) {
                    warn!(%err, "failed to render sum-by-key chart");
                }
                if let Err(err) =
                    charts::render_null_counts(&cleaned.frame, &charts_dir.join("null_counts.png"))
                {
                    warn!(%err, "failed to render null-count chart");
                }
            }
        }
    }

    info!(%run_id, "pipeline run completed");
    Ok(())
}

fn print_gold_summary(gold: &DataFrame) {
    if gold.height() == 0 {
        println!("(gold layer is empty)");
        return;
    }
    let mut table = Table::new();
    table.set_header(
        gold.get_column_names()
            .iter()
            .map(|name| name.as_str().to_string()),
    );
    for row in 0..gold.height().min(20) {
        let cells: Vec<String> = gold
            .get_columns()
            .iter()
            .map(|column| match column.get(row) {
                Ok(AnyValue::Null) | Err(_) => String::new(),
                Ok(AnyValue::String(value)) => value.to_string(),
                Ok(AnyValue::StringOwned(value)) => value.to_string(),
                Ok(other) => other.to_string(),
            })
            .collect();
        table.add_row(cells);
    }
    println!("{table}");
}
