pub mod cli;
pub mod coerce;
pub mod data;
pub mod error;
pub mod io_utils;
pub mod pipeline;
pub mod preview;
pub mod sales;
pub mod schema;
pub mod staging;
pub mod store;
pub mod table;

use std::{env, fs::File, io::Write, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands, LoadArgs},
    pipeline::{ImportPipeline, ImportReport},
    schema::Schema,
    staging::StagingLoader,
    store::sqlite::SqliteStore,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("retail_sales_import", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Import(args) => handle_import(&args),
        Commands::Retry(args) => handle_retry(&args),
        Commands::Reclaim(args) => handle_reclaim(&args),
        Commands::Preview(args) => preview::execute(&args),
        Commands::Schema(args) => handle_schema(&args),
    }
}

fn handle_import(args: &cli::ImportArgs) -> Result<()> {
    let schema = Schema::load_or_default(args.target.schema.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let loader = StagingLoader::new(&args.input)
        .with_delimiter(delimiter)
        .with_encoding(encoding);
    let mut store = SqliteStore::open(&args.target.db)?;
    let report = ImportPipeline::new(&mut store, &schema)
        .with_mode(args.load.mode)
        .keep_staging(args.load.keep_staging)
        .run(&loader)
        .with_context(|| {
            format!(
                "Importing {:?} into {:?}",
                args.input, args.target.db
            )
        })?;
    finish_report(&report, &args.load)
}

fn handle_retry(args: &cli::RetryArgs) -> Result<()> {
    let schema = Schema::load_or_default(args.target.schema.as_deref())?;
    let mut store = SqliteStore::open(&args.target.db)?;
    let report = ImportPipeline::new(&mut store, &schema)
        .with_mode(args.load.mode)
        .keep_staging(args.load.keep_staging)
        .resume()
        .with_context(|| format!("Loading staged rows in {:?}", args.target.db))?;
    finish_report(&report, &args.load)
}

fn handle_reclaim(args: &cli::ReclaimArgs) -> Result<()> {
    let schema = Schema::load_or_default(args.target.schema.as_deref())?;
    let mut store = SqliteStore::open(&args.target.db)?;
    pipeline::reclaim_staging(&mut store, &schema)
        .with_context(|| format!("Clearing '{}' in {:?}", schema.staging_table, args.target.db))?;
    Ok(())
}

fn handle_schema(args: &cli::SchemaArgs) -> Result<()> {
    let schema = Schema::sales();
    match &args.output {
        Some(path) => {
            schema
                .save(path)
                .with_context(|| format!("Writing schema to {path:?}"))?;
            info!(
                "Schema with {} column(s) written to {:?}",
                schema.columns.len(),
                path
            );
        }
        None => {
            let yaml = schema.to_yaml_string()?;
            std::io::stdout()
                .write_all(yaml.as_bytes())
                .context("Writing schema to stdout")?;
        }
    }
    Ok(())
}

fn finish_report(report: &ImportReport, load: &LoadArgs) -> Result<()> {
    info!(
        "✓ {} row(s) staged, {} loaded into '{}', {} field(s) cast to absent",
        report.rows_staged, report.rows_loaded, report.target_table, report.coercion_failures
    );
    if let Some(path) = &load.report {
        write_report(report, path)?;
        info!("Run summary written to {:?}", path);
    }
    Ok(())
}

fn write_report(report: &ImportReport, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Creating report file {path:?}"))?;
    serde_json::to_writer_pretty(file, report).context("Writing report JSON")
}
