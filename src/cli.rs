use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::store::LoadMode;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Stage, coerce, and load retail sales CSV exports into a typed table",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Stage a CSV file, coerce its fields, load the target table, and clear staging
    Import(ImportArgs),
    /// Coerce and load rows already sitting in the staging table
    Retry(RetryArgs),
    /// Delete every row from the staging table
    Reclaim(ReclaimArgs),
    /// Show the first rows of the target (or staging) table
    Preview(PreviewArgs),
    /// Write the built-in sales schema as YAML
    Schema(SchemaArgs),
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Input CSV file to import ('-' reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    #[command(flatten)]
    pub target: TargetArgs,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    #[command(flatten)]
    pub load: LoadArgs,
}

#[derive(Debug, Args)]
pub struct RetryArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    #[command(flatten)]
    pub load: LoadArgs,
}

#[derive(Debug, Args)]
pub struct ReclaimArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Debug, Args)]
pub struct TargetArgs {
    /// SQLite database holding the staging and target tables
    #[arg(short = 'd', long = "db")]
    pub db: PathBuf,
    /// YAML schema describing tables and column types (defaults to the sales layout)
    #[arg(short = 's', long = "schema")]
    pub schema: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// How the batch meets rows already in the target table
    #[arg(long, value_enum, default_value_t = LoadMode::Replace)]
    pub mode: LoadMode,
    /// Leave staged rows in place after a successful load
    #[arg(long = "keep-staging")]
    pub keep_staging: bool,
    /// Write a JSON summary of the run to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Number of rows to display
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
    /// Show the staging table instead of the target table
    #[arg(long)]
    pub staging: bool,
    /// Emit rows as a JSON array instead of a text table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// Destination YAML file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
