use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::extract::DEFAULT_BASE_URL;
use crate::pipeline::PipelineRequest;

#[derive(Debug, Parser)]
#[command(name = "caseload")]
#[command(about = "Batch ETL for JHU CSSE COVID-19 time series: download, reshape, validate, load")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execute the full pipeline: extract, reshape, validate, load.
    Run(RunArgs),
    /// Extract, reshape and validate only; report violations without loading.
    Check(CheckArgs),
    /// Show run history from covid_metadata.
    Runs(RunsArgs),
    /// Show a latest-date summary of the loaded long table.
    Stats(StatsArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Path to the SQLite database file.
    #[arg(long, default_value = ".caseload/caseload.sqlite3")]
    pub db: PathBuf,

    /// Directory the wide source CSVs are downloaded into.
    #[arg(long, default_value = "data/raw")]
    pub data_dir: PathBuf,

    /// Base URL of the raw time-series directory.
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Reuse already-downloaded files instead of fetching.
    #[arg(long)]
    pub offline: bool,

    /// Emit the run report as pretty JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn to_request(&self) -> PipelineRequest {
        PipelineRequest {
            db_path: self.db.clone(),
            data_dir: self.data_dir.clone(),
            base_url: self.base_url.clone(),
            offline: self.offline,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct CheckArgs {
    /// Directory the wide source CSVs are downloaded into.
    #[arg(long, default_value = "data/raw")]
    pub data_dir: PathBuf,

    /// Base URL of the raw time-series directory.
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Reuse already-downloaded files instead of fetching.
    #[arg(long)]
    pub offline: bool,

    /// Emit the validation report as pretty JSON.
    #[arg(long)]
    pub json: bool,
}

impl CheckArgs {
    pub fn to_request(&self) -> PipelineRequest {
        PipelineRequest {
            data_dir: self.data_dir.clone(),
            base_url: self.base_url.clone(),
            offline: self.offline,
            ..PipelineRequest::default()
        }
    }
}

#[derive(Debug, Args)]
pub struct RunsArgs {
    /// Path to the SQLite database file.
    #[arg(long, default_value = ".caseload/caseload.sqlite3")]
    pub db: PathBuf,

    /// Show a single run by id.
    #[arg(long)]
    pub id: Option<i64>,

    /// Maximum number of recent runs to list.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    #[arg(long, value_enum, default_value_t = RunsOutputFormat::Plain)]
    pub format: RunsOutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunsOutputFormat {
    Plain,
    Json,
    Ndjson,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Path to the SQLite database file.
    #[arg(long, default_value = ".caseload/caseload.sqlite3")]
    pub db: PathBuf,

    /// Also list the top N locations by confirmed count on the latest date.
    #[arg(long, default_value_t = 0)]
    pub top: usize,

    /// Emit as pretty JSON.
    #[arg(long)]
    pub json: bool,
}
