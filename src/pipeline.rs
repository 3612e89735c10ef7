//! Pipeline orchestration: extract -> reshape -> validate -> load.
//!
//! One engine run processes one full snapshot of source data start to
//! finish, single-threaded and synchronous. The validation gate sits
//! between reshape and load; the loader never sees records that failed it.

use std::fmt;
use std::path::PathBuf;

use chrono::Utc;

use crate::error::{EtlError, EtlResult};
use crate::extract::{DEFAULT_BASE_URL, Extractor, read_series_table};
use crate::model::{LongRecord, Metric, RunReport, ValidationReport};
use crate::reshape::{RawTables, reshape};
use crate::storage::RunStore;
use crate::validate::validate;

/// The discrete stages of one pipeline execution, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    /// Fetch (or reuse) the three wide-format source files.
    Extract,
    /// Melt and join the wide tables into long-format records.
    Reshape,
    /// Run the data-quality gate.
    Validate,
    /// Upsert into the durable store under a run record.
    Load,
}

impl PipelineStage {
    /// The stage label used in logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Reshape => "reshape",
            Self::Validate => "validate",
            Self::Load => "load",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything one pipeline execution needs to know.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// SQLite database file holding both durable tables.
    pub db_path: PathBuf,
    /// Directory the wide source CSVs are downloaded into.
    pub data_dir: PathBuf,
    /// Base URL of the raw time-series directory.
    pub base_url: String,
    /// Reuse already-downloaded files instead of fetching.
    pub offline: bool,
}

impl Default for PipelineRequest {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(".caseload/caseload.sqlite3"),
            data_dir: PathBuf::from("data/raw"),
            base_url: DEFAULT_BASE_URL.to_owned(),
            offline: false,
        }
    }
}

/// Batch ETL engine. Owns nothing durable; every run opens its own store.
#[derive(Debug, Clone)]
pub struct CaseloadEngine {
    request: PipelineRequest,
}

impl CaseloadEngine {
    pub fn new(request: PipelineRequest) -> Self {
        Self { request }
    }

    /// Execute the full pipeline and return the run report.
    ///
    /// A failure in any stage leaves a finalized `failed` row in
    /// `covid_metadata`: pre-load failures via `record_failed_run`, load
    /// failures via the loader's own finalize path.
    pub fn run(&self) -> EtlResult<RunReport> {
        let started_at = Utc::now();
        let store = RunStore::open(&self.request.db_path)?;
        let source_url = self.request.base_url.clone();

        let records = match self.transform() {
            Ok(records) => records,
            Err(error) => {
                self.record_pre_load_failure(&store, &source_url, &error);
                return Err(error);
            }
        };

        tracing::info!(stage = %PipelineStage::Validate, records = records.len(), "running data quality checks");
        let verdict = validate(&records);
        if !verdict.passed {
            for violation in verdict.violations.iter().take(20) {
                tracing::warn!(%violation, "data quality violation");
            }
            let error = EtlError::ValidationFailed {
                violations: verdict.violations,
            };
            self.record_pre_load_failure(&store, &source_url, &error);
            return Err(error);
        }

        tracing::info!(stage = %PipelineStage::Load, records = records.len(), "loading into store");
        let result = store.load(&records, &source_url)?;
        let stats = store.latest_stats()?;

        let report = RunReport {
            run_id: result.run_id,
            started_at_rfc3339: started_at.to_rfc3339(),
            finished_at_rfc3339: Utc::now().to_rfc3339(),
            records_loaded: result.records_loaded,
            data_source_url: source_url,
            stats,
        };
        tracing::info!(
            run_id = report.run_id,
            records_loaded = report.records_loaded,
            "pipeline completed"
        );
        Ok(report)
    }

    /// Extract + reshape + validate without touching the store. The dry-run
    /// behind the `check` subcommand.
    pub fn check(&self) -> EtlResult<ValidationReport> {
        let records = self.transform()?;
        Ok(validate(&records))
    }

    fn transform(&self) -> EtlResult<Vec<LongRecord>> {
        tracing::info!(stage = %PipelineStage::Extract, offline = self.request.offline, "gathering source tables");
        let extractor = Extractor::new(&self.request.base_url, &self.request.data_dir)?;

        let mut tables = RawTables::default();
        for metric in Metric::ALL {
            let path = if self.request.offline {
                let path = extractor.local_path(metric);
                if !path.exists() {
                    return Err(EtlError::InvalidRequest(format!(
                        "offline mode, but `{}` has not been downloaded",
                        path.display()
                    )));
                }
                path
            } else {
                extractor.download(metric)?
            };

            let table = read_series_table(&path, metric)?;
            match metric {
                Metric::Confirmed => tables.confirmed = table,
                Metric::Deaths => tables.deaths = table,
                Metric::Recovered => tables.recovered = table,
            }
        }

        tracing::info!(stage = %PipelineStage::Reshape, "reshaping to long format");
        reshape(&tables)
    }

    fn record_pre_load_failure(&self, store: &RunStore, source_url: &str, error: &EtlError) {
        if let Err(storage_error) = store.record_failed_run(source_url, &error.to_string()) {
            tracing::error!(%storage_error, "could not record failed run");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_labels_are_stable() {
        let labels: Vec<_> = [
            PipelineStage::Extract,
            PipelineStage::Reshape,
            PipelineStage::Validate,
            PipelineStage::Load,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(labels, ["extract", "reshape", "validate", "load"]);
    }

    #[test]
    fn default_request_points_at_csse() {
        let request = PipelineRequest::default();
        assert!(request.base_url.contains("csse_covid_19_time_series"));
        assert!(!request.offline);
    }
}
