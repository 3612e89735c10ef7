use thiserror::Error;

use crate::model::Violation;

pub type EtlResult<T> = Result<T, EtlError>;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv failure: {0}")]
    Csv(#[from] csv::Error),

    #[error("json failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("download failed for `{url}`: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("schema mismatch in {metric} table: {detail}")]
    SchemaMismatch { metric: &'static str, detail: String },

    #[error("data quality gate failed with {} violation(s)", violations.len())]
    ValidationFailed { violations: Vec<Violation> },

    #[error("load failed during run {run_id}: {message}")]
    Load { run_id: i64, message: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl EtlError {
    /// Build a `SchemaMismatch` for the given metric table.
    pub fn schema_mismatch(metric: &'static str, detail: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            metric,
            detail: detail.into(),
        }
    }

    /// The violations attached to a `ValidationFailed`, if any.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::ValidationFailed { violations } => violations,
            _ => &[],
        }
    }
}

impl From<rusqlite::Error> for EtlError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Storage(error.to_string())
    }
}
