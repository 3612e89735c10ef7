use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Source-side types (wide format)
// ---------------------------------------------------------------------------

/// One of the three JHU CSSE time-series feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Confirmed,
    Deaths,
    Recovered,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Confirmed, Metric::Deaths, Metric::Recovered];

    /// Column name in the long-format table.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Deaths => "deaths",
            Self::Recovered => "recovered",
        }
    }

    /// Source CSV filename under the CSSE time-series directory.
    pub fn source_filename(self) -> &'static str {
        match self {
            Self::Confirmed => "time_series_covid19_confirmed_global.csv",
            Self::Deaths => "time_series_covid19_deaths_global.csv",
            Self::Recovered => "time_series_covid19_recovered_global.csv",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one row of a wide table. Lat/Long are dropped at parse time;
/// they play no part in the long schema.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationKey {
    pub country_region: String,
    /// Empty string when the source cell is blank (country-level row).
    pub province_state: String,
}

impl LocationKey {
    pub fn new(country_region: impl Into<String>, province_state: impl Into<String>) -> Self {
        Self {
            country_region: country_region.into(),
            province_state: province_state.into(),
        }
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.province_state.is_empty() {
            f.write_str(&self.country_region)
        } else {
            write!(f, "{}/{}", self.country_region, self.province_state)
        }
    }
}

/// One row of a wide table: a location plus one cumulative count per date
/// column. `counts.len()` always equals the owning table's `dates.len()`.
#[derive(Debug, Clone)]
pub struct RawSeriesRow {
    pub key: LocationKey,
    pub counts: Vec<i64>,
}

/// One parsed wide-format table. Rows are kept in source order and may
/// repeat a location key; duplicates flow through the reshape so the
/// validator can report them instead of the parser silently collapsing them.
#[derive(Debug, Clone, Default)]
pub struct RawSeriesTable {
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<RawSeriesRow>,
}

impl RawSeriesTable {
    /// A table with no date columns contributes nothing to the reshape.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() || self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Long format
// ---------------------------------------------------------------------------

/// The unified long-format row: one location, one day, all metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongRecord {
    pub country_region: String,
    pub province_state: String,
    pub date: NaiveDate,
    pub confirmed: i64,
    pub deaths: i64,
    pub recovered: i64,
    /// Derived: `max(confirmed - deaths - recovered, 0)`.
    pub active: i64,
}

impl LongRecord {
    pub fn key(&self) -> (&str, &str, NaiveDate) {
        (&self.country_region, &self.province_state, self.date)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single data-quality finding. Violations never mutate or drop rows;
/// they only report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// country_region is missing or blank.
    MissingKey { row: usize },
    NegativeValue {
        field: String,
        country_region: String,
        province_state: String,
        date: NaiveDate,
        value: i64,
    },
    DateOutOfRange {
        country_region: String,
        province_state: String,
        date: NaiveDate,
    },
    DuplicateKey {
        country_region: String,
        province_state: String,
        date: NaiveDate,
        occurrences: usize,
    },
    /// active does not equal `max(confirmed - deaths - recovered, 0)`.
    InconsistentActive {
        country_region: String,
        province_state: String,
        date: NaiveDate,
        expected: i64,
        actual: i64,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey { row } => {
                write!(f, "row {row}: country_region is missing or blank")
            }
            Self::NegativeValue {
                field,
                country_region,
                province_state,
                date,
                value,
            } => write!(
                f,
                "{country_region}/{province_state} {date}: negative {field} ({value})"
            ),
            Self::DateOutOfRange {
                country_region,
                province_state,
                date,
            } => write!(
                f,
                "{country_region}/{province_state}: date {date} outside valid range"
            ),
            Self::DuplicateKey {
                country_region,
                province_state,
                date,
                occurrences,
            } => write!(
                f,
                "{country_region}/{province_state} {date}: {occurrences} records share this key"
            ),
            Self::InconsistentActive {
                country_region,
                province_state,
                date,
                expected,
                actual,
            } => write!(
                f,
                "{country_region}/{province_state} {date}: active is {actual}, expected {expected}"
            ),
        }
    }
}

/// Verdict of one validation pass. `passed` is true iff `violations` is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }
}

// ---------------------------------------------------------------------------
// Run provenance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Parse a status stored in `covid_metadata`. Unknown text maps to
    /// `Failed` so a corrupt row surfaces loudly rather than as a phantom
    /// in-flight run.
    pub fn parse(text: &str) -> Self {
        match text {
            "running" => Self::Running,
            "success" => Self::Success,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `covid_metadata`: the provenance record for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: i64,
    pub run_date: String,
    pub records_processed: i64,
    pub data_source_url: String,
    pub status: RunStatus,
    pub error_message: Option<String>,
}

/// Outcome of a successful load.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoadResult {
    pub run_id: i64,
    pub records_loaded: usize,
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// Latest-date summary of the long table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_records: i64,
    pub countries: i64,
    pub earliest_date: Option<NaiveDate>,
    pub latest_date: Option<NaiveDate>,
    pub total_confirmed: i64,
    pub total_deaths: i64,
}

/// A location's standing on the latest date, for top-N queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationTotals {
    pub country_region: String,
    pub province_state: String,
    pub date: NaiveDate,
    pub confirmed: i64,
    pub deaths: i64,
}

/// Everything the engine reports back about one pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: i64,
    pub started_at_rfc3339: String,
    pub finished_at_rfc3339: String,
    pub records_loaded: usize,
    pub data_source_url: String,
    pub stats: Option<DatasetStats>,
}
