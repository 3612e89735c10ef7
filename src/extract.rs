//! Extraction: fetch the three wide-format CSSE feeds and parse them into
//! [`RawSeriesTable`]s.
//!
//! The wide layout is four fixed leading columns (`Province/State`,
//! `Country/Region`, `Lat`, `Long`) followed by one `%m/%d/%y` column per
//! day, each cell holding a cumulative count as of that date.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;

use crate::error::{EtlError, EtlResult};
use crate::model::{LocationKey, Metric, RawSeriesRow, RawSeriesTable};

/// Default upstream: the raw-file view of the JHU CSSE repository.
pub const DEFAULT_BASE_URL: &str = "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/csse_covid_19_data/csse_covid_19_time_series";

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Number of fixed leading columns before the date columns begin.
const LEADING_COLUMNS: usize = 4;

/// Downloads the wide-format source files to a local directory.
pub struct Extractor {
    client: reqwest::blocking::Client,
    base_url: String,
    output_dir: PathBuf,
}

impl Extractor {
    pub fn new(base_url: impl Into<String>, output_dir: impl Into<PathBuf>) -> EtlResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        let client = reqwest::blocking::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|source| EtlError::Fetch {
                url: base_url.clone(),
                source,
            })?;
        Ok(Self {
            client,
            base_url,
            output_dir: output_dir.into(),
        })
    }

    /// Local path a metric's feed is (or will be) stored at.
    pub fn local_path(&self, metric: Metric) -> PathBuf {
        self.output_dir.join(metric.source_filename())
    }

    /// Download one metric's feed and write it under the output directory.
    pub fn download(&self, metric: Metric) -> EtlResult<PathBuf> {
        let url = format!("{}/{}", self.base_url, metric.source_filename());
        tracing::info!(%metric, %url, "downloading source file");

        let fetch_err = |source| EtlError::Fetch {
            url: url.clone(),
            source,
        };
        let response = self.client.get(&url).send().map_err(fetch_err)?;
        let response = response.error_for_status().map_err(fetch_err)?;
        let body = response.bytes().map_err(fetch_err)?;

        fs::create_dir_all(&self.output_dir)?;
        let path = self.local_path(metric);
        fs::write(&path, &body)?;

        tracing::info!(%metric, path = %path.display(), bytes = body.len(), "downloaded");
        Ok(path)
    }

    /// Download all three feeds, in metric order.
    pub fn download_all(&self) -> EtlResult<BTreeMap<Metric, PathBuf>> {
        let mut files = BTreeMap::new();
        for metric in Metric::ALL {
            files.insert(metric, self.download(metric)?);
        }
        Ok(files)
    }
}

/// Parse one wide-format CSV into a [`RawSeriesTable`].
///
/// Blank count cells parse as 0. Anything structurally wrong — a malformed
/// date header, a non-numeric count — is a [`EtlError::SchemaMismatch`]
/// naming the metric and the offending column or cell.
pub fn read_series_table(path: &Path, metric: Metric) -> EtlResult<RawSeriesTable> {
    let file = fs::File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader.headers()?.clone();
    if headers.len() < LEADING_COLUMNS {
        return Err(EtlError::schema_mismatch(
            metric.as_str(),
            format!(
                "expected at least {LEADING_COLUMNS} leading columns, found {}",
                headers.len()
            ),
        ));
    }

    let mut dates = Vec::with_capacity(headers.len() - LEADING_COLUMNS);
    for header in headers.iter().skip(LEADING_COLUMNS) {
        let date = parse_wide_date(header).ok_or_else(|| {
            EtlError::schema_mismatch(
                metric.as_str(),
                format!("column `{header}` is not a m/d/yy date"),
            )
        })?;
        dates.push(date);
    }

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header row; CSV lines are 1-based.
        let line = idx + 2;
        let record = result?;

        let province = record.get(0).unwrap_or("").to_owned();
        let country = record.get(1).unwrap_or("").to_owned();

        let mut counts = Vec::with_capacity(dates.len());
        for (offset, _) in dates.iter().enumerate() {
            let cell = record.get(LEADING_COLUMNS + offset).unwrap_or("");
            counts.push(parse_count(cell).ok_or_else(|| {
                EtlError::schema_mismatch(
                    metric.as_str(),
                    format!("line {line}: non-numeric count `{cell}`"),
                )
            })?);
        }

        rows.push(RawSeriesRow {
            key: LocationKey::new(country, province),
            counts,
        });
    }

    tracing::debug!(
        %metric,
        locations = rows.len(),
        dates = dates.len(),
        "parsed wide table"
    );
    Ok(RawSeriesTable { dates, rows })
}

/// Parse a CSSE date header like `1/22/20` (two-digit year, no padding).
fn parse_wide_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%m/%d/%y").ok()
}

/// Parse one count cell. Blank cells are 0; the feeds occasionally carry
/// float-formatted integers, so fall back to f64 before giving up.
fn parse_count(cell: &str) -> Option<i64> {
    if cell.is_empty() {
        return Some(0);
    }
    if let Ok(value) = cell.parse::<i64>() {
        return Some(value);
    }
    cell.parse::<f64>().ok().map(|value| value.round() as i64)
}
