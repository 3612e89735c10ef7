//! Reshaping: wide time-series tables to the unified long format.
//!
//! Each metric table is melted into (location, date, value) triples, then
//! the three melted streams are full-outer-joined on (location, date) via an
//! ordered map. A location/date present in only one metric survives the join
//! with 0 for the missing metrics; the long table's numeric columns are
//! never null. `active` is derived after the join.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::error::{EtlError, EtlResult};
use crate::model::{LocationKey, LongRecord, Metric, RawSeriesTable};

/// The three wide inputs of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RawTables {
    pub confirmed: RawSeriesTable,
    pub deaths: RawSeriesTable,
    pub recovered: RawSeriesTable,
}

impl RawTables {
    fn table(&self, metric: Metric) -> &RawSeriesTable {
        match metric {
            Metric::Confirmed => &self.confirmed,
            Metric::Deaths => &self.deaths,
            Metric::Recovered => &self.recovered,
        }
    }
}

/// Join accumulator: the metric values seen so far for one (location, date).
#[derive(Debug, Default)]
struct MetricCell {
    confirmed: Option<i64>,
    deaths: Option<i64>,
    recovered: Option<i64>,
}

/// Convert the three wide tables into long-format records.
///
/// Every non-empty table must carry the same set of date columns; a date
/// present in one metric and absent from another fails with
/// [`EtlError::SchemaMismatch`] naming the metric and the missing date. A
/// table with no date columns at all (a feed that produced nothing)
/// contributes nothing and is not a mismatch.
///
/// Pure function: no side effects, deterministic output order.
pub fn reshape(tables: &RawTables) -> EtlResult<Vec<LongRecord>> {
    check_date_alignment(tables)?;

    // Keyed by (location, date, occurrence). The occurrence index carries
    // duplicated source rows through the join so the validator can report
    // them as DuplicateKey instead of the reshape silently collapsing them.
    let mut cells: BTreeMap<(LocationKey, NaiveDate, usize), MetricCell> = BTreeMap::new();

    for metric in Metric::ALL {
        melt_into(tables.table(metric), metric, &mut cells);
    }

    let records = cells
        .into_iter()
        .map(|((key, date, _occurrence), cell)| {
            let confirmed = cell.confirmed.unwrap_or(0);
            let deaths = cell.deaths.unwrap_or(0);
            let recovered = cell.recovered.unwrap_or(0);
            LongRecord {
                country_region: key.country_region,
                province_state: key.province_state,
                date,
                confirmed,
                deaths,
                recovered,
                active: derive_active(confirmed, deaths, recovered),
            }
        })
        .collect::<Vec<_>>();

    tracing::debug!(records = records.len(), "reshaped wide tables to long format");
    Ok(records)
}

/// `active = confirmed - deaths - recovered`, floored at zero.
pub fn derive_active(confirmed: i64, deaths: i64, recovered: i64) -> i64 {
    (confirmed - deaths - recovered).max(0)
}

fn check_date_alignment(tables: &RawTables) -> EtlResult<()> {
    let populated: Vec<(Metric, BTreeSet<NaiveDate>)> = Metric::ALL
        .into_iter()
        .map(|metric| (metric, tables.table(metric)))
        .filter(|(_, table)| !table.is_empty())
        .map(|(metric, table)| (metric, table.dates.iter().copied().collect()))
        .collect();

    let union: BTreeSet<NaiveDate> = populated
        .iter()
        .flat_map(|(_, dates)| dates.iter().copied())
        .collect();

    for (metric, dates) in &populated {
        if let Some(missing) = union.iter().find(|date| !dates.contains(date)) {
            return Err(EtlError::schema_mismatch(
                metric.as_str(),
                format!("missing date column {missing}"),
            ));
        }
    }
    Ok(())
}

fn melt_into(
    table: &RawSeriesTable,
    metric: Metric,
    cells: &mut BTreeMap<(LocationKey, NaiveDate, usize), MetricCell>,
) {
    let mut row_occurrences: HashMap<&LocationKey, usize> = HashMap::new();

    for row in &table.rows {
        let counter = row_occurrences.entry(&row.key).or_insert(0);
        let occurrence = *counter;
        *counter += 1;

        for (date, value) in table.dates.iter().zip(&row.counts) {
            let cell = cells
                .entry((row.key.clone(), *date, occurrence))
                .or_default();
            match metric {
                Metric::Confirmed => cell.confirmed = Some(*value),
                Metric::Deaths => cell.deaths = Some(*value),
                Metric::Recovered => cell.recovered = Some(*value),
            }
        }
    }
}
