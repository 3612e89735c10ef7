//! Performance benchmarks for the reshape hot path.
//!
//! Covers the wide-to-long melt/join over synthetic tables sized like a
//! real CSSE snapshot slice, plus the validation battery over the result.

use chrono::NaiveDate;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use caseload::model::{LocationKey, RawSeriesRow, RawSeriesTable};
use caseload::reshape::{RawTables, reshape};
use caseload::validate::validate_as_of;

/// Build a synthetic wide table: `locations` rows, `days` date columns.
fn make_table(locations: usize, days: usize, base: i64) -> RawSeriesTable {
    let start = NaiveDate::from_ymd_opt(2020, 1, 22).unwrap();
    let dates: Vec<NaiveDate> = (0..days)
        .map(|offset| start + chrono::Days::new(offset as u64))
        .collect();

    let rows = (0..locations)
        .map(|i| RawSeriesRow {
            key: LocationKey::new(format!("Country{i}"), ""),
            counts: (0..days).map(|d| base + (i * d) as i64).collect(),
        })
        .collect();

    RawSeriesTable { dates, rows }
}

fn make_tables(locations: usize, days: usize) -> RawTables {
    RawTables {
        confirmed: make_table(locations, days, 100),
        deaths: make_table(locations, days, 2),
        recovered: make_table(locations, days, 30),
    }
}

fn bench_reshape(c: &mut Criterion) {
    let mut group = c.benchmark_group("reshape/wide_to_long");
    for (locations, days) in [(50, 30), (200, 90)] {
        let tables = make_tables(locations, days);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{locations}x{days}")),
            &tables,
            |b, tables| b.iter(|| reshape(tables).expect("reshape")),
        );
    }
    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let today = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
    let records = reshape(&make_tables(200, 90)).expect("reshape");

    let mut group = c.benchmark_group("validate/battery");
    group.bench_function("200x90", |b| {
        b.iter(|| validate_as_of(&records, today));
    });
    group.finish();
}

criterion_group!(benches, bench_reshape, bench_validate);
criterion_main!(benches);
