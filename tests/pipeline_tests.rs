//! End-to-end pipeline tests for CaseloadEngine.
//!
//! These exercise the full offline path: fixture CSVs on disk through
//! extract, reshape, the validation gate, and the SQLite load, including
//! the provenance rows each outcome must leave behind.

mod helpers;

use caseload::model::{Metric, RunStatus};
use caseload::pipeline::CaseloadEngine;
use caseload::storage::RunStore;
use caseload::EtlError;

use helpers::{date, offline_request, write_clean_snapshot, write_wide_csv};

#[test]
fn full_run_loads_and_finalizes_success() {
    let dir = tempfile::tempdir().expect("tempdir");
    let request = offline_request(dir.path());
    write_clean_snapshot(&request.data_dir);

    let report = CaseloadEngine::new(request.clone()).run().expect("run");
    assert_eq!(report.records_loaded, 4); // 2 locations x 2 days

    let store = RunStore::open(&request.db_path).expect("open store");
    assert_eq!(store.record_count().expect("count"), 4);

    let run = store
        .get_run(report.run_id)
        .expect("query")
        .expect("present");
    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.records_processed, 4);

    // Spot-check one joined row: US on 1/23 is confirmed=4, deaths=1,
    // recovered=1, active=2.
    let us = store
        .find_record("US", "", date(2020, 1, 23))
        .expect("query")
        .expect("present");
    assert_eq!((us.confirmed, us.deaths, us.recovered, us.active), (4, 1, 1, 2));

    let stats = report.stats.expect("stats after load");
    assert_eq!(stats.latest_date, Some(date(2020, 1, 23)));
    assert_eq!(stats.countries, 2);
}

#[test]
fn rerunning_identical_data_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let request = offline_request(dir.path());
    write_clean_snapshot(&request.data_dir);
    let engine = CaseloadEngine::new(request.clone());

    let first = engine.run().expect("first run");
    let second = engine.run().expect("second run");
    assert_ne!(first.run_id, second.run_id);

    let store = RunStore::open(&request.db_path).expect("open store");

    // Long-table content is unchanged; only run history grew.
    assert_eq!(store.record_count().expect("count"), 4);
    let us = store
        .find_record("US", "", date(2020, 1, 22))
        .expect("query")
        .expect("present");
    assert_eq!((us.confirmed, us.deaths, us.recovered, us.active), (1, 0, 0, 1));

    let runs = store.list_recent_runs(10).expect("list");
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == RunStatus::Success));
}

#[test]
fn negative_value_blocks_load_and_records_failed_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let request = offline_request(dir.path());
    write_clean_snapshot(&request.data_dir);
    write_wide_csv(
        &request.data_dir,
        Metric::Deaths,
        "Province/State,Country/Region,Lat,Long,1/22/20,1/23/20\n\
         ,US,37.0,-95.7,-3,1\n",
    );

    let error = CaseloadEngine::new(request.clone()).run().unwrap_err();
    assert!(matches!(error, EtlError::ValidationFailed { .. }));
    assert!(!error.violations().is_empty());

    let store = RunStore::open(&request.db_path).expect("open store");
    assert_eq!(store.record_count().expect("count"), 0);

    let runs = store.list_recent_runs(10).expect("list");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].error_message.is_some());
}

#[test]
fn out_of_range_date_blocks_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let request = offline_request(dir.path());
    for metric in Metric::ALL {
        write_wide_csv(
            &request.data_dir,
            metric,
            "Province/State,Country/Region,Lat,Long,12/31/19\n\
             ,US,37.0,-95.7,1\n",
        );
    }

    let error = CaseloadEngine::new(request.clone()).run().unwrap_err();
    assert!(matches!(error, EtlError::ValidationFailed { .. }));

    let store = RunStore::open(&request.db_path).expect("open store");
    assert_eq!(store.record_count().expect("count"), 0);
}

#[test]
fn duplicate_source_rows_block_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let request = offline_request(dir.path());
    write_clean_snapshot(&request.data_dir);
    write_wide_csv(
        &request.data_dir,
        Metric::Confirmed,
        "Province/State,Country/Region,Lat,Long,1/22/20,1/23/20\n\
         ,US,37.0,-95.7,1,4\n\
         ,US,37.0,-95.7,9,9\n",
    );

    let error = CaseloadEngine::new(request.clone()).run().unwrap_err();
    assert!(matches!(error, EtlError::ValidationFailed { .. }));

    // Neither duplicate was loaded.
    let store = RunStore::open(&request.db_path).expect("open store");
    assert_eq!(store.record_count().expect("count"), 0);
}

#[test]
fn schema_mismatch_records_failed_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let request = offline_request(dir.path());
    write_clean_snapshot(&request.data_dir);
    // Deaths feed is missing the 1/23 column.
    write_wide_csv(
        &request.data_dir,
        Metric::Deaths,
        "Province/State,Country/Region,Lat,Long,1/22/20\n\
         ,US,37.0,-95.7,0\n",
    );

    let error = CaseloadEngine::new(request.clone()).run().unwrap_err();
    match &error {
        EtlError::SchemaMismatch { metric, detail } => {
            assert_eq!(*metric, "deaths");
            assert!(detail.contains("2020-01-23"));
        }
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }

    let store = RunStore::open(&request.db_path).expect("open store");
    let runs = store.list_recent_runs(10).expect("list");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(
        runs[0]
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("schema mismatch"))
    );
}

#[test]
fn check_validates_without_touching_the_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let request = offline_request(dir.path());
    write_clean_snapshot(&request.data_dir);

    let verdict = CaseloadEngine::new(request.clone()).check().expect("check");
    assert!(verdict.passed);
    assert!(!request.db_path.exists());
}

#[test]
fn offline_mode_requires_downloaded_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let request = offline_request(dir.path());
    // No fixtures written.

    let error = CaseloadEngine::new(request).check().unwrap_err();
    assert!(matches!(error, EtlError::InvalidRequest(_)));
}
