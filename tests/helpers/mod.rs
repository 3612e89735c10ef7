#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use caseload::model::{LongRecord, Metric};
use caseload::pipeline::PipelineRequest;
use chrono::NaiveDate;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn long_record(country: &str, province: &str, day: NaiveDate, confirmed: i64) -> LongRecord {
    LongRecord {
        country_region: country.to_owned(),
        province_state: province.to_owned(),
        date: day,
        confirmed,
        deaths: 0,
        recovered: 0,
        active: confirmed,
    }
}

/// Write one wide CSV under `data_dir` with the metric's canonical filename.
pub fn write_wide_csv(data_dir: &Path, metric: Metric, contents: &str) -> PathBuf {
    fs::create_dir_all(data_dir).expect("create data dir");
    let path = data_dir.join(metric.source_filename());
    fs::write(&path, contents).expect("write fixture csv");
    path
}

/// Write a consistent three-feed snapshot: two locations, two days, all
/// checks passing.
pub fn write_clean_snapshot(data_dir: &Path) {
    write_wide_csv(
        data_dir,
        Metric::Confirmed,
        "Province/State,Country/Region,Lat,Long,1/22/20,1/23/20\n\
         ,US,37.0,-95.7,1,4\n\
         Victoria,Australia,-37.8,144.9,0,2\n",
    );
    write_wide_csv(
        data_dir,
        Metric::Deaths,
        "Province/State,Country/Region,Lat,Long,1/22/20,1/23/20\n\
         ,US,37.0,-95.7,0,1\n\
         Victoria,Australia,-37.8,144.9,0,0\n",
    );
    write_wide_csv(
        data_dir,
        Metric::Recovered,
        "Province/State,Country/Region,Lat,Long,1/22/20,1/23/20\n\
         ,US,37.0,-95.7,0,1\n\
         Victoria,Australia,-37.8,144.9,0,1\n",
    );
}

/// An offline request rooted in a temp directory: fixtures under
/// `<root>/raw`, database at `<root>/store.sqlite3`.
pub fn offline_request(root: &Path) -> PipelineRequest {
    PipelineRequest {
        db_path: root.join("store.sqlite3"),
        data_dir: root.join("raw"),
        base_url: "http://unused.invalid".to_owned(),
        offline: true,
    }
}
