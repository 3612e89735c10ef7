//! Durable store: run provenance plus the long-format case table.
//!
//! Two tables, per the relational schema this pipeline maintains:
//! `covid_metadata` (one row per pipeline run) and `covid_daily_cases`
//! (one row per location/date, unique on that key). Re-running a load with
//! identical data overwrites rows in place; only the run history grows.

use std::fs;
use std::path::Path;

use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{EtlError, EtlResult};
use crate::model::{
    DatasetStats, LoadResult, LocationTotals, LongRecord, RunRecord, RunStatus,
};

/// Log a progress line every this many upserted rows.
const PROGRESS_INTERVAL: usize = 10_000;

const UPSERT_SQL: &str = "\
INSERT INTO covid_daily_cases
    (country_region, province_state, date, confirmed, deaths, recovered, active, run_id, created_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
ON CONFLICT(country_region, province_state, date) DO UPDATE SET
    confirmed = excluded.confirmed,
    deaths = excluded.deaths,
    recovered = excluded.recovered,
    active = excluded.active,
    run_id = excluded.run_id,
    created_at = excluded.created_at";

pub struct RunStore {
    connection: Connection,
}

impl std::fmt::Debug for RunStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunStore").finish_non_exhaustive()
    }
}

impl RunStore {
    /// Current schema version. Bump when adding migrations.
    pub const SCHEMA_VERSION: u32 = 1;

    pub fn open(db_path: &Path) -> EtlResult<Self> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let connection = Connection::open(db_path)?;
        let store = Self { connection };
        store.initialize_schema()?;
        Ok(store)
    }

    /// In-memory store, for tests.
    pub fn open_in_memory() -> EtlResult<Self> {
        let store = Self {
            connection: Connection::open_in_memory()?,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> EtlResult<()> {
        // journal_mode returns a result row, so query it rather than execute.
        let _ = self
            .connection
            .query_row("PRAGMA journal_mode=WAL;", [], |row| {
                row.get::<_, String>(0)
            });
        self.connection
            .busy_timeout(std::time::Duration::from_millis(5000))?;
        self.connection.pragma_update(None, "foreign_keys", true)?;

        self.connection.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS covid_metadata (
    run_id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_date TEXT NOT NULL,
    records_processed INTEGER NOT NULL DEFAULT 0,
    data_source_url TEXT NOT NULL,
    status TEXT NOT NULL,
    error_message TEXT
);

CREATE TABLE IF NOT EXISTS covid_daily_cases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    country_region TEXT NOT NULL,
    province_state TEXT NOT NULL DEFAULT '',
    date TEXT NOT NULL,
    confirmed INTEGER NOT NULL DEFAULT 0,
    deaths INTEGER NOT NULL DEFAULT 0,
    recovered INTEGER NOT NULL DEFAULT 0,
    active INTEGER NOT NULL DEFAULT 0,
    run_id INTEGER NOT NULL REFERENCES covid_metadata(run_id),
    created_at TEXT NOT NULL,
    UNIQUE (country_region, province_state, date)
);

CREATE INDEX IF NOT EXISTS idx_daily_cases_country_date
    ON covid_daily_cases (country_region, date);
CREATE INDEX IF NOT EXISTS idx_daily_cases_date
    ON covid_daily_cases (date);
CREATE INDEX IF NOT EXISTS idx_daily_cases_run
    ON covid_daily_cases (run_id);

CREATE TABLE IF NOT EXISTS _meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#,
        )?;

        self.connection.execute(
            "INSERT OR REPLACE INTO _meta (key, value) VALUES ('schema_version', ?1)",
            params![Self::SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Run provenance
    // -----------------------------------------------------------------------

    /// Open a new run record in `running` state and return its id.
    pub fn open_run(&self, source_url: &str) -> EtlResult<i64> {
        self.connection.execute(
            "INSERT INTO covid_metadata (run_date, data_source_url, status) VALUES (?1, ?2, ?3)",
            params![Utc::now().to_rfc3339(), source_url, RunStatus::Running.as_str()],
        )?;
        let run_id = self.connection.last_insert_rowid();
        tracing::info!(run_id, source_url, "opened pipeline run");
        Ok(run_id)
    }

    /// Finalize a run exactly once. Fails if the run does not exist or has
    /// already left the `running` state.
    pub fn finalize_run(
        &self,
        run_id: i64,
        status: RunStatus,
        records_processed: i64,
        error_message: Option<&str>,
    ) -> EtlResult<()> {
        let updated = self.connection.execute(
            "UPDATE covid_metadata
             SET records_processed = ?1, status = ?2, error_message = ?3
             WHERE run_id = ?4 AND status = ?5",
            params![
                records_processed,
                status.as_str(),
                error_message,
                run_id,
                RunStatus::Running.as_str()
            ],
        )?;
        if updated != 1 {
            return Err(EtlError::Storage(format!(
                "run {run_id} is not open for finalization"
            )));
        }
        tracing::info!(run_id, %status, records_processed, "finalized pipeline run");
        Ok(())
    }

    /// Record a run that failed before any load attempt started
    /// (schema mismatch, validation gate). A failed run always leaves a
    /// `covid_metadata` row explaining what happened.
    pub fn record_failed_run(&self, source_url: &str, error_message: &str) -> EtlResult<i64> {
        self.connection.execute(
            "INSERT INTO covid_metadata (run_date, data_source_url, status, error_message)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                Utc::now().to_rfc3339(),
                source_url,
                RunStatus::Failed.as_str(),
                error_message
            ],
        )?;
        let run_id = self.connection.last_insert_rowid();
        tracing::warn!(run_id, error_message, "recorded failed run");
        Ok(run_id)
    }

    // -----------------------------------------------------------------------
    // Load protocol
    // -----------------------------------------------------------------------

    /// Upsert one long record under the given run.
    ///
    /// Keyed on (country_region, province_state, date): an existing row has
    /// its metric columns, run linkage and created_at overwritten; a new key
    /// is inserted. Runs in autocommit, so rows applied before a later
    /// failure stay committed.
    pub fn upsert_record(&self, record: &LongRecord, run_id: i64) -> EtlResult<()> {
        let mut statement = self.connection.prepare_cached(UPSERT_SQL)?;
        statement.execute(params![
            record.country_region,
            record.province_state,
            record.date,
            record.confirmed,
            record.deaths,
            record.recovered,
            record.active,
            run_id,
            Utc::now().to_rfc3339(),
        ])?;
        Ok(())
    }

    /// Execute the full load protocol: open a run, upsert every record,
    /// finalize. On a storage failure mid-upsert, remaining rows are
    /// skipped, the run is finalized `failed` with the error message, and
    /// [`EtlError::Load`] propagates to the caller. The run record is never
    /// left `running`.
    pub fn load(&self, records: &[LongRecord], source_url: &str) -> EtlResult<LoadResult> {
        let run_id = self.open_run(source_url)?;
        tracing::info!(run_id, records = records.len(), "load started");

        let mut applied = 0usize;
        match self.upsert_all(records, run_id, &mut applied) {
            Ok(()) => {
                self.finalize_run(run_id, RunStatus::Success, applied as i64, None)?;
                Ok(LoadResult {
                    run_id,
                    records_loaded: applied,
                })
            }
            Err(error) => {
                let message = error.to_string();
                if let Err(finalize_error) =
                    self.finalize_run(run_id, RunStatus::Failed, applied as i64, Some(&message))
                {
                    tracing::error!(run_id, %finalize_error, "could not finalize failed run");
                }
                Err(EtlError::Load { run_id, message })
            }
        }
    }

    fn upsert_all(
        &self,
        records: &[LongRecord],
        run_id: i64,
        applied: &mut usize,
    ) -> EtlResult<()> {
        for record in records {
            self.upsert_record(record, run_id)?;
            *applied += 1;
            if *applied % PROGRESS_INTERVAL == 0 {
                tracing::info!(run_id, applied = *applied, total = records.len(), "loading");
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get_run(&self, run_id: i64) -> EtlResult<Option<RunRecord>> {
        let record = self
            .connection
            .query_row(
                "SELECT run_id, run_date, records_processed, data_source_url, status, error_message
                 FROM covid_metadata WHERE run_id = ?1",
                params![run_id],
                map_run_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Run history, newest first.
    pub fn list_recent_runs(&self, limit: usize) -> EtlResult<Vec<RunRecord>> {
        let mut statement = self.connection.prepare(
            "SELECT run_id, run_date, records_processed, data_source_url, status, error_message
             FROM covid_metadata ORDER BY run_id DESC LIMIT ?1",
        )?;
        let rows = statement.query_map(params![limit as i64], map_run_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Summary of the long table as of its latest date. `None` when empty.
    pub fn latest_stats(&self) -> EtlResult<Option<DatasetStats>> {
        let (earliest, latest): (Option<NaiveDate>, Option<NaiveDate>) =
            self.connection.query_row(
                "SELECT MIN(date), MAX(date) FROM covid_daily_cases",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
        let (Some(earliest), Some(latest)) = (earliest, latest) else {
            return Ok(None);
        };

        let stats = self.connection.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT country_region),
                    COALESCE(SUM(confirmed), 0), COALESCE(SUM(deaths), 0)
             FROM covid_daily_cases WHERE date = ?1",
            params![latest],
            |row| {
                Ok(DatasetStats {
                    total_records: row.get(0)?,
                    countries: row.get(1)?,
                    earliest_date: Some(earliest),
                    latest_date: Some(latest),
                    total_confirmed: row.get(2)?,
                    total_deaths: row.get(3)?,
                })
            },
        )?;
        Ok(Some(stats))
    }

    /// Top locations by confirmed count on the latest date.
    pub fn top_locations(&self, limit: usize) -> EtlResult<Vec<LocationTotals>> {
        let mut statement = self.connection.prepare(
            "SELECT country_region, province_state, date, confirmed, deaths
             FROM covid_daily_cases
             WHERE date = (SELECT MAX(date) FROM covid_daily_cases)
             ORDER BY confirmed DESC, country_region ASC
             LIMIT ?1",
        )?;
        let rows = statement.query_map(params![limit as i64], |row| {
            Ok(LocationTotals {
                country_region: row.get(0)?,
                province_state: row.get(1)?,
                date: row.get(2)?,
                confirmed: row.get(3)?,
                deaths: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn record_count(&self) -> EtlResult<i64> {
        Ok(self
            .connection
            .query_row("SELECT COUNT(*) FROM covid_daily_cases", [], |row| {
                row.get(0)
            })?)
    }

    /// Fetch one long record by its unique key.
    pub fn find_record(
        &self,
        country_region: &str,
        province_state: &str,
        date: NaiveDate,
    ) -> EtlResult<Option<LongRecord>> {
        let record = self
            .connection
            .query_row(
                "SELECT country_region, province_state, date, confirmed, deaths, recovered, active
                 FROM covid_daily_cases
                 WHERE country_region = ?1 AND province_state = ?2 AND date = ?3",
                params![country_region, province_state, date],
                |row| {
                    Ok(LongRecord {
                        country_region: row.get(0)?,
                        province_state: row.get(1)?,
                        date: row.get(2)?,
                        confirmed: row.get(3)?,
                        deaths: row.get(4)?,
                        recovered: row.get(5)?,
                        active: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}

fn map_run_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        run_id: row.get(0)?,
        run_date: row.get(1)?,
        records_processed: row.get(2)?,
        data_source_url: row.get(3)?,
        status: RunStatus::parse(&row.get::<_, String>(4)?),
        error_message: row.get(5)?,
    })
}
