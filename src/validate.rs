//! Data-quality gate over the long-format table.
//!
//! Every check runs over the whole input — no short-circuiting — so one
//! validation pass reports every problem at once. The validator never
//! mutates or drops rows; the loader must not proceed when `passed` is
//! false.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};

use crate::model::{LongRecord, ValidationReport, Violation};
use crate::reshape::derive_active;

/// Earliest date any record may carry.
pub const MIN_VALID_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2020, 1, 1) {
    Some(date) => date,
    None => unreachable!(),
};

/// Run the full check battery with today's date as the upper bound.
pub fn validate(records: &[LongRecord]) -> ValidationReport {
    validate_as_of(records, Utc::now().date_naive())
}

/// Run the full check battery with an explicit upper date bound.
///
/// The valid date window is `[2020-01-01, today]`, both ends inclusive.
pub fn validate_as_of(records: &[LongRecord], today: NaiveDate) -> ValidationReport {
    let mut violations = Vec::new();

    check_missing_keys(records, &mut violations);
    check_negative_values(records, &mut violations);
    check_date_range(records, today, &mut violations);
    check_duplicate_keys(records, &mut violations);
    check_active_consistency(records, &mut violations);

    let report = ValidationReport::new(violations);
    if report.passed {
        tracing::info!(records = records.len(), "data quality checks passed");
    } else {
        tracing::warn!(
            records = records.len(),
            violations = report.violations.len(),
            "data quality checks failed"
        );
    }
    report
}

fn check_missing_keys(records: &[LongRecord], violations: &mut Vec<Violation>) {
    for (row, record) in records.iter().enumerate() {
        if record.country_region.trim().is_empty() {
            violations.push(Violation::MissingKey { row });
        }
    }
}

fn check_negative_values(records: &[LongRecord], violations: &mut Vec<Violation>) {
    for record in records {
        let fields = [
            ("confirmed", record.confirmed),
            ("deaths", record.deaths),
            ("recovered", record.recovered),
            ("active", record.active),
        ];
        for (field, value) in fields {
            if value < 0 {
                violations.push(Violation::NegativeValue {
                    field: field.to_owned(),
                    country_region: record.country_region.clone(),
                    province_state: record.province_state.clone(),
                    date: record.date,
                    value,
                });
            }
        }
    }
}

fn check_date_range(records: &[LongRecord], today: NaiveDate, violations: &mut Vec<Violation>) {
    for record in records {
        if record.date < MIN_VALID_DATE || record.date > today {
            violations.push(Violation::DateOutOfRange {
                country_region: record.country_region.clone(),
                province_state: record.province_state.clone(),
                date: record.date,
            });
        }
    }
}

fn check_duplicate_keys(records: &[LongRecord], violations: &mut Vec<Violation>) {
    let mut occurrences: BTreeMap<(&str, &str, NaiveDate), usize> = BTreeMap::new();
    for record in records {
        *occurrences.entry(record.key()).or_insert(0) += 1;
    }
    for ((country, province, date), count) in occurrences {
        if count > 1 {
            violations.push(Violation::DuplicateKey {
                country_region: country.to_owned(),
                province_state: province.to_owned(),
                date,
                occurrences: count,
            });
        }
    }
}

fn check_active_consistency(records: &[LongRecord], violations: &mut Vec<Violation>) {
    for record in records {
        let expected = derive_active(record.confirmed, record.deaths, record.recovered);
        if record.active != expected {
            violations.push(Violation::InconsistentActive {
                country_region: record.country_region.clone(),
                province_state: record.province_state.clone(),
                date: record.date,
                expected,
                actual: record.active,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(country: &str, province: &str, day: NaiveDate) -> LongRecord {
        LongRecord {
            country_region: country.to_owned(),
            province_state: province.to_owned(),
            date: day,
            confirmed: 10,
            deaths: 2,
            recovered: 3,
            active: 5,
        }
    }

    const TODAY: NaiveDate = match NaiveDate::from_ymd_opt(2020, 6, 1) {
        Some(d) => d,
        None => unreachable!(),
    };

    #[test]
    fn clean_records_pass() {
        let records = vec![
            record("US", "", date(2020, 1, 22)),
            record("US", "", date(2020, 1, 23)),
            record("Italy", "", date(2020, 1, 22)),
        ];
        let report = validate_as_of(&records, TODAY);
        assert!(report.passed);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn blank_country_is_missing_key() {
        let records = vec![record("   ", "", date(2020, 2, 1))];
        let report = validate_as_of(&records, TODAY);
        assert!(!report.passed);
        assert!(matches!(report.violations[0], Violation::MissingKey { row: 0 }));
    }

    #[test]
    fn negative_value_cites_field_location_and_date() {
        let mut bad = record("US", "New York", date(2020, 3, 1));
        bad.deaths = -1;
        bad.active = derive_active(bad.confirmed, bad.deaths, bad.recovered);

        let report = validate_as_of(&[bad], TODAY);
        assert!(!report.passed);
        match &report.violations[0] {
            Violation::NegativeValue {
                field,
                country_region,
                province_state,
                date: when,
                value,
            } => {
                assert_eq!(field, "deaths");
                assert_eq!(country_region, "US");
                assert_eq!(province_state, "New York");
                assert_eq!(*when, date(2020, 3, 1));
                assert_eq!(*value, -1);
            }
            other => panic!("expected NegativeValue, got {other:?}"),
        }
    }

    #[test]
    fn date_window_is_inclusive_on_both_ends() {
        let before = record("US", "", date(2019, 12, 31));
        let floor = record("US", "", date(2020, 1, 1));
        let ceiling = record("US", "", TODAY);
        let after = record("US", "", date(2020, 6, 2));

        assert!(!validate_as_of(&[before], TODAY).passed);
        assert!(validate_as_of(&[floor], TODAY).passed);
        assert!(validate_as_of(&[ceiling], TODAY).passed);
        assert!(!validate_as_of(&[after], TODAY).passed);
    }

    #[test]
    fn duplicate_key_reports_occurrence_count() {
        let mut second = record("US", "", date(2020, 1, 22));
        second.confirmed = 99;
        second.active = derive_active(second.confirmed, second.deaths, second.recovered);
        let records = vec![record("US", "", date(2020, 1, 22)), second];

        let report = validate_as_of(&records, TODAY);
        assert!(!report.passed);
        match &report.violations[0] {
            Violation::DuplicateKey { occurrences, .. } => assert_eq!(*occurrences, 2),
            other => panic!("expected DuplicateKey, got {other:?}"),
        }
    }

    #[test]
    fn inconsistent_active_is_reported() {
        let mut bad = record("US", "", date(2020, 2, 2));
        bad.active = 999;
        let report = validate_as_of(&[bad], TODAY);
        assert!(!report.passed);
        assert!(matches!(
            report.violations[0],
            Violation::InconsistentActive { expected: 5, actual: 999, .. }
        ));
    }

    #[test]
    fn all_checks_run_and_report_together() {
        // One record tripping three separate checks at once.
        let mut bad = record("", "", date(2019, 1, 1));
        bad.confirmed = -5;
        bad.active = derive_active(bad.confirmed, bad.deaths, bad.recovered);
        let records = vec![bad.clone(), bad];

        let report = validate_as_of(&records, TODAY);
        let has = |pred: fn(&Violation) -> bool| report.violations.iter().any(pred);
        assert!(has(|v| matches!(v, Violation::MissingKey { .. })));
        assert!(has(|v| matches!(v, Violation::NegativeValue { .. })));
        assert!(has(|v| matches!(v, Violation::DateOutOfRange { .. })));
        assert!(has(|v| matches!(v, Violation::DuplicateKey { .. })));
    }

    #[test]
    fn validation_does_not_mutate_input() {
        let records = vec![record("US", "", date(2020, 1, 22))];
        let snapshot = records.clone();
        let _ = validate_as_of(&records, TODAY);
        assert_eq!(records, snapshot);
    }
}
