use clap::Parser;

use caseload::cli::{Cli, Command, RunsOutputFormat};
use caseload::pipeline::CaseloadEngine;
use caseload::storage::RunStore;
use caseload::{EtlError, EtlResult};

fn main() {
    caseload::logging::init();

    if let Err(error) = run() {
        eprintln!("error: {error}");
        for violation in error.violations() {
            eprintln!("  - {violation}");
        }
        std::process::exit(1);
    }
}

fn run() -> EtlResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            let engine = CaseloadEngine::new(args.to_request());
            let report = engine.run()?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "run {}: loaded {} records from {}",
                    report.run_id, report.records_loaded, report.data_source_url
                );
                if let Some(stats) = &report.stats {
                    println!(
                        "latest date {}: {} locations, {} countries, {} confirmed, {} deaths",
                        stats.latest_date.map_or_else(String::new, |d| d.to_string()),
                        stats.total_records,
                        stats.countries,
                        stats.total_confirmed,
                        stats.total_deaths
                    );
                }
            }
            Ok(())
        }
        Command::Check(args) => {
            let engine = CaseloadEngine::new(args.to_request());
            let verdict = engine.check()?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&verdict)?);
            } else if verdict.passed {
                println!("all data quality checks passed");
            }

            if verdict.passed {
                Ok(())
            } else {
                Err(EtlError::ValidationFailed {
                    violations: verdict.violations,
                })
            }
        }
        Command::Runs(args) => {
            let store = RunStore::open(&args.db)?;

            let runs = if let Some(run_id) = args.id {
                match store.get_run(run_id)? {
                    Some(run) => vec![run],
                    None => {
                        return Err(EtlError::InvalidRequest(format!(
                            "no run found with id {run_id}"
                        )));
                    }
                }
            } else {
                store.list_recent_runs(args.limit)?
            };

            match args.format {
                RunsOutputFormat::Plain => {
                    for run in runs {
                        println!(
                            "{} | run {} | {} | {} records | {}{}",
                            run.run_date,
                            run.run_id,
                            run.status,
                            run.records_processed,
                            run.data_source_url,
                            run.error_message
                                .as_deref()
                                .map(|m| format!(" | {m}"))
                                .unwrap_or_default()
                        );
                    }
                }
                RunsOutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&runs)?);
                }
                RunsOutputFormat::Ndjson => {
                    for run in runs {
                        println!("{}", serde_json::to_string(&run)?);
                    }
                }
            }
            Ok(())
        }
        Command::Stats(args) => {
            let store = RunStore::open(&args.db)?;
            let stats = store.latest_stats()?;
            let top = if args.top > 0 {
                store.top_locations(args.top)?
            } else {
                Vec::new()
            };

            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "stats": stats,
                        "top_locations": top,
                    }))?
                );
                return Ok(());
            }

            match stats {
                Some(stats) => {
                    println!(
                        "{} locations across {} countries on {}",
                        stats.total_records,
                        stats.countries,
                        stats.latest_date.map_or_else(String::new, |d| d.to_string())
                    );
                    println!(
                        "date range {} to {}; {} confirmed, {} deaths on latest date",
                        stats.earliest_date.map_or_else(String::new, |d| d.to_string()),
                        stats.latest_date.map_or_else(String::new, |d| d.to_string()),
                        stats.total_confirmed,
                        stats.total_deaths
                    );
                }
                None => println!("no records loaded yet"),
            }
            for location in top {
                println!(
                    "  {:>10} confirmed | {:>8} deaths | {}{}",
                    location.confirmed,
                    location.deaths,
                    location.country_region,
                    if location.province_state.is_empty() {
                        String::new()
                    } else {
                        format!(" / {}", location.province_state)
                    }
                );
            }
            Ok(())
        }
    }
}
