// Main entry point - Dependency injection and the three daily programs
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing_subscriber::EnvFilter;

use crate::application::alert::AlertReport;
use crate::application::monitor_service::MonitorService;
use crate::application::platform_service::PlatformService;
use crate::application::stats_service::StatsService;
use crate::infrastructure::config::{MonitorConfig, load_monitor_config, render_template};
use crate::infrastructure::coverage_catalog::load_engineering_streams;
use crate::infrastructure::file_snapshot_store::FileSnapshotStore;
use crate::infrastructure::m2m_repository::M2mRepository;
use crate::presentation::report_writer::write_report;
use crate::presentation::stats_writer::write_stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Program {
    /// Science data quality and availability alerts
    Alerts,
    /// Platform engineering stream alerts
    Platforms,
    /// Per-deployment availability history
    Stats,
}

fn usage() -> String {
    [
        "qc-monitor usage:",
        "  qc-monitor [alerts] [ARRAY...]",
        "  qc-monitor platforms [PLATFORM...]",
        "  qc-monitor stats [ARRAY...]",
        "",
        "Without names every configured array or platform group is run.",
    ]
    .join("\n")
}

/// Program and the array or platform names to restrict it to
fn parse_args(args: &[String]) -> anyhow::Result<(Program, Vec<String>)> {
    let Some(first) = args.first() else {
        return Ok((Program::Alerts, vec![]));
    };
    let program = match first.as_str() {
        "alerts" => Program::Alerts,
        "platforms" => Program::Platforms,
        "stats" => Program::Stats,
        "-h" | "--help" | "help" => anyhow::bail!("{}", usage()),
        other if other.starts_with('-') => anyhow::bail!("unknown option '{}'\n\n{}", other, usage()),
        // bare names select arrays of the default program
        _ => return Ok((Program::Alerts, args.to_vec())),
    };
    Ok((program, args[1..].to_vec()))
}

fn selected(names: &[String], name: &str) -> bool {
    names.is_empty() || names.iter().any(|n| n == name)
}

fn subject(template: &str, name: &str, date: NaiveDate) -> String {
    let vars = HashMap::from([
        ("array".to_string(), name.to_string()),
        ("date".to_string(), date.format("%Y-%m-%d").to_string()),
    ]);
    render_template(template, &vars)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (program, names) = parse_args(&std::env::args().skip(1).collect::<Vec<_>>())?;

    // Load configuration
    let config = load_monitor_config()?;

    let failed = match program {
        Program::Alerts => run_alerts(&config, &names).await?,
        Program::Platforms => run_platforms(&config, &names).await?,
        Program::Stats => run_stats(&config, &names).await?,
    };

    if !failed.is_empty() {
        anyhow::bail!("Monitoring failed for: {}", failed.join(", "));
    }

    Ok(())
}

async fn run_alerts(config: &MonitorConfig, names: &[String]) -> anyhow::Result<Vec<String>> {
    if config.arrays.is_empty() {
        anyhow::bail!("No arrays configured");
    }

    // Create collaborators (infrastructure layer)
    let source = Arc::new(M2mRepository::new(&config.m2m, &config.portal)?);
    let store = Arc::new(FileSnapshotStore::new(&config.run.output_dir));

    // Create service (application layer)
    let service = MonitorService::new(source, store, config.run.clone());

    let mut failed = Vec::new();
    for scope in config.arrays.iter().filter(|s| selected(names, &s.name)) {
        let now = Utc::now();
        tracing::info!("Working on {}", scope.name);

        let run = match service.run_array(scope, now).await {
            Ok(run) => run,
            Err(e) => {
                tracing::error!("Run for {} failed: {:#}", scope.name, e);
                failed.push(scope.name.clone());
                continue;
            }
        };

        if !run.issues.is_empty() {
            for (kind, count) in run.issues.counts() {
                tracing::info!("{}: {} {} issues", scope.name, count, kind);
            }
        }
        if !run.diffs.stream.has_changes() && !run.diffs.parameter.has_changes() {
            tracing::info!("{}: no changes since the prior run", scope.name);
        }

        let report = AlertReport::compose(&run, subject(&config.run.subject_template, &run.array, run.date));

        // Render and store (presentation layer)
        match write_report(&config.run.output_dir, &report).await {
            Ok(path) => tracing::info!("{}: {:?} written to {:?}", scope.name, report.headline, path),
            Err(e) => {
                tracing::error!("Report for {} not written: {:#}", scope.name, e);
                failed.push(scope.name.clone());
            }
        }
    }

    Ok(failed)
}

async fn run_platforms(config: &MonitorConfig, names: &[String]) -> anyhow::Result<Vec<String>> {
    if config.platforms.is_empty() {
        anyhow::bail!("No platform groups configured");
    }

    let source = Arc::new(M2mRepository::new(&config.m2m, &config.portal)?);
    let store = Arc::new(FileSnapshotStore::new(&config.run.output_dir));
    let service = PlatformService::new(source, store, config.run.clone());

    let mut failed = Vec::new();
    for platform in config.platforms.iter().filter(|p| selected(names, &p.name)) {
        let now = Utc::now();
        tracing::info!("Working on {} engineering streams", platform.name);

        let outcome = match load_engineering_streams(&platform.streams_file, &platform.method).await {
            Ok(streams) => service.run_platform(&platform.name, streams, now).await,
            Err(e) => Err(e),
        };
        let run = match outcome {
            Ok(run) => run,
            Err(e) => {
                tracing::error!("Engineering run for {} failed: {:#}", platform.name, e);
                failed.push(platform.name.clone());
                continue;
            }
        };
        if run.no_data() {
            tracing::warn!("{}: no engineering stream returned data", platform.name);
        }

        let report = AlertReport::compose_platform(
            &run,
            subject(&config.run.engineering_subject_template, &run.name, run.date),
        );
        match write_report(&config.run.output_dir, &report).await {
            Ok(path) => tracing::info!("{}: {:?} written to {:?}", platform.name, report.headline, path),
            Err(e) => {
                tracing::error!("Engineering report for {} not written: {:#}", platform.name, e);
                failed.push(platform.name.clone());
            }
        }
    }

    Ok(failed)
}

async fn run_stats(config: &MonitorConfig, names: &[String]) -> anyhow::Result<Vec<String>> {
    if config.arrays.is_empty() {
        anyhow::bail!("No arrays configured");
    }

    let source = Arc::new(M2mRepository::new(&config.m2m, &config.portal)?);
    let service = StatsService::new(source, config.run.clone());

    let mut failed = Vec::new();
    for scope in config.arrays.iter().filter(|s| selected(names, &s.name)) {
        tracing::info!("Working on {} stats", scope.name);

        let run = match service.run_stats(scope, Utc::now()).await {
            Ok(run) => run,
            Err(e) => {
                tracing::error!("Stats for {} failed: {:#}", scope.name, e);
                failed.push(scope.name.clone());
                continue;
            }
        };

        if let Err(e) = write_stats(&config.run.output_dir, &run).await {
            tracing::error!("Stats tables for {} not written: {:#}", scope.name, e);
            failed.push(scope.name.clone());
            continue;
        }

        let report = AlertReport::compose_stats(
            &run,
            subject(&config.run.stats_subject_template, &run.array, run.date),
        );
        match write_report(&config.run.output_dir, &report).await {
            Ok(path) => tracing::info!("{}: stats summary written to {:?}", scope.name, path),
            Err(e) => {
                tracing::error!("Stats summary for {} not written: {:#}", scope.name, e);
                failed.push(scope.name.clone());
            }
        }
    }

    Ok(failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_program_is_alerts() {
        let (program, names) = parse_args(&[]).unwrap();
        assert_eq!(program, Program::Alerts);
        assert!(names.is_empty());

        let (program, names) = parse_args(&args(&["CE", "RS"])).unwrap();
        assert_eq!(program, Program::Alerts);
        assert_eq!(names, args(&["CE", "RS"]));
    }

    #[test]
    fn test_subcommands_take_names() {
        let (program, names) = parse_args(&args(&["stats", "GA"])).unwrap();
        assert_eq!(program, Program::Stats);
        assert_eq!(names, args(&["GA"]));

        let (program, _) = parse_args(&args(&["platforms"])).unwrap();
        assert_eq!(program, Program::Platforms);
        assert!(parse_args(&args(&["--verbose"])).is_err());
    }

    #[test]
    fn test_selected() {
        assert!(selected(&[], "CE"));
        assert!(selected(&args(&["CE"]), "CE"));
        assert!(!selected(&args(&["CE"]), "RS"));
    }
}
