// Source queries - coverage and per-instrument lookups shared by the run use cases
use crate::application::monitoring_source::MonitoringSource;
use crate::domain::annotation::Annotation;
use crate::domain::coverage::{ExpectedCoverage, InstrumentKey};
use crate::domain::deployment::Deployment;
use crate::domain::error::{EngineIssue, IssueReport};
use crate::domain::scope::ArrayScope;
use anyhow::Context;
use futures::{StreamExt, stream};
use std::collections::BTreeSet;

/// Expected coverage of one array, fatal when a catalog cannot be fetched
/// or the merged entries are not a valid universe
pub async fn load_coverage(source: &dyn MonitoringSource, scope: &ArrayScope) -> anyhow::Result<ExpectedCoverage> {
    let mut entries = Vec::new();
    for catalog in &scope.catalogs {
        let rows = source
            .fetch_catalog(&catalog.code)
            .await
            .with_context(|| format!("Failed to fetch {} coverage catalog", catalog.code))?;
        entries.extend(scope.select(catalog, rows));
    }

    ExpectedCoverage::new(entries).with_context(|| format!("No usable coverage for {}", scope.name))
}

/// Annotations of every instrument. A failed lookup leaves that instrument
/// unannotated and records `AnnotationsUnavailable`.
pub async fn load_annotations(
    source: &dyn MonitoringSource,
    instruments: BTreeSet<InstrumentKey>,
    workers: usize,
    issues: &mut IssueReport,
) -> Vec<Annotation> {
    let lookups: Vec<(String, anyhow::Result<Vec<Annotation>>)> = stream::iter(instruments)
        .map(|instrument| async move {
            let result = source.fetch_annotations(&instrument.refdes).await;
            (instrument.refdes, result)
        })
        .buffer_unordered(workers.max(1))
        .collect()
        .await;

    let mut annotations = Vec::new();
    for (refdes, result) in lookups {
        match result {
            Ok(found) => annotations.extend(found),
            Err(e) => issues.push(EngineIssue::AnnotationsUnavailable {
                refdes,
                reason: format!("{:#}", e),
            }),
        }
    }
    annotations
}

/// Deployment history of every instrument. A failed lookup drops that
/// instrument and records `DeploymentUnavailable`.
pub async fn load_deployments(
    source: &dyn MonitoringSource,
    instruments: BTreeSet<InstrumentKey>,
    workers: usize,
    issues: &mut IssueReport,
) -> Vec<Deployment> {
    let lookups: Vec<(String, anyhow::Result<Vec<Deployment>>)> = stream::iter(instruments)
        .map(|instrument| async move {
            let result = source.fetch_deployments(&instrument.refdes).await;
            (instrument.refdes, result)
        })
        .buffer_unordered(workers.max(1))
        .collect()
        .await;

    let mut deployments = Vec::new();
    for (refdes, result) in lookups {
        match result {
            Ok(found) => deployments.extend(found),
            Err(e) => issues.push(EngineIssue::DeploymentUnavailable {
                refdes,
                reason: format!("{:#}", e),
            }),
        }
    }
    deployments.sort_by(|a, b| (&a.refdes, a.number).cmp(&(&b.refdes, b.number)));
    deployments
}
