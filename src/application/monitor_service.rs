// Monitor service - Use case for one array's daily quality and availability run
use crate::application::history::{diff_level, persist};
use crate::application::monitoring_source::{MonitoringSource, SnapshotStore, StreamRequest};
use crate::application::qc_gaps::{QcGaps, find_qc_gaps};
use crate::application::range_evaluator::{GroupScore, ScoreBook, score_records};
use crate::application::reconciler::{Reconciliation, reconcile};
use crate::application::rollup::{LevelRollup, RollupResult, build_rollup};
use crate::application::snapshot_diff::LevelDiff;
use crate::application::source_queries::{load_annotations, load_coverage};
use crate::domain::coverage::{ExpectedCoverage, InstrumentKey, MethodKey, ParameterKey, StreamKey};
use crate::domain::error::{EngineIssue, IssueKind, IssueReport};
use crate::domain::scope::ArrayScope;
use crate::domain::snapshot::LevelKey;
use crate::domain::threshold::ThresholdTable;
use crate::infrastructure::config::RunConfig;
use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::{StreamExt, stream};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Diffs {
    pub parameter: LevelDiff<ParameterKey>,
    pub stream: LevelDiff<StreamKey>,
    pub method: LevelDiff<MethodKey>,
    pub instrument: LevelDiff<InstrumentKey>,
}

/// Everything one run produced for one array
#[derive(Debug, Clone)]
pub struct ArrayRun {
    pub array: String,
    pub date: NaiveDate,
    pub rollup: RollupResult,
    pub diffs: Diffs,
    /// Explained and unexplained absences are judged per stream
    pub streams: Reconciliation<StreamKey>,
    /// Contradicted annotations are judged per instrument
    pub instruments: Reconciliation<InstrumentKey>,
    pub qc_gaps: QcGaps,
    pub scores: ScoreBook,
    pub issues: IssueReport,
}

#[derive(Clone)]
pub struct MonitorService {
    source: Arc<dyn MonitoringSource>,
    store: Arc<dyn SnapshotStore>,
    run: RunConfig,
}

impl MonitorService {
    pub fn new(source: Arc<dyn MonitoringSource>, store: Arc<dyn SnapshotStore>, run: RunConfig) -> Self {
        Self { source, store, run }
    }

    /// Run every step for one array. Only a coverage or threshold failure is
    /// returned as an error; everything else degrades into the issue report.
    pub async fn run_array(&self, scope: &ArrayScope, now: DateTime<Utc>) -> anyhow::Result<ArrayRun> {
        let date = now.date_naive();
        let mut issues = IssueReport::default();

        let coverage = load_coverage(self.source.as_ref(), scope).await?;
        let (thresholds, threshold_issues) = self
            .source
            .fetch_thresholds()
            .await
            .context("Failed to fetch global range thresholds")?;
        issues.extend(threshold_issues);
        if thresholds.is_empty() {
            tracing::warn!("No global range thresholds, no parameter can be scored");
        }
        tracing::info!(
            "{}: {} expected parameters, {} thresholds",
            scope.name,
            coverage.len(),
            thresholds.len()
        );

        let coverage = self.deployed_only(coverage, &mut issues).await?;
        let annotations =
            load_annotations(self.source.as_ref(), coverage.instruments(), self.run.workers, &mut issues).await;

        let groups = self.score_streams(&coverage, &thresholds, now).await;
        let (scores, score_issues) = ScoreBook::reduce(groups);
        issues.extend(score_issues);
        if !scores.unscoreable().is_empty() {
            tracing::info!(
                "{}: {} parameters returned data without a usable global range",
                scope.name,
                scores.unscoreable().len()
            );
        }

        let rollup = build_rollup(&coverage, &thresholds, &scores.passing_keys());
        let streams = reconcile(&rollup.stream.absent, &rollup.stream.present_expected(), &annotations);
        let instruments = reconcile(
            &rollup.instrument.absent,
            &rollup.instrument.present_expected(),
            &annotations,
        );
        let qc_gaps = find_qc_gaps(scope, &coverage, &thresholds);

        let store = self.store.as_ref();
        let diffs = Diffs {
            parameter: diff_rollup(store, &scope.name, date, &rollup.parameter, &mut issues).await,
            stream: diff_rollup(store, &scope.name, date, &rollup.stream, &mut issues).await,
            method: diff_rollup(store, &scope.name, date, &rollup.method, &mut issues).await,
            instrument: diff_rollup(store, &scope.name, date, &rollup.instrument, &mut issues).await,
        };

        persist(store, &scope.name, date, now, &rollup.parameter.absent, &mut issues).await;
        persist(store, &scope.name, date, now, &rollup.stream.absent, &mut issues).await;
        persist(store, &scope.name, date, now, &rollup.method.absent, &mut issues).await;
        persist(store, &scope.name, date, now, &rollup.instrument.absent, &mut issues).await;

        tracing::info!(
            "{}: {} absent streams ({} new, {} resumed), {} failed requests",
            scope.name,
            rollup.stream.absent.len(),
            diffs.stream.new.len(),
            diffs.stream.resumed.len(),
            issues.count(IssueKind::GroupFetchFailed)
        );

        Ok(ArrayRun {
            array: scope.name.clone(),
            date,
            rollup,
            diffs,
            streams,
            instruments,
            qc_gaps,
            scores,
            issues,
        })
    }

    fn workers(&self) -> usize {
        self.run.workers.max(1)
    }

    /// Drop instruments without an open deployment. An instrument whose
    /// lookup failed stays monitored.
    async fn deployed_only(
        &self,
        coverage: ExpectedCoverage,
        issues: &mut IssueReport,
    ) -> anyhow::Result<ExpectedCoverage> {
        let source = &self.source;
        let lookups: Vec<(String, anyhow::Result<bool>)> = stream::iter(coverage.instruments())
            .map(|instrument| async move {
                let result = source.has_active_deployment(&instrument.refdes).await;
                (instrument.refdes, result)
            })
            .buffer_unordered(self.workers())
            .collect()
            .await;

        let mut deployed = BTreeSet::new();
        for (refdes, result) in lookups {
            match result {
                Ok(true) => {
                    deployed.insert(refdes);
                }
                Ok(false) => tracing::debug!("{} is not deployed, skipping", refdes),
                Err(e) => {
                    issues.push(EngineIssue::DeploymentUnavailable {
                        refdes: refdes.clone(),
                        reason: format!("{:#}", e),
                    });
                    deployed.insert(refdes);
                }
            }
        }

        coverage
            .retain_instruments(|refdes| deployed.contains(refdes))
            .context("No deployed instruments in coverage")
    }

    /// Fetch and score every expected stream group on the worker pool. Each
    /// worker returns its own result; nothing is shared between them.
    async fn score_streams(
        &self,
        coverage: &ExpectedCoverage,
        thresholds: &ThresholdTable,
        now: DateTime<Utc>,
    ) -> Vec<GroupScore> {
        let request = StreamRequest {
            begin: now - Duration::hours(self.run.lookback_hours),
            end: None,
            limit: self.run.record_limit,
        };
        let source = &self.source;
        let request = &request;

        stream::iter(coverage.streams())
            .map(|stream_key| async move {
                let expected = coverage.parameters_of(&stream_key);
                match source.fetch_stream(&stream_key, request).await {
                    Ok(records) => {
                        tracing::debug!("{}: {} records", stream_key, records.len());
                        score_records(&stream_key, &records, &expected, thresholds)
                    }
                    Err(e) => GroupScore {
                        issues: vec![EngineIssue::GroupFetchFailed {
                            stream: stream_key.to_string(),
                            reason: format!("{:#}", e),
                        }],
                        ..GroupScore::default()
                    },
                }
            })
            .buffer_unordered(self.workers())
            .collect()
            .await
    }
}

async fn diff_rollup<K: LevelKey>(
    store: &dyn SnapshotStore,
    array: &str,
    date: NaiveDate,
    rollup: &LevelRollup<K>,
    issues: &mut IssueReport,
) -> LevelDiff<K> {
    diff_level(store, array, date, &rollup.absent, &rollup.expected, issues).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::monitoring_source::SnapshotError;
    use crate::domain::annotation::{Annotation, NOT_OPERATIONAL};
    use crate::domain::deployment::Deployment;
    use crate::domain::reading::RawRecord;
    use crate::domain::scope::CatalogSource;
    use crate::domain::snapshot::{Level, Snapshot};
    use crate::domain::threshold::ThresholdTableBuilder;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    const CTD: &str = "CE01ISSM-MFD35-01-CTDBPC000";
    const PRES: &str = "CE01ISSM-MFD35-02-PRESFA000";
    const ADCP: &str = "CE02SHSM-RID26-01-ADCPTA000";
    // 2024-03-01T00:00:00Z in NTP seconds
    const DAY_START: f64 = 3_918_240_000.0;

    #[derive(Default)]
    struct FakeSource {
        catalog: Vec<ParameterKey>,
        records: HashMap<StreamKey, Vec<RawRecord>>,
        failing: BTreeSet<StreamKey>,
        annotations: Vec<Annotation>,
        undeployed: BTreeSet<String>,
    }

    #[async_trait]
    impl MonitoringSource for FakeSource {
        async fn fetch_catalog(&self, _code: &str) -> anyhow::Result<Vec<ParameterKey>> {
            Ok(self.catalog.clone())
        }

        async fn fetch_thresholds(&self) -> anyhow::Result<(ThresholdTable, Vec<EngineIssue>)> {
            let mut builder = ThresholdTableBuilder::new();
            builder
                .range(CTD, "temp", 0.0, 30.0)
                .range(PRES, "absolute_pressure", 0.0, 100.0)
                .range(ADCP, "heading", 0.0, 360.0);
            Ok(builder.build())
        }

        async fn fetch_deployments(&self, refdes: &str) -> anyhow::Result<Vec<Deployment>> {
            if self.undeployed.contains(refdes) {
                return Ok(vec![]);
            }
            Ok(vec![Deployment {
                refdes: refdes.to_string(),
                number: 1,
                start: DateTime::parse_from_rfc3339("2023-06-01T00:00:00Z")?.with_timezone(&Utc),
                end: None,
            }])
        }

        async fn fetch_annotations(&self, refdes: &str) -> anyhow::Result<Vec<Annotation>> {
            Ok(self
                .annotations
                .iter()
                .filter(|a| a.covers(refdes))
                .cloned()
                .collect())
        }

        async fn fetch_stream(&self, stream: &StreamKey, _request: &StreamRequest) -> anyhow::Result<Vec<RawRecord>> {
            if self.failing.contains(stream) {
                anyhow::bail!("status 500");
            }
            Ok(self.records.get(stream).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        snapshots: Mutex<Vec<Snapshot>>,
        corrupt: bool,
    }

    #[async_trait]
    impl SnapshotStore for MemoryStore {
        async fn latest_before(
            &self,
            array: &str,
            level: Level,
            date: NaiveDate,
        ) -> Result<Option<Snapshot>, SnapshotError> {
            if self.corrupt {
                return Err(SnapshotError::Corrupt {
                    path: PathBuf::from("CE/stream/2024-02-29.json"),
                    reason: "expected value at line 1 column 1".to_string(),
                });
            }
            let snapshots = self.snapshots.lock().unwrap();
            Ok(snapshots
                .iter()
                .filter(|s| s.array == array && s.level() == level && s.date < date)
                .max_by_key(|s| (s.date, s.created_at))
                .cloned())
        }

        async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
            let mut snapshots = self.snapshots.lock().unwrap();
            snapshots.retain(|s| !(s.array == snapshot.array && s.level() == snapshot.level() && s.date == snapshot.date));
            snapshots.push(snapshot.clone());
            Ok(())
        }
    }

    fn scope() -> ArrayScope {
        ArrayScope {
            name: "CE".to_string(),
            catalogs: vec![CatalogSource {
                code: "CE".to_string(),
                include: vec![],
                exclude: vec![],
            }],
            skip_methods: vec!["recovered".to_string()],
        }
    }

    fn ctd() -> StreamKey {
        StreamKey::new(CTD, "telemetered", "ctdbp_dcl")
    }

    fn pres() -> StreamKey {
        StreamKey::new(PRES, "telemetered", "presf_dcl")
    }

    fn adcp() -> StreamKey {
        StreamKey::new(ADCP, "telemetered", "adcp_dcl")
    }

    fn records(parameter: &str, values: &[f64]) -> Vec<RawRecord> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut record = RawRecord::new();
                record.insert("time".to_string(), json!(DAY_START + 3600.0 + i as f64 * 60.0));
                record.insert(parameter.to_string(), json!(v));
                record
            })
            .collect()
    }

    fn source() -> FakeSource {
        let mut source = FakeSource {
            catalog: vec![
                ctd().parameter("temp"),
                ctd().parameter("time"),
                pres().parameter("absolute_pressure"),
                adcp().parameter("heading"),
                ParameterKey::new(CTD, "recovered_host", "ctdbp_host", "temp"),
            ],
            ..FakeSource::default()
        };
        source.records.insert(ctd(), records("temp", &[10.0, 12.0, 40.0]));
        source
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-02T06:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn service(source: FakeSource, store: Arc<MemoryStore>) -> MonitorService {
        MonitorService::new(Arc::new(source), store, RunConfig::default())
    }

    #[tokio::test]
    async fn test_first_run_classifies_all_absences_new() {
        let store = Arc::new(MemoryStore::default());
        let run = service(source(), store.clone()).run_array(&scope(), now()).await.unwrap();

        assert_eq!(run.rollup.stream.absent, BTreeSet::from([adcp(), pres()]));
        assert_eq!(run.diffs.stream.new, run.rollup.stream.absent);
        assert!(run.diffs.stream.resumed.is_empty());
        assert_eq!(run.diffs.parameter.new, run.rollup.parameter.absent);
        assert_eq!(run.issues.count(IssueKind::EmptyGroupResponse), 2);
        assert_eq!(run.issues.count(IssueKind::CorruptSnapshot), 0);
        assert_eq!(store.snapshots.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_second_day_finds_resumed_and_ongoing() {
        let store = Arc::new(MemoryStore::default());
        service(source(), store.clone()).run_array(&scope(), now()).await.unwrap();

        let mut next = source();
        next.records.insert(pres(), records("absolute_pressure", &[10.0, 11.0]));
        let run = service(next, store.clone())
            .run_array(&scope(), now() + Duration::days(1))
            .await
            .unwrap();

        assert_eq!(run.diffs.stream.resumed, BTreeSet::from([pres()]));
        assert_eq!(run.diffs.stream.ongoing, BTreeSet::from([adcp()]));
        assert!(run.diffs.stream.new.is_empty());
        assert_eq!(store.snapshots.lock().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_out_of_range_values_keep_stream_present() {
        let mut source = source();
        source.records.insert(pres(), records("absolute_pressure", &[-1.0, -2.0]));
        let run = service(source, Arc::new(MemoryStore::default()))
            .run_array(&scope(), now())
            .await
            .unwrap();

        // timestamps arrived, only the values failed their range
        assert!(run.rollup.stream.present.contains(&pres()));
        assert!(!run.rollup.stream.absent.contains(&pres()));
        assert!(run.rollup.parameter.absent.contains(&pres().parameter("absolute_pressure")));
        assert!(!run.rollup.instrument.absent.contains(&InstrumentKey::new(PRES)));
        assert_eq!(run.issues.count(IssueKind::EmptyGroupResponse), 1);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_degrades_to_cold_start() {
        let store = Arc::new(MemoryStore {
            corrupt: true,
            ..MemoryStore::default()
        });
        let run = service(source(), store).run_array(&scope(), now()).await.unwrap();

        assert_eq!(run.issues.count(IssueKind::CorruptSnapshot), 4);
        assert_eq!(run.diffs.instrument.new, run.rollup.instrument.absent);
    }

    #[tokio::test]
    async fn test_failed_fetch_recorded_and_stream_absent() {
        let mut source = source();
        source.failing.insert(ctd());
        let run = service(source, Arc::new(MemoryStore::default()))
            .run_array(&scope(), now())
            .await
            .unwrap();

        assert!(run.rollup.stream.absent.contains(&ctd()));
        assert_eq!(run.issues.count(IssueKind::GroupFetchFailed), 1);
    }

    #[tokio::test]
    async fn test_annotations_and_deployments() {
        let mut source = source();
        source.undeployed.insert(ADCP.to_string());
        source.annotations.push(Annotation {
            subsite: "CE01ISSM".to_string(),
            platform: Some("MFD35".to_string()),
            sensor: None,
            flag: NOT_OPERATIONAL.to_string(),
            end_time: None,
        });
        let run = service(source, Arc::new(MemoryStore::default()))
            .run_array(&scope(), now())
            .await
            .unwrap();

        assert!(!run.rollup.stream.expected.contains(&adcp()));
        assert_eq!(run.streams.explained.keys().collect::<Vec<_>>(), vec![&pres()]);
        assert!(run.streams.unexplained.is_empty());
        assert!(run.instruments.contradicted.contains_key(&InstrumentKey::new(CTD)));
    }

    #[tokio::test]
    async fn test_recovered_methods_not_monitored() {
        let run = service(source(), Arc::new(MemoryStore::default()))
            .run_array(&scope(), now())
            .await
            .unwrap();

        assert!(run.rollup.stream.expected.iter().all(|s| s.method == "telemetered"));
    }

    #[tokio::test]
    async fn test_empty_coverage_is_fatal() {
        let source = FakeSource::default();
        let result = service(source, Arc::new(MemoryStore::default()))
            .run_array(&scope(), now())
            .await;

        assert!(result.is_err());
    }
}
