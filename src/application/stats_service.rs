// Stats service - Use case for the per-day availability history of one array
use crate::application::monitoring_source::{MonitoringSource, StreamRequest};
use crate::application::qc_gaps::{QcGaps, find_qc_gaps};
use crate::application::range_evaluator::{GroupScore, ScoreBook, score_records};
use crate::application::rollup::{RollupResult, build_rollup};
use crate::application::source_queries::{load_coverage, load_deployments};
use crate::domain::coverage::{ExpectedCoverage, StreamKey};
use crate::domain::deployment::Deployment;
use crate::domain::error::{EngineIssue, IssueKind, IssueReport};
use crate::domain::scope::ArrayScope;
use crate::domain::threshold::ThresholdTable;
use crate::infrastructure::config::RunConfig;
use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use futures::{StreamExt, stream};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// requests stay inside the calendar day on both ends
const DAY_MARGIN_SECS: i64 = 5;

/// Rollup of one day with at least one deployed instrument
#[derive(Debug, Clone)]
pub struct DayRollup {
    pub day: NaiveDate,
    pub rollup: RollupResult,
}

/// Everything one stats run produced for one array
#[derive(Debug, Clone)]
pub struct StatsRun {
    pub array: String,
    pub date: NaiveDate,
    /// Oldest day first
    pub days: Vec<DayRollup>,
    pub qc_gaps: QcGaps,
    pub issues: IssueReport,
}

#[derive(Clone)]
pub struct StatsService {
    source: Arc<dyn MonitoringSource>,
    run: RunConfig,
}

/// Instruments deployed on each day
fn deployed_days(deployments: &[Deployment], now: DateTime<Utc>) -> BTreeMap<NaiveDate, BTreeSet<String>> {
    let mut days: BTreeMap<NaiveDate, BTreeSet<String>> = BTreeMap::new();
    for deployment in deployments {
        for day in deployment.days(now) {
            days.entry(day).or_default().insert(deployment.refdes.clone());
        }
    }
    days
}

/// The day's request window, a few seconds inside midnight on both sides
fn day_window(day: NaiveDate, limit: usize) -> StreamRequest {
    let midnight = day.and_time(NaiveTime::MIN).and_utc();
    StreamRequest {
        begin: midnight + Duration::seconds(DAY_MARGIN_SECS),
        end: Some(midnight + Duration::days(1) - Duration::seconds(DAY_MARGIN_SECS)),
        limit,
    }
}

impl StatsService {
    pub fn new(source: Arc<dyn MonitoringSource>, run: RunConfig) -> Self {
        Self { source, run }
    }

    /// Score every deployed day of every instrument of the array. Stats cover
    /// recovered methods too, so the scope's skipped methods are ignored.
    pub async fn run_stats(&self, scope: &ArrayScope, now: DateTime<Utc>) -> anyhow::Result<StatsRun> {
        let mut issues = IssueReport::default();
        let scope = ArrayScope {
            skip_methods: vec![],
            ..scope.clone()
        };

        let coverage = load_coverage(self.source.as_ref(), &scope).await?;
        let (thresholds, threshold_issues) = self
            .source
            .fetch_thresholds()
            .await
            .context("Failed to fetch global range thresholds")?;
        issues.extend(threshold_issues);

        let deployments =
            load_deployments(self.source.as_ref(), coverage.instruments(), self.run.workers, &mut issues).await;
        let days = deployed_days(&deployments, now);
        tracing::info!(
            "{}: {} deployments over {} days",
            scope.name,
            deployments.len(),
            days.len()
        );

        let requests: Vec<(StreamKey, NaiveDate)> = days
            .iter()
            .flat_map(|(day, deployed)| {
                coverage
                    .streams()
                    .into_iter()
                    .filter(|s| deployed.contains(&s.refdes))
                    .map(move |s| (s, *day))
            })
            .collect();
        tracing::debug!("{}: {} stream days to request", scope.name, requests.len());

        let groups = self.score_days(&coverage, &thresholds, requests).await;
        let (scores, score_issues) = ScoreBook::reduce(groups);
        issues.extend(score_issues);

        let mut rollups = Vec::new();
        for (day, deployed) in &days {
            let Ok(day_coverage) = coverage.clone().retain_instruments(|refdes| deployed.contains(refdes)) else {
                continue;
            };
            let rollup = build_rollup(&day_coverage, &thresholds, &scores.passing_keys_on(*day));
            rollups.push(DayRollup { day: *day, rollup });
        }

        let qc_gaps = find_qc_gaps(&scope, &coverage, &thresholds);
        tracing::info!(
            "{}: stats for {} days, {} empty stream days",
            scope.name,
            rollups.len(),
            issues.count(IssueKind::EmptyGroupResponse)
        );

        Ok(StatsRun {
            array: scope.name.clone(),
            date: now.date_naive(),
            days: rollups,
            qc_gaps,
            issues,
        })
    }

    async fn score_days(
        &self,
        coverage: &ExpectedCoverage,
        thresholds: &ThresholdTable,
        requests: Vec<(StreamKey, NaiveDate)>,
    ) -> Vec<GroupScore> {
        let source = &self.source;
        let limit = self.run.stats_record_limit;

        stream::iter(requests)
            .map(|(stream_key, day)| async move {
                let expected = coverage.parameters_of(&stream_key);
                match source.fetch_stream(&stream_key, &day_window(day, limit)).await {
                    Ok(records) => score_records(&stream_key, &records, &expected, thresholds),
                    Err(e) => GroupScore {
                        issues: vec![EngineIssue::GroupFetchFailed {
                            stream: format!("{} on {}", stream_key, day),
                            reason: format!("{:#}", e),
                        }],
                        ..GroupScore::default()
                    },
                }
            })
            .buffer_unordered(self.run.workers.max(1))
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::annotation::Annotation;
    use crate::domain::coverage::{InstrumentKey, ParameterKey};
    use crate::domain::reading::RawRecord;
    use crate::domain::scope::CatalogSource;
    use crate::domain::threshold::ThresholdTableBuilder;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const CTD: &str = "CE01ISSM-MFD35-01-CTDBPC000";
    const PRES: &str = "CE01ISSM-MFD35-02-PRESFA000";
    // 2024-03-01T00:00:00Z in NTP seconds
    const MARCH_1: f64 = 3_918_240_000.0;

    #[derive(Default)]
    struct FakeSource {
        catalog: Vec<ParameterKey>,
        deployments: Vec<Deployment>,
        /// Records per stream and day
        records: HashMap<(StreamKey, NaiveDate), Vec<RawRecord>>,
        requests: Mutex<Vec<StreamRequest>>,
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
                .range(CTD, "oxygen", 0.0, 400.0);
            Ok(builder.build())
        }

        async fn fetch_deployments(&self, refdes: &str) -> anyhow::Result<Vec<Deployment>> {
            if refdes == PRES {
                anyhow::bail!("status 500");
            }
            Ok(self.deployments.iter().filter(|d| d.refdes == refdes).cloned().collect())
        }

        async fn fetch_annotations(&self, _refdes: &str) -> anyhow::Result<Vec<Annotation>> {
            Ok(vec![])
        }

        async fn fetch_stream(&self, stream: &StreamKey, request: &StreamRequest) -> anyhow::Result<Vec<RawRecord>> {
            self.requests.lock().unwrap().push(*request);
            let day = request.begin.date_naive();
            Ok(self.records.get(&(stream.clone(), day)).cloned().unwrap_or_default())
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

    fn telemetered() -> StreamKey {
        StreamKey::new(CTD, "telemetered", "ctdbp_dcl")
    }

    fn recovered() -> StreamKey {
        StreamKey::new(CTD, "recovered_inst", "ctdbp_instrument")
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn at(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text).unwrap().with_timezone(&Utc)
    }

    fn temps(on: u32, values: &[f64]) -> Vec<RawRecord> {
        let midnight = MARCH_1 + f64::from(on - 1) * 86_400.0;
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut record = RawRecord::new();
                record.insert("time".to_string(), json!(midnight + 600.0 + i as f64 * 60.0));
                record.insert("temp".to_string(), json!(v));
                record
            })
            .collect()
    }

    fn source() -> FakeSource {
        let mut source = FakeSource {
            catalog: vec![
                telemetered().parameter("temp"),
                recovered().parameter("temp"),
                StreamKey::new(PRES, "telemetered", "presf_dcl").parameter("absolute_pressure"),
            ],
            deployments: vec![Deployment {
                refdes: CTD.to_string(),
                number: 9,
                start: at("2024-03-01T12:00:00Z"),
                end: Some(at("2024-03-04T00:00:00Z")),
            }],
            ..FakeSource::default()
        };
        source.records.insert((telemetered(), day(1)), temps(1, &[10.0, 11.0]));
        source.records.insert((recovered(), day(2)), temps(2, &[10.0, 11.0]));
        source
    }

    #[tokio::test]
    async fn test_each_deployed_day_gets_its_own_rollup() {
        let run = StatsService::new(Arc::new(source()), RunConfig::default())
            .run_stats(&scope(), at("2024-03-10T06:00:00Z"))
            .await
            .unwrap();

        let days: Vec<NaiveDate> = run.days.iter().map(|d| d.day).collect();
        assert_eq!(days, vec![day(1), day(2)]);

        let first = &run.days[0].rollup;
        assert!(first.stream.present.contains(&telemetered()));
        assert!(first.stream.absent.contains(&recovered()));

        // the recovered stream keeps the instrument present on the second day
        let second = &run.days[1].rollup;
        assert!(second.stream.absent.contains(&telemetered()));
        assert!(second.stream.present.contains(&recovered()));
        assert!(second.instrument.absent.is_empty());
    }

    #[tokio::test]
    async fn test_failed_deployment_lookup_drops_instrument() {
        let run = StatsService::new(Arc::new(source()), RunConfig::default())
            .run_stats(&scope(), at("2024-03-10T06:00:00Z"))
            .await
            .unwrap();

        assert_eq!(run.issues.count(IssueKind::DeploymentUnavailable), 1);
        assert!(
            run.days
                .iter()
                .all(|d| !d.rollup.instrument.expected.contains(&InstrumentKey::new(PRES)))
        );
    }

    #[tokio::test]
    async fn test_requests_cover_one_day_each() {
        let source = Arc::new(source());
        StatsService::new(source.clone(), RunConfig::default())
            .run_stats(&scope(), at("2024-03-10T06:00:00Z"))
            .await
            .unwrap();

        let requests = source.requests.lock().unwrap();
        // two streams on each of two days
        assert_eq!(requests.len(), 4);
        let first = requests.iter().min_by_key(|r| r.begin).unwrap();
        assert_eq!(first.begin, at("2024-03-01T00:00:05Z"));
        assert_eq!(first.end, Some(at("2024-03-01T23:59:55Z")));
        assert_eq!(first.limit, 50);
    }

    #[tokio::test]
    async fn test_qc_gaps_reported() {
        let run = StatsService::new(Arc::new(source()), RunConfig::default())
            .run_stats(&scope(), at("2024-03-10T06:00:00Z"))
            .await
            .unwrap();

        assert!(
            run.qc_gaps
                .missing_classification
                .iter()
                .any(|p| p.refdes == CTD && p.parameter == "oxygen")
        );
    }

    #[test]
    fn test_deployed_days_merge_instruments() {
        let deployments = vec![
            Deployment {
                refdes: CTD.to_string(),
                number: 1,
                start: at("2024-03-01T00:00:00Z"),
                end: Some(at("2024-03-03T00:00:00Z")),
            },
            Deployment {
                refdes: PRES.to_string(),
                number: 1,
                start: at("2024-03-02T00:00:00Z"),
                end: None,
            },
        ];

        let days = deployed_days(&deployments, at("2024-03-04T01:00:00Z"));
        assert_eq!(days[&day(1)], BTreeSet::from([CTD.to_string()]));
        assert_eq!(days[&day(2)], BTreeSet::from([CTD.to_string(), PRES.to_string()]));
        assert_eq!(days[&day(3)], BTreeSet::from([PRES.to_string()]));
        assert_eq!(days.len(), 3);
    }
}
