// Platform service - Use case for the daily engineering stream check of one platform group
use crate::application::history::{diff_level, persist};
use crate::application::monitoring_source::{MonitoringSource, SnapshotStore, StreamRequest};
use crate::application::reconciler::{Reconciliation, reconcile};
use crate::application::snapshot_diff::LevelDiff;
use crate::application::source_queries::load_annotations;
use crate::domain::coverage::{EngineeringStreamKey, InstrumentKey, StreamKey};
use crate::domain::error::{EngineIssue, IssueKind, IssueReport};
use crate::domain::reading::has_time_field;
use crate::infrastructure::config::RunConfig;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::{StreamExt, stream};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Everything one engineering stream run produced for one platform group
#[derive(Debug, Clone)]
pub struct PlatformRun {
    pub name: String,
    pub date: NaiveDate,
    pub expected: BTreeSet<EngineeringStreamKey>,
    pub absent: BTreeSet<EngineeringStreamKey>,
    pub diff: LevelDiff<EngineeringStreamKey>,
    pub streams: Reconciliation<EngineeringStreamKey>,
    pub issues: IssueReport,
}

impl PlatformRun {
    /// Not a single engineering stream answered, which points at the
    /// extraction side rather than the platforms
    pub fn no_data(&self) -> bool {
        !self.expected.is_empty() && self.absent.len() == self.expected.len()
    }
}

#[derive(Clone)]
pub struct PlatformService {
    source: Arc<dyn MonitoringSource>,
    store: Arc<dyn SnapshotStore>,
    run: RunConfig,
}

impl PlatformService {
    pub fn new(source: Arc<dyn MonitoringSource>, store: Arc<dyn SnapshotStore>, run: RunConfig) -> Self {
        Self { source, store, run }
    }

    /// A stream is present when any record inside the lookback window carries
    /// a timestamp. Values are not range tested.
    pub async fn run_platform(
        &self,
        name: &str,
        streams: Vec<StreamKey>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<PlatformRun> {
        let date = now.date_naive();
        let mut issues = IssueReport::default();

        let expected: BTreeSet<EngineeringStreamKey> = streams.into_iter().map(EngineeringStreamKey).collect();
        if expected.is_empty() {
            anyhow::bail!("No engineering streams listed for {}", name);
        }
        tracing::info!("{}: {} engineering streams", name, expected.len());

        let instruments: BTreeSet<InstrumentKey> = expected
            .iter()
            .map(|k| InstrumentKey::new(k.0.refdes.clone()))
            .collect();
        let annotations = load_annotations(self.source.as_ref(), instruments, self.run.workers, &mut issues).await;

        let absent = self.silent_streams(&expected, now, &mut issues).await;
        let present = expected.difference(&absent).cloned().collect();
        let streams = reconcile(&absent, &present, &annotations);

        let store = self.store.as_ref();
        let diff = diff_level(store, name, date, &absent, &expected, &mut issues).await;
        persist(store, name, date, now, &absent, &mut issues).await;

        tracing::info!(
            "{}: {} silent engineering streams ({} new, {} resumed), {} failed requests",
            name,
            absent.len(),
            diff.new.len(),
            diff.resumed.len(),
            issues.count(IssueKind::GroupFetchFailed)
        );

        Ok(PlatformRun {
            name: name.to_string(),
            date,
            expected,
            absent,
            diff,
            streams,
            issues,
        })
    }

    async fn silent_streams(
        &self,
        expected: &BTreeSet<EngineeringStreamKey>,
        now: DateTime<Utc>,
        issues: &mut IssueReport,
    ) -> BTreeSet<EngineeringStreamKey> {
        let request = StreamRequest {
            begin: now - Duration::hours(self.run.lookback_hours),
            end: None,
            limit: self.run.engineering_record_limit,
        };
        let source = &self.source;
        let request = &request;

        let checks: Vec<(EngineeringStreamKey, Option<EngineIssue>)> = stream::iter(expected.iter().cloned())
            .map(|key| async move {
                let failure = match source.fetch_stream(&key.0, request).await {
                    Ok(records) if records.iter().any(has_time_field) => None,
                    Ok(_) => Some(EngineIssue::EmptyGroupResponse {
                        stream: key.to_string(),
                    }),
                    Err(e) => Some(EngineIssue::GroupFetchFailed {
                        stream: key.to_string(),
                        reason: format!("{:#}", e),
                    }),
                };
                (key, failure)
            })
            .buffer_unordered(self.run.workers.max(1))
            .collect()
            .await;

        let mut absent = BTreeSet::new();
        for (key, failure) in checks {
            if let Some(issue) = failure {
                issues.push(issue);
                absent.insert(key);
            }
        }
        absent
    }
}
