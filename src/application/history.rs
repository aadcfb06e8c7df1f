// Run history - loads the prior absent set of a level and stores today's
use crate::application::monitoring_source::SnapshotStore;
use crate::application::snapshot_diff::{LevelDiff, classify};
use crate::domain::error::{EngineIssue, IssueReport};
use crate::domain::snapshot::{LevelKey, Snapshot};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;

/// Prior absent set of one level, `None` on a cold start. An unreadable
/// prior is a cold start too, recorded as `CorruptSnapshot`.
pub async fn prior_absent<K: LevelKey>(
    store: &dyn SnapshotStore,
    array: &str,
    date: NaiveDate,
    issues: &mut IssueReport,
) -> Option<BTreeSet<K>> {
    let level = K::LEVEL;
    match store.latest_before(array, level, date).await {
        Ok(Some(snapshot)) => {
            let found = snapshot.level();
            let keys = K::unwrap(snapshot.keys);
            if keys.is_none() {
                issues.push(EngineIssue::CorruptSnapshot {
                    level: level.to_string(),
                    reason: format!("holds {} keys", found),
                });
            }
            keys
        }
        Ok(None) => {
            tracing::info!("No {} snapshot for {} before {}, cold start", level, array, date);
            None
        }
        Err(e) => {
            issues.push(EngineIssue::CorruptSnapshot {
                level: level.to_string(),
                reason: e.to_string(),
            });
            None
        }
    }
}

/// Diff today's absent set of one level against the prior run
pub async fn diff_level<K: LevelKey>(
    store: &dyn SnapshotStore,
    array: &str,
    date: NaiveDate,
    absent: &BTreeSet<K>,
    expected: &BTreeSet<K>,
    issues: &mut IssueReport,
) -> LevelDiff<K> {
    let prior = prior_absent::<K>(store, array, date, issues).await;
    classify(absent, prior.as_ref(), expected)
}

pub async fn persist<K: LevelKey>(
    store: &dyn SnapshotStore,
    array: &str,
    date: NaiveDate,
    now: DateTime<Utc>,
    absent: &BTreeSet<K>,
    issues: &mut IssueReport,
) {
    let snapshot = Snapshot::new(array, date, now, absent.clone());
    if let Err(e) = store.save(&snapshot).await {
        issues.push(EngineIssue::SnapshotNotSaved {
            level: K::LEVEL.to_string(),
            reason: e.to_string(),
        });
    }
}
