// File snapshot store - one JSON document per (array, level, date)
use crate::application::monitoring_source::{SnapshotError, SnapshotStore};
use crate::domain::snapshot::{Level, Snapshot};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn level_dir(&self, array: &str, level: Level) -> PathBuf {
        self.root.join(array).join(level.as_str())
    }

    async fn load(path: &Path) -> Result<Snapshot, SnapshotError> {
        let bytes = fs::read(path).await?;
        serde_json::from_slice(&bytes).map_err(|e| SnapshotError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

fn file_date(path: &Path) -> Option<NaiveDate> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    /// File names carry the date, so a directory holds at most one snapshot
    /// per date. Only the newest file before `date` is read; older history
    /// is never opened.
    async fn latest_before(
        &self,
        array: &str,
        level: Level,
        date: NaiveDate,
    ) -> Result<Option<Snapshot>, SnapshotError> {
        let dir = self.level_dir(array, level);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut newest: Option<(NaiveDate, PathBuf)> = None;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(found) = file_date(&path).filter(|d| *d < date) else {
                continue;
            };
            if newest.as_ref().is_none_or(|(best, _)| found > *best) {
                newest = Some((found, path));
            }
        }

        let Some((found, path)) = newest else {
            return Ok(None);
        };
        let snapshot = Self::load(&path).await?;
        if snapshot.level() != level {
            return Err(SnapshotError::Corrupt {
                path,
                reason: format!("holds {} keys", snapshot.level()),
            });
        }

        tracing::debug!("Loaded {} snapshot of {} for {}", level, array, found);
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let dir = self.level_dir(&snapshot.array, snapshot.level());
        fs::create_dir_all(&dir).await?;

        let path = dir.join(format!("{}.json", snapshot.date.format("%Y-%m-%d")));
        let staging = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&staging, body).await?;
        fs::rename(&staging, &path).await?;

        tracing::debug!(
            "Saved {} snapshot with {} keys to {:?}",
            snapshot.level(),
            snapshot.keys.len(),
            path
        );
        Ok(())
    }
}
