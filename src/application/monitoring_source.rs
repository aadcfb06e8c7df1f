// Collaborator traits for the data source and the snapshot store
use crate::domain::annotation::Annotation;
use crate::domain::coverage::{ParameterKey, StreamKey};
use crate::domain::deployment::Deployment;
use crate::domain::error::EngineIssue;
use crate::domain::reading::RawRecord;
use crate::domain::snapshot::{Level, Snapshot};
use crate::domain::threshold::ThresholdTable;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Time window and record cap of one stream request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    pub begin: DateTime<Utc>,
    /// Open-ended when `None`
    pub end: Option<DateTime<Utc>>,
    pub limit: usize,
}

#[async_trait]
pub trait MonitoringSource: Send + Sync {
    /// Entries of one portal catalog export, unfiltered
    async fn fetch_catalog(&self, code: &str) -> anyhow::Result<Vec<ParameterKey>>;

    /// Global range table plus any duplicate-row issues found while merging
    async fn fetch_thresholds(&self) -> anyhow::Result<(ThresholdTable, Vec<EngineIssue>)>;

    /// Every recorded deployment of one instrument
    async fn fetch_deployments(&self, refdes: &str) -> anyhow::Result<Vec<Deployment>>;

    /// Whether the instrument has a deployment without an end time
    async fn has_active_deployment(&self, refdes: &str) -> anyhow::Result<bool> {
        let deployments = self.fetch_deployments(refdes).await?;
        Ok(deployments.iter().any(Deployment::is_active))
    }

    async fn fetch_annotations(&self, refdes: &str) -> anyhow::Result<Vec<Annotation>>;

    /// Raw records of one stream group inside the request window
    async fn fetch_stream(
        &self,
        stream: &StreamKey,
        request: &StreamRequest,
    ) -> anyhow::Result<Vec<RawRecord>>;
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt snapshot {path:?}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("snapshot could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persistence of per-level absent sets between runs
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// The snapshot of the latest date strictly before `date`; creation time
    /// only orders snapshots of the same date
    async fn latest_before(
        &self,
        array: &str,
        level: Level,
        date: NaiveDate,
    ) -> Result<Option<Snapshot>, SnapshotError>;

    /// Replaces any snapshot with the same array, level and date
    async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError>;
}
