// Engine error taxonomy
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Conditions that stop a run for one array
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid expected coverage: {0}")]
    InvalidCoverage(String),
}

/// Conditions recovered inside a run. Each one is logged and collected into
/// the run's [`IssueReport`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineIssue {
    #[error("no threshold for {refdes} parameter {parameter}")]
    MissingThreshold { refdes: String, parameter: String },

    #[error("malformed reading in {stream}: {reason}")]
    MalformedReading { stream: String, reason: String },

    #[error("no readings returned for {stream}")]
    EmptyGroupResponse { stream: String },

    #[error("unreadable {level} snapshot: {reason}")]
    CorruptSnapshot { level: String, reason: String },

    #[error("duplicate threshold rows for {refdes} parameter {parameter}")]
    AmbiguousThreshold { refdes: String, parameter: String },

    #[error("request for {stream} failed: {reason}")]
    GroupFetchFailed { stream: String, reason: String },

    #[error("annotations for {refdes} unavailable: {reason}")]
    AnnotationsUnavailable { refdes: String, reason: String },

    #[error("deployment lookup for {refdes} failed: {reason}")]
    DeploymentUnavailable { refdes: String, reason: String },

    #[error("{level} snapshot not saved: {reason}")]
    SnapshotNotSaved { level: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IssueKind {
    MissingThreshold,
    MalformedReading,
    EmptyGroupResponse,
    CorruptSnapshot,
    AmbiguousThreshold,
    GroupFetchFailed,
    AnnotationsUnavailable,
    DeploymentUnavailable,
    SnapshotNotSaved,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MissingThreshold => "missing_threshold",
            Self::MalformedReading => "malformed_reading",
            Self::EmptyGroupResponse => "empty_group_response",
            Self::CorruptSnapshot => "corrupt_snapshot",
            Self::AmbiguousThreshold => "ambiguous_threshold",
            Self::GroupFetchFailed => "group_fetch_failed",
            Self::AnnotationsUnavailable => "annotations_unavailable",
            Self::DeploymentUnavailable => "deployment_unavailable",
            Self::SnapshotNotSaved => "snapshot_not_saved",
        };
        f.write_str(name)
    }
}

impl EngineIssue {
    pub fn kind(&self) -> IssueKind {
        match self {
            Self::MissingThreshold { .. } => IssueKind::MissingThreshold,
            Self::MalformedReading { .. } => IssueKind::MalformedReading,
            Self::EmptyGroupResponse { .. } => IssueKind::EmptyGroupResponse,
            Self::CorruptSnapshot { .. } => IssueKind::CorruptSnapshot,
            Self::AmbiguousThreshold { .. } => IssueKind::AmbiguousThreshold,
            Self::GroupFetchFailed { .. } => IssueKind::GroupFetchFailed,
            Self::AnnotationsUnavailable { .. } => IssueKind::AnnotationsUnavailable,
            Self::DeploymentUnavailable { .. } => IssueKind::DeploymentUnavailable,
            Self::SnapshotNotSaved { .. } => IssueKind::SnapshotNotSaved,
        }
    }
}

/// Run-level collection of recovered issues
#[derive(Debug, Clone, Default)]
pub struct IssueReport {
    issues: Vec<EngineIssue>,
}

impl IssueReport {
    pub fn push(&mut self, issue: EngineIssue) {
        tracing::warn!("{}", issue);
        self.issues.push(issue);
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = EngineIssue>) {
        for issue in issues {
            self.push(issue);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind() == kind).count()
    }

    pub fn counts(&self) -> BTreeMap<IssueKind, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.kind()).or_insert(0) += 1;
        }
        counts
    }
}
