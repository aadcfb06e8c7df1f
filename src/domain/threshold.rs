// Global range thresholds keyed by (instrument, parameter)
use crate::domain::error::EngineIssue;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Threshold {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Threshold {
    /// Both bounds, when both are present and numeric
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match (self.min, self.max) {
            (Some(min), Some(max)) if !min.is_nan() && !max.is_nan() => Some((min, max)),
            _ => None,
        }
    }

    /// Strict on both sides: a value equal to either bound fails
    pub fn admits(&self, value: f64) -> Option<bool> {
        self.bounds().map(|(min, max)| min < value && value < max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Min,
    Max,
}

#[derive(Debug, Clone, Default)]
pub struct ThresholdTable {
    entries: BTreeMap<(String, String), Threshold>,
}

impl ThresholdTable {
    pub fn get(&self, refdes: &str, parameter: &str) -> Option<&Threshold> {
        self.entries.get(&(refdes.to_string(), parameter.to_string()))
    }

    /// A key is testable when a threshold row exists with both bounds
    pub fn is_testable(&self, refdes: &str, parameter: &str) -> bool {
        self.get(refdes, parameter)
            .and_then(Threshold::bounds)
            .is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.keys().map(|(r, p)| (r.as_str(), p.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Accumulates threshold rows; a bound seen twice for the same key keeps the
/// last value and records an `AmbiguousThreshold` issue.
#[derive(Debug, Default)]
pub struct ThresholdTableBuilder {
    table: ThresholdTable,
    issues: Vec<EngineIssue>,
}

impl ThresholdTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bound(&mut self, refdes: &str, parameter: &str, bound: Bound, value: f64) -> &mut Self {
        let entry = self
            .table
            .entries
            .entry((refdes.to_string(), parameter.to_string()))
            .or_default();

        let slot = match bound {
            Bound::Min => &mut entry.min,
            Bound::Max => &mut entry.max,
        };
        if slot.is_some() {
            tracing::debug!(
                "Duplicate {:?} threshold for {} {}, keeping last value {}",
                bound,
                refdes,
                parameter,
                value
            );
            self.issues.push(EngineIssue::AmbiguousThreshold {
                refdes: refdes.to_string(),
                parameter: parameter.to_string(),
            });
        }
        *slot = Some(value);
        self
    }

    pub fn range(&mut self, refdes: &str, parameter: &str, min: f64, max: f64) -> &mut Self {
        self.bound(refdes, parameter, Bound::Min, min)
            .bound(refdes, parameter, Bound::Max, max)
    }

    pub fn build(self) -> (ThresholdTable, Vec<EngineIssue>) {
        (self.table, self.issues)
    }
}
