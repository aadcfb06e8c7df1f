// Rollup builder - presence/absence per level, built bottom-up from passing keys
use crate::domain::coverage::{ExpectedCoverage, InstrumentKey, MethodKey, ParameterKey, StreamKey};
use crate::domain::threshold::ThresholdTable;
use std::collections::BTreeSet;

/// Expected, present and absent keys of one level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelRollup<K: Ord> {
    pub expected: BTreeSet<K>,
    /// Every key seen present, including ones outside the expected set
    pub present: BTreeSet<K>,
    pub absent: BTreeSet<K>,
}

impl<K: Ord + Clone> LevelRollup<K> {
    fn new(expected: BTreeSet<K>, present: BTreeSet<K>) -> Self {
        let absent = expected.difference(&present).cloned().collect();
        Self {
            expected,
            present,
            absent,
        }
    }

    /// Expected keys that are present
    pub fn present_expected(&self) -> BTreeSet<K> {
        self.expected.difference(&self.absent).cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupResult {
    pub parameter: LevelRollup<ParameterKey>,
    pub stream: LevelRollup<StreamKey>,
    pub method: LevelRollup<MethodKey>,
    pub instrument: LevelRollup<InstrumentKey>,
}

/// Build all four levels. Each level's present set is the projection of the
/// present set below it, so a present parent always has a present child.
pub fn build_rollup(
    coverage: &ExpectedCoverage,
    thresholds: &ThresholdTable,
    passing: &BTreeSet<ParameterKey>,
) -> RollupResult {
    // parameters without a usable threshold cannot fail a range test
    let expected_parameters = coverage
        .parameters()
        .iter()
        .filter(|p| thresholds.is_testable(&p.refdes, &p.parameter))
        .cloned()
        .collect();
    let parameter = LevelRollup::new(expected_parameters, passing.clone());

    let present_streams = parameter.present.iter().map(ParameterKey::stream_key).collect();
    let stream = LevelRollup::new(coverage.streams(), present_streams);

    // coverage guarantees a bucket for every expected method
    let present_methods = stream.present.iter().filter_map(StreamKey::method_key).collect();
    let method = LevelRollup::new(coverage.methods(), present_methods);

    let present_instruments = method.present.iter().map(MethodKey::instrument_key).collect();
    let instrument = LevelRollup::new(coverage.instruments(), present_instruments);

    RollupResult {
        parameter,
        stream,
        method,
        instrument,
    }
}
