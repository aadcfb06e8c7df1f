// QC definition gaps - catalog entries and range tests that do not line up
use crate::domain::coverage::ExpectedCoverage;
use crate::domain::reading::is_time_parameter;
use crate::domain::scope::ArrayScope;
use crate::domain::threshold::ThresholdTable;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct InstrumentParameter {
    pub refdes: String,
    pub parameter: String,
}

impl InstrumentParameter {
    pub fn new(refdes: &str, parameter: &str) -> Self {
        Self {
            refdes: refdes.to_string(),
            parameter: parameter.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QcGaps {
    /// Expected parameters with no usable global range
    pub missing_qc_definitions: BTreeSet<InstrumentParameter>,
    /// Global ranges for this array that no catalog entry expects
    pub missing_classification: BTreeSet<InstrumentParameter>,
}

pub fn find_qc_gaps(
    scope: &ArrayScope,
    coverage: &ExpectedCoverage,
    thresholds: &ThresholdTable,
) -> QcGaps {
    let expected: BTreeSet<InstrumentParameter> = coverage
        .parameters()
        .iter()
        .filter(|p| !is_time_parameter(&p.parameter))
        .map(|p| InstrumentParameter::new(&p.refdes, &p.parameter))
        .collect();

    let missing_qc_definitions = expected
        .iter()
        .filter(|p| !thresholds.is_testable(&p.refdes, &p.parameter))
        .cloned()
        .collect();

    let missing_classification = thresholds
        .keys()
        .filter(|(refdes, _)| scope.claims(refdes) && coverage.contains_instrument(refdes))
        .map(|(refdes, parameter)| InstrumentParameter::new(refdes, parameter))
        .filter(|p| !expected.contains(p))
        .collect();

    QcGaps {
        missing_qc_definitions,
        missing_classification,
    }
}
