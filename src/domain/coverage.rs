// Coverage domain model - monitored keys at each rollup level
use crate::domain::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Data-delivery bucket used by the method rollup level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodType {
    Recovered,
    Telemetered,
    Streamed,
}

impl MethodType {
    /// Bucket a method name by substring, first match wins in the order
    /// recovered, telemetered, streamed
    pub fn classify(method: &str) -> Option<Self> {
        if method.contains("recovered") {
            Some(Self::Recovered)
        } else if method.contains("telemetered") {
            Some(Self::Telemetered)
        } else if method.contains("streamed") {
            Some(Self::Streamed)
        } else {
            None
        }
    }
}

/// Components of a reference designator (`subsite-node-sensor`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refdes<'a> {
    pub subsite: &'a str,
    pub node: &'a str,
    pub sensor: &'a str,
}

impl<'a> Refdes<'a> {
    /// The sensor part may itself contain dashes (`02-PRESFA000`)
    pub fn parse(refdes: &'a str) -> Option<Self> {
        let mut parts = refdes.splitn(3, '-');
        let subsite = parts.next().filter(|s| !s.is_empty())?;
        let node = parts.next().filter(|s| !s.is_empty())?;
        let sensor = parts.next().filter(|s| !s.is_empty())?;
        Some(Self {
            subsite,
            node,
            sensor,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParameterKey {
    pub refdes: String,
    pub method: String,
    pub stream: String,
    pub parameter: String,
}

impl ParameterKey {
    pub fn new(
        refdes: impl Into<String>,
        method: impl Into<String>,
        stream: impl Into<String>,
        parameter: impl Into<String>,
    ) -> Self {
        Self {
            refdes: refdes.into(),
            method: method.into(),
            stream: stream.into(),
            parameter: parameter.into(),
        }
    }

    pub fn stream_key(&self) -> StreamKey {
        StreamKey::new(&self.refdes, &self.method, &self.stream)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamKey {
    pub refdes: String,
    pub method: String,
    pub stream: String,
}

impl StreamKey {
    pub fn new(
        refdes: impl Into<String>,
        method: impl Into<String>,
        stream: impl Into<String>,
    ) -> Self {
        Self {
            refdes: refdes.into(),
            method: method.into(),
            stream: stream.into(),
        }
    }

    pub fn parameter(&self, parameter: impl Into<String>) -> ParameterKey {
        ParameterKey::new(&self.refdes, &self.method, &self.stream, parameter)
    }

    /// `None` when the method name fits no known bucket
    pub fn method_key(&self) -> Option<MethodKey> {
        MethodType::classify(&self.method).map(|method_type| MethodKey {
            refdes: self.refdes.clone(),
            method_type,
        })
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.refdes, self.method, self.stream, self.parameter)
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.refdes, self.method, self.stream)
    }
}

/// Platform engineering stream, tracked apart from the science streams
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineeringStreamKey(pub StreamKey);

impl fmt::Display for EngineeringStreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodKey {
    pub refdes: String,
    pub method_type: MethodType,
}

impl MethodKey {
    pub fn instrument_key(&self) -> InstrumentKey {
        InstrumentKey {
            refdes: self.refdes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentKey {
    pub refdes: String,
}

impl InstrumentKey {
    pub fn new(refdes: impl Into<String>) -> Self {
        Self {
            refdes: refdes.into(),
        }
    }
}

/// The universe of monitored (instrument, method, stream, parameter) keys
#[derive(Debug, Clone)]
pub struct ExpectedCoverage {
    parameters: BTreeSet<ParameterKey>,
}

impl ExpectedCoverage {
    /// Rejects an empty universe, blank fields, methods outside the three
    /// buckets and refdes values that are not `subsite-node-sensor`; no rollup
    /// is meaningful without valid coverage.
    pub fn new(entries: impl IntoIterator<Item = ParameterKey>) -> Result<Self, EngineError> {
        let mut parameters = BTreeSet::new();
        for entry in entries {
            if Refdes::parse(&entry.refdes).is_none() {
                return Err(EngineError::InvalidCoverage(format!(
                    "malformed reference designator '{}'",
                    entry.refdes
                )));
            }
            if entry.method.trim().is_empty()
                || entry.stream.trim().is_empty()
                || entry.parameter.trim().is_empty()
            {
                return Err(EngineError::InvalidCoverage(format!(
                    "blank method, stream or parameter for '{}'",
                    entry.refdes
                )));
            }
            // every stream must roll up into a method, or its instrument
            // could be absent while the stream is present
            if MethodType::classify(&entry.method).is_none() {
                return Err(EngineError::InvalidCoverage(format!(
                    "method '{}' of '{}' fits no method bucket",
                    entry.method, entry.refdes
                )));
            }
            parameters.insert(entry);
        }

        if parameters.is_empty() {
            return Err(EngineError::InvalidCoverage(
                "no expected coverage entries".to_string(),
            ));
        }

        Ok(Self { parameters })
    }

    pub fn parameters(&self) -> &BTreeSet<ParameterKey> {
        &self.parameters
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn contains_instrument(&self, refdes: &str) -> bool {
        self.parameters.iter().any(|p| p.refdes == refdes)
    }

    pub fn streams(&self) -> BTreeSet<StreamKey> {
        self.parameters.iter().map(ParameterKey::stream_key).collect()
    }

    pub fn methods(&self) -> BTreeSet<MethodKey> {
        self.parameters
            .iter()
            .filter_map(|p| p.stream_key().method_key())
            .collect()
    }

    pub fn instruments(&self) -> BTreeSet<InstrumentKey> {
        self.parameters
            .iter()
            .map(|p| InstrumentKey::new(&p.refdes))
            .collect()
    }

    /// Parameter names expected for one stream group
    pub fn parameters_of(&self, stream: &StreamKey) -> BTreeSet<String> {
        self.parameters
            .iter()
            .filter(|p| p.refdes == stream.refdes && p.method == stream.method && p.stream == stream.stream)
            .map(|p| p.parameter.clone())
            .collect()
    }

    /// Keep only the instruments accepted by `keep`. Fails like `new` if
    /// nothing is left.
    pub fn retain_instruments<F>(self, mut keep: F) -> Result<Self, EngineError>
    where
        F: FnMut(&str) -> bool,
    {
        Self::new(self.parameters.into_iter().filter(|p| keep(&p.refdes)))
    }
}
