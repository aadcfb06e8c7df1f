// Reading domain model - single observations extracted from raw records
use crate::domain::coverage::{ParameterKey, StreamKey};
use crate::domain::error::EngineIssue;
use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use std::collections::BTreeSet;

/// Field names carrying a record's timestamp
pub const VIRTUAL_TIMES: [&str; 4] = ["time", "met_timeflx", "botsflu_time15s", "botsflu_time24h"];

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch
const NTP_UNIX_OFFSET_SECS: f64 = 2_208_988_800.0;

pub type RawRecord = serde_json::Map<String, Value>;

pub fn is_time_parameter(name: &str) -> bool {
    VIRTUAL_TIMES.contains(&name)
}

/// Whether a record carries any timestamp; enough to count an engineering
/// stream as producing data
pub fn has_time_field(record: &RawRecord) -> bool {
    VIRTUAL_TIMES
        .iter()
        .any(|name| record.get(*name).is_some_and(|v| !v.is_null()))
}

/// UTC calendar date of an NTP timestamp in seconds
pub fn ntp_to_date(seconds: f64) -> Option<NaiveDate> {
    if !seconds.is_finite() {
        return None;
    }
    let unix = (seconds - NTP_UNIX_OFFSET_SECS).floor() as i64;
    DateTime::from_timestamp(unix, 0).map(|dt| dt.date_naive())
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadingValue {
    Scalar(f64),
    /// 2-D instruments report a profile per record
    Sequence(Vec<f64>),
}

impl ReadingValue {
    /// The scalar, or the first non-missing element of a sequence
    pub fn representative(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) if !v.is_nan() => Some(*v),
            Self::Scalar(_) => None,
            Self::Sequence(values) => values.iter().copied().find(|v| !v.is_nan()),
        }
    }

    fn from_json(value: &Value) -> Result<Option<Self>, String> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_f64()
                .map(|v| Some(Self::Scalar(v)))
                .ok_or_else(|| format!("unrepresentable number {}", n)),
            Value::String(s) if s.eq_ignore_ascii_case("nan") => Ok(None),
            Value::Array(items) => items
                .iter()
                .map(element_as_f64)
                .collect::<Result<Vec<_>, _>>()
                .map(|values| Some(Self::Sequence(values))),
            other => Err(format!("non-numeric value {}", other)),
        }
    }
}

fn element_as_f64(value: &Value) -> Result<f64, String> {
    match value {
        Value::Null => Ok(f64::NAN),
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("unrepresentable number {}", n)),
        Value::String(s) if s.eq_ignore_ascii_case("nan") => Ok(f64::NAN),
        other => Err(format!("non-numeric element {}", other)),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub key: ParameterKey,
    pub value: ReadingValue,
    pub date: NaiveDate,
    pub is_time: bool,
}

/// Readings of one record plus the issues found while extracting them
#[derive(Debug, Default)]
pub struct Extraction {
    pub readings: Vec<Reading>,
    pub issues: Vec<EngineIssue>,
}

/// Extract the time readings and the `wanted` parameter readings of one
/// record. A record whose time cannot be read is rejected as a whole.
pub fn extract_readings(
    stream: &StreamKey,
    record: &RawRecord,
    wanted: &BTreeSet<String>,
) -> Result<Extraction, EngineIssue> {
    let malformed = |reason: String| EngineIssue::MalformedReading {
        stream: stream.to_string(),
        reason,
    };

    let mut extraction = Extraction::default();
    let mut record_date = None;

    for name in VIRTUAL_TIMES {
        let Some(raw) = record.get(name) else {
            continue;
        };
        match raw.as_f64().and_then(|s| ntp_to_date(s).map(|d| (s, d))) {
            Some((seconds, date)) => {
                record_date.get_or_insert(date);
                extraction.readings.push(Reading {
                    key: stream.parameter(name),
                    value: ReadingValue::Scalar(seconds),
                    date,
                    is_time: true,
                });
            }
            None => extraction
                .issues
                .push(malformed(format!("unparseable {} value {}", name, raw))),
        }
    }

    let Some(date) = record_date else {
        return Err(malformed("record has no readable time field".to_string()));
    };

    for name in wanted.iter().filter(|n| !is_time_parameter(n)) {
        let Some(raw) = record.get(name) else {
            continue;
        };
        match ReadingValue::from_json(raw) {
            Ok(Some(value)) if value.representative().is_some() => {
                extraction.readings.push(Reading {
                    key: stream.parameter(name.as_str()),
                    value,
                    date,
                    is_time: false,
                });
            }
            // all-missing values are dropped without counting against the key
            Ok(_) => {}
            Err(reason) => extraction
                .issues
                .push(malformed(format!("{}: {}", name, reason))),
        }
    }

    Ok(extraction)
}
