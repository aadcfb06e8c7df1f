// Range evaluator - scores one stream group's readings against global ranges
use crate::domain::coverage::{ParameterKey, StreamKey};
use crate::domain::error::EngineIssue;
use crate::domain::reading::{RawRecord, Reading, extract_readings};
use crate::domain::threshold::ThresholdTable;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Pass/total counts of one parameter key on one day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyScore {
    pub key: ParameterKey,
    pub date: NaiveDate,
    pub pass_count: usize,
    pub total_count: usize,
}

impl DailyScore {
    pub fn percent(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        100.0 * self.pass_count as f64 / self.total_count as f64
    }

    /// Strictly more than half of the readings passed
    pub fn passes(&self) -> bool {
        self.pass_count * 2 > self.total_count
    }
}

/// Pure result of scoring one group; merged with other groups afterwards
#[derive(Debug, Clone, Default)]
pub struct GroupScore {
    pub scores: Vec<DailyScore>,
    /// Keys that produced readings but have no usable threshold
    pub unscoreable: BTreeSet<ParameterKey>,
    pub issues: Vec<EngineIssue>,
}

/// Most frequent reading date; ties go to the earliest date
fn modal_date(readings: &[Reading]) -> Option<NaiveDate> {
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for reading in readings {
        *counts.entry(reading.date).or_insert(0) += 1;
    }

    let mut best: Option<(NaiveDate, usize)> = None;
    for (date, count) in counts {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((date, count));
        }
    }
    best.map(|(date, _)| date)
}

/// Score already-extracted readings of one group
pub fn evaluate_group(stream: &StreamKey, readings: &[Reading], thresholds: &ThresholdTable) -> GroupScore {
    let mut result = GroupScore::default();

    let Some(day) = modal_date(readings) else {
        result.issues.push(EngineIssue::EmptyGroupResponse {
            stream: stream.to_string(),
        });
        return result;
    };

    let mut tallies: BTreeMap<&ParameterKey, (usize, usize)> = BTreeMap::new();
    let mut off_day = 0;

    for reading in readings {
        if reading.date != day {
            off_day += 1;
            continue;
        }

        let passed = if reading.is_time {
            true
        } else {
            let Some(value) = reading.value.representative() else {
                continue;
            };
            let verdict = thresholds
                .get(&reading.key.refdes, &reading.key.parameter)
                .and_then(|t| t.admits(value));
            match verdict {
                Some(passed) => passed,
                None => {
                    if result.unscoreable.insert(reading.key.clone()) {
                        result.issues.push(EngineIssue::MissingThreshold {
                            refdes: reading.key.refdes.clone(),
                            parameter: reading.key.parameter.clone(),
                        });
                    }
                    continue;
                }
            }
        };

        let tally = tallies.entry(&reading.key).or_insert((0, 0));
        if passed {
            tally.0 += 1;
        }
        tally.1 += 1;
    }

    if off_day > 0 {
        tracing::debug!("Dropped {} readings of {} dated off {}", off_day, stream, day);
    }

    result.scores = tallies
        .into_iter()
        .map(|(key, (pass_count, total_count))| DailyScore {
            key: key.clone(),
            date: day,
            pass_count,
            total_count,
        })
        .collect();

    result
}

/// Extract readings from raw records and score them. `expected` names the
/// parameters the coverage catalog lists for this stream.
pub fn score_records(
    stream: &StreamKey,
    records: &[RawRecord],
    expected: &BTreeSet<String>,
    thresholds: &ThresholdTable,
) -> GroupScore {
    let mut wanted = expected.clone();
    wanted.extend(
        thresholds
            .keys()
            .filter(|(refdes, _)| *refdes == stream.refdes)
            .map(|(_, parameter)| parameter.to_string()),
    );

    let mut readings = Vec::new();
    let mut issues = Vec::new();
    for record in records {
        match extract_readings(stream, record, &wanted) {
            Ok(extraction) => {
                readings.extend(extraction.readings);
                issues.extend(extraction.issues);
            }
            Err(issue) => issues.push(issue),
        }
    }

    let mut result = evaluate_group(stream, &readings, thresholds);
    issues.append(&mut result.issues);
    result.issues = issues;
    result
}

/// Sequential union of group results
#[derive(Debug, Clone, Default)]
pub struct ScoreBook {
    scores: BTreeMap<(ParameterKey, NaiveDate), DailyScore>,
    unscoreable: BTreeSet<ParameterKey>,
}

impl ScoreBook {
    pub fn reduce(groups: impl IntoIterator<Item = GroupScore>) -> (Self, Vec<EngineIssue>) {
        let mut book = Self::default();
        let mut issues = Vec::new();

        for group in groups {
            for score in group.scores {
                book.scores
                    .entry((score.key.clone(), score.date))
                    .and_modify(|existing| {
                        existing.pass_count += score.pass_count;
                        existing.total_count += score.total_count;
                    })
                    .or_insert(score);
            }
            book.unscoreable.extend(group.unscoreable);
            issues.extend(group.issues);
        }

        (book, issues)
    }

    pub fn scores(&self) -> impl Iterator<Item = &DailyScore> {
        self.scores.values()
    }

    /// Keys passing on at least one scored day
    pub fn passing_keys(&self) -> BTreeSet<ParameterKey> {
        self.scores
            .values()
            .filter(|s| s.passes())
            .map(|s| s.key.clone())
            .collect()
    }

    /// Keys passing on one day
    pub fn passing_keys_on(&self, date: NaiveDate) -> BTreeSet<ParameterKey> {
        self.scores
            .values()
            .filter(|s| s.date == date && s.passes())
            .map(|s| s.key.clone())
            .collect()
    }

    pub fn unscoreable(&self) -> &BTreeSet<ParameterKey> {
        &self.unscoreable
    }
}
