// Alert composer - maps one run to an ordered, render-ready report
use crate::application::monitor_service::ArrayRun;
use crate::application::platform_service::PlatformRun;
use crate::application::qc_gaps::{InstrumentParameter, QcGaps};
use crate::application::stats_service::StatsRun;
use crate::domain::coverage::{EngineeringStreamKey, ParameterKey, StreamKey};
use crate::domain::error::IssueReport;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Shown when no engineering stream returned anything
pub const NO_ENGINEERING_DATA: &str = "No platform engineering data return. OMS Extractor possibly down.";

/// Which run produced the report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    DataAlert,
    EngineeringAlert,
    StatsSummary,
}

impl ReportKind {
    /// Tag used in the report file name
    pub fn tag(&self) -> &'static str {
        match self {
            Self::DataAlert => "alert",
            Self::EngineeringAlert => "engineering_alert",
            Self::StatsSummary => "stats",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Headline {
    NewAlert,
    OngoingIssues,
    StatsCompleted,
}

impl Headline {
    pub fn title(&self) -> &'static str {
        match self {
            Self::NewAlert => "New Alert",
            Self::OngoingIssues => "Ongoing Issues",
            Self::StatsCompleted => "Stats Run Completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Alarm,
    Recovery,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionGroup {
    /// What changed since the prior run
    Changes,
    /// Everything currently wrong, new or not
    Summary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub tone: Tone,
    pub group: SectionGroup,
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertReport {
    pub kind: ReportKind,
    pub array: String,
    pub date: NaiveDate,
    pub subject: String,
    pub headline: Headline,
    /// Free-text warning shown above every section
    pub notice: Option<String>,
    pub sections: Vec<Section>,
}

const STREAM_COLUMNS: [&str; 3] = ["Reference Designator", "Method", "Stream"];
const PARAMETER_COLUMNS: [&str; 5] = [
    "Reference Designator",
    "Method",
    "Stream",
    "Parameter",
    "Percent In Range",
];

fn stream_row(key: &StreamKey) -> Vec<String> {
    vec![key.refdes.clone(), key.method.clone(), key.stream.clone()]
}

fn parameter_row(key: &ParameterKey, percents: &BTreeMap<&ParameterKey, f64>) -> Vec<String> {
    let percent = match percents.get(key) {
        Some(p) => format!("{:.0}", p),
        None => "no data".to_string(),
    };
    vec![
        key.refdes.clone(),
        key.method.clone(),
        key.stream.clone(),
        key.parameter.clone(),
        percent,
    ]
}

/// Best daily percentage per scored key
fn best_percents(run: &ArrayRun) -> BTreeMap<&ParameterKey, f64> {
    let mut best: BTreeMap<&ParameterKey, f64> = BTreeMap::new();
    for score in run.scores.scores() {
        let percent = score.percent();
        best.entry(&score.key)
            .and_modify(|p| *p = p.max(percent))
            .or_insert(percent);
    }
    best
}

fn instrument_parameter_row(key: &InstrumentParameter) -> Vec<String> {
    vec![key.refdes.clone(), key.parameter.clone()]
}

fn engineering_row(key: &EngineeringStreamKey) -> Vec<String> {
    stream_row(&key.0)
}

fn headline_for(changed: bool) -> Headline {
    if changed {
        Headline::NewAlert
    } else {
        Headline::OngoingIssues
    }
}

struct SectionBuilder {
    sections: Vec<Section>,
}

impl SectionBuilder {
    fn push(&mut self, title: &str, tone: Tone, group: SectionGroup, columns: &[&'static str], rows: Vec<Vec<String>>) {
        if rows.is_empty() {
            return;
        }
        self.sections.push(Section {
            title: title.to_string(),
            tone,
            group,
            columns: columns.to_vec(),
            rows,
        });
    }

    fn push_qc_gaps(&mut self, gaps: &QcGaps) {
        self.push(
            "Parameter instances missing global range QC values",
            Tone::Info,
            SectionGroup::Summary,
            &["Reference Designator", "Parameter"],
            gaps.missing_qc_definitions.iter().map(instrument_parameter_row).collect(),
        );
        self.push(
            "Parameter instances with QC values but not in the coverage catalog",
            Tone::Info,
            SectionGroup::Summary,
            &["Reference Designator", "Parameter"],
            gaps.missing_classification.iter().map(instrument_parameter_row).collect(),
        );
    }

    fn push_issues(&mut self, issues: &IssueReport) {
        let counts: BTreeMap<String, usize> = issues
            .counts()
            .into_iter()
            .map(|(kind, count)| (kind.to_string(), count))
            .collect();
        self.push(
            "Monitoring run issues",
            Tone::Info,
            SectionGroup::Summary,
            &["Issue", "Count"],
            counts
                .into_iter()
                .map(|(kind, count)| vec![kind, count.to_string()])
                .collect(),
        );
    }
}

impl AlertReport {
    pub fn compose(run: &ArrayRun, subject: impl Into<String>) -> Self {
        let diffs = &run.diffs;
        let absent_streams = &run.rollup.stream.absent;
        let percents = best_percents(run);

        // parameter rows under a stream that is absent today are already
        // covered by the stream rows
        let own_rows = |keys: &BTreeSet<ParameterKey>| -> Vec<Vec<String>> {
            keys.iter()
                .filter(|k| !absent_streams.contains(&k.stream_key()))
                .map(|k| parameter_row(k, &percents))
                .collect()
        };
        let under_resumed_stream = |k: &&ParameterKey| diffs.stream.resumed.contains(&k.stream_key());

        // a parameter that stayed absent while its stream came back was
        // hidden behind the stream row yesterday, so it is news today
        let new_parameters: BTreeSet<ParameterKey> = diffs
            .parameter
            .new
            .iter()
            .chain(diffs.parameter.ongoing.iter().filter(under_resumed_stream))
            .cloned()
            .collect();
        // the stream row already announces their recovery
        let resumed_parameters: BTreeSet<ParameterKey> = diffs
            .parameter
            .resumed
            .iter()
            .filter(|k| !under_resumed_stream(k))
            .cloned()
            .collect();
        let new_parameters = own_rows(&new_parameters);
        let resumed_parameters = own_rows(&resumed_parameters);

        let headline = headline_for(
            !diffs.stream.new.is_empty()
                || !diffs.stream.resumed.is_empty()
                || !new_parameters.is_empty()
                || !resumed_parameters.is_empty()
                || !run.instruments.contradicted.is_empty(),
        );

        let mut builder = SectionBuilder { sections: Vec::new() };

        builder.push(
            "Instruments and streams that have not produced data in the past 24 hours",
            Tone::Alarm,
            SectionGroup::Changes,
            &STREAM_COLUMNS,
            diffs.stream.new.iter().map(stream_row).collect(),
        );
        builder.push(
            "Instruments that are annotated as not_operational, but have resumed producing data",
            Tone::Alarm,
            SectionGroup::Changes,
            &["Reference Designator", "Annotation"],
            run.instruments
                .contradicted
                .iter()
                .map(|(k, scope)| vec![k.refdes.clone(), scope.clone()])
                .collect(),
        );
        builder.push(
            "Parameters not producing data within global ranges in the past 24 hours",
            Tone::Alarm,
            SectionGroup::Changes,
            &PARAMETER_COLUMNS,
            new_parameters,
        );
        builder.push(
            "Instruments and streams that resumed producing data in the past 24 hours",
            Tone::Recovery,
            SectionGroup::Changes,
            &STREAM_COLUMNS,
            diffs.stream.resumed.iter().map(stream_row).collect(),
        );
        builder.push(
            "Parameters that resumed producing data within global ranges in the past 24 hours",
            Tone::Recovery,
            SectionGroup::Changes,
            &PARAMETER_COLUMNS,
            resumed_parameters,
        );

        builder.push(
            "Instruments and streams not producing data",
            Tone::Info,
            SectionGroup::Summary,
            &STREAM_COLUMNS,
            run.streams.unexplained.iter().map(stream_row).collect(),
        );
        builder.push(
            "Instruments and streams not producing data and annotated as not_operational",
            Tone::Info,
            SectionGroup::Summary,
            &["Reference Designator", "Method", "Stream", "Annotation"],
            run.streams
                .explained
                .iter()
                .map(|(k, scope)| {
                    let mut row = stream_row(k);
                    row.push(scope.clone());
                    row
                })
                .collect(),
        );
        builder.push(
            "Parameters not producing data within global ranges",
            Tone::Info,
            SectionGroup::Summary,
            &PARAMETER_COLUMNS,
            own_rows(&run.rollup.parameter.absent),
        );
        builder.push_qc_gaps(&run.qc_gaps);
        builder.push_issues(&run.issues);

        Self {
            kind: ReportKind::DataAlert,
            array: run.array.clone(),
            date: run.date,
            subject: subject.into(),
            headline,
            notice: None,
            sections: builder.sections,
        }
    }

    pub fn compose_platform(run: &PlatformRun, subject: impl Into<String>) -> Self {
        let diff = &run.diff;
        let headline = headline_for(diff.has_changes());
        let mut builder = SectionBuilder { sections: Vec::new() };

        builder.push(
            "Engineering streams that have not produced data in the past 24 hours",
            Tone::Alarm,
            SectionGroup::Changes,
            &STREAM_COLUMNS,
            diff.new.iter().map(engineering_row).collect(),
        );
        builder.push(
            "Engineering streams that resumed producing data in the past 24 hours",
            Tone::Recovery,
            SectionGroup::Changes,
            &STREAM_COLUMNS,
            diff.resumed.iter().map(engineering_row).collect(),
        );
        builder.push(
            "Engineering streams not producing data for over 24 hours",
            Tone::Info,
            SectionGroup::Summary,
            &STREAM_COLUMNS,
            run.streams.unexplained.iter().map(engineering_row).collect(),
        );
        builder.push(
            "Engineering streams not producing data and annotated as not_operational",
            Tone::Info,
            SectionGroup::Summary,
            &["Reference Designator", "Method", "Stream", "Annotation"],
            run.streams
                .explained
                .iter()
                .map(|(k, scope)| {
                    let mut row = engineering_row(k);
                    row.push(scope.clone());
                    row
                })
                .collect(),
        );
        builder.push_issues(&run.issues);

        Self {
            kind: ReportKind::EngineeringAlert,
            array: run.name.clone(),
            date: run.date,
            subject: subject.into(),
            headline,
            notice: run.no_data().then(|| NO_ENGINEERING_DATA.to_string()),
            sections: builder.sections,
        }
    }

    pub fn compose_stats(run: &StatsRun, subject: impl Into<String>) -> Self {
        let mut builder = SectionBuilder { sections: Vec::new() };

        let span = match (run.days.first(), run.days.last()) {
            (Some(first), Some(last)) => vec![vec![
                first.day.format("%Y-%m-%d").to_string(),
                last.day.format("%Y-%m-%d").to_string(),
                run.days.len().to_string(),
            ]],
            _ => vec![],
        };
        builder.push(
            "Deployed days scored",
            Tone::Info,
            SectionGroup::Summary,
            &["First Day", "Last Day", "Days"],
            span,
        );
        builder.push_qc_gaps(&run.qc_gaps);
        builder.push_issues(&run.issues);

        Self {
            kind: ReportKind::StatsSummary,
            array: run.array.clone(),
            date: run.date,
            subject: subject.into(),
            headline: Headline::StatsCompleted,
            notice: None,
            sections: builder.sections,
        }
    }

    pub fn sections_in(&self, group: SectionGroup) -> impl Iterator<Item = &Section> {
        self.sections.iter().filter(move |s| s.group == group)
    }
}
