// Stats writer - one CSV per level with a 1/0 availability value per day
use crate::application::rollup::LevelRollup;
use crate::application::stats_service::StatsRun;
use crate::domain::coverage::MethodType;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct ParameterRow<'a> {
    refdes: &'a str,
    method: &'a str,
    stream: &'a str,
    parameter: &'a str,
    date: NaiveDate,
    value: u8,
}

#[derive(Debug, Serialize)]
struct StreamRow<'a> {
    refdes: &'a str,
    method: &'a str,
    stream: &'a str,
    date: NaiveDate,
    value: u8,
}

#[derive(Debug, Serialize)]
struct MethodRow<'a> {
    refdes: &'a str,
    method_type: MethodType,
    date: NaiveDate,
    value: u8,
}

#[derive(Debug, Serialize)]
struct InstrumentRow<'a> {
    refdes: &'a str,
    date: NaiveDate,
    value: u8,
}

fn availability<K: Ord>(rollup: &LevelRollup<K>, key: &K) -> u8 {
    u8::from(!rollup.absent.contains(key))
}

fn to_csv<S: Serialize>(rows: impl IntoIterator<Item = S>) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row).context("Failed to encode stats row")?;
    }
    writer.into_inner().context("Failed to flush stats rows")
}

pub fn stats_path(output_dir: &Path, array: &str, level: &str) -> PathBuf {
    output_dir
        .join(array)
        .join("stats")
        .join(format!("{}_{}_final.csv", array, level))
}

/// Encode the four level tables; days are in run order, keys sorted
fn encode(run: &StatsRun) -> Result<Vec<(&'static str, Vec<u8>)>> {
    let parameters = run.days.iter().flat_map(|d| {
        let level = &d.rollup.parameter;
        level.expected.iter().map(move |k| ParameterRow {
            refdes: &k.refdes,
            method: &k.method,
            stream: &k.stream,
            parameter: &k.parameter,
            date: d.day,
            value: availability(level, k),
        })
    });
    let streams = run.days.iter().flat_map(|d| {
        let level = &d.rollup.stream;
        level.expected.iter().map(move |k| StreamRow {
            refdes: &k.refdes,
            method: &k.method,
            stream: &k.stream,
            date: d.day,
            value: availability(level, k),
        })
    });
    let methods = run.days.iter().flat_map(|d| {
        let level = &d.rollup.method;
        level.expected.iter().map(move |k| MethodRow {
            refdes: &k.refdes,
            method_type: k.method_type,
            date: d.day,
            value: availability(level, k),
        })
    });
    let instruments = run.days.iter().flat_map(|d| {
        let level = &d.rollup.instrument;
        level.expected.iter().map(move |k| InstrumentRow {
            refdes: &k.refdes,
            date: d.day,
            value: availability(level, k),
        })
    });

    Ok(vec![
        ("param", to_csv(parameters)?),
        ("stream", to_csv(streams)?),
        ("method", to_csv(methods)?),
        ("refdes", to_csv(instruments)?),
    ])
}

/// Write `<array>_<level>_final.csv` for every level and return the paths
pub async fn write_stats(output_dir: &Path, run: &StatsRun) -> Result<Vec<PathBuf>> {
    let dir = output_dir.join(&run.array).join("stats");
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create {:?}", dir))?;

    let mut written = Vec::new();
    for (level, body) in encode(run)? {
        let path = stats_path(output_dir, &run.array, level);
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write stats table {:?}", path))?;
        tracing::debug!("{}: {} stats written to {:?}", run.array, level, path);
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::qc_gaps::QcGaps;
    use crate::application::rollup::build_rollup;
    use crate::application::stats_service::DayRollup;
    use crate::domain::coverage::{ExpectedCoverage, StreamKey};
    use crate::domain::error::IssueReport;
    use crate::domain::threshold::ThresholdTableBuilder;
    use std::collections::BTreeSet;

    const CTD: &str = "CE01ISSM-MFD35-01-CTDBPC000";

    fn run() -> StatsRun {
        let ctd = StreamKey::new(CTD, "telemetered", "ctdbp_dcl");
        let coverage = ExpectedCoverage::new(vec![ctd.parameter("temp"), ctd.parameter("salinity")]).unwrap();
        let mut builder = ThresholdTableBuilder::new();
        builder.range(CTD, "temp", 0.0, 30.0).range(CTD, "salinity", 0.0, 42.0);
        let (thresholds, _) = builder.build();

        let day = |d: u32, passing: BTreeSet<_>| DayRollup {
            day: NaiveDate::from_ymd_opt(2024, 3, d).unwrap(),
            rollup: build_rollup(&coverage, &thresholds, &passing),
        };
        StatsRun {
            array: "CE".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            days: vec![
                day(1, BTreeSet::from([ctd.parameter("temp")])),
                day(2, BTreeSet::new()),
            ],
            qc_gaps: QcGaps::default(),
            issues: IssueReport::default(),
        }
    }

    #[test]
    fn test_stats_path() {
        assert_eq!(
            stats_path(Path::new("output"), "CE", "param"),
            PathBuf::from("output/CE/stats/CE_param_final.csv")
        );
    }

    #[tokio::test]
    async fn test_write_stats_tables() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_stats(dir.path(), &run()).await.unwrap();
        assert_eq!(paths.len(), 4);

        let params = std::fs::read_to_string(stats_path(dir.path(), "CE", "param")).unwrap();
        let lines: Vec<&str> = params.lines().collect();
        assert_eq!(lines[0], "refdes,method,stream,parameter,date,value");
        assert_eq!(lines.len(), 5);
        assert!(lines.contains(&"CE01ISSM-MFD35-01-CTDBPC000,telemetered,ctdbp_dcl,temp,2024-03-01,1"));
        assert!(lines.contains(&"CE01ISSM-MFD35-01-CTDBPC000,telemetered,ctdbp_dcl,salinity,2024-03-01,0"));

        let methods = std::fs::read_to_string(stats_path(dir.path(), "CE", "method")).unwrap();
        assert!(methods.contains("CE01ISSM-MFD35-01-CTDBPC000,telemetered,2024-03-01,1"));

        let refdes = std::fs::read_to_string(stats_path(dir.path(), "CE", "refdes")).unwrap();
        assert_eq!(
            refdes,
            "refdes,date,value\nCE01ISSM-MFD35-01-CTDBPC000,2024-03-01,1\nCE01ISSM-MFD35-01-CTDBPC000,2024-03-02,0\n"
        );
    }
}
