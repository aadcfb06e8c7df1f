// Report writer - stores rendered alerts under the output directory
use crate::application::alert::AlertReport;
use crate::presentation::html::render_report;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub fn report_path(output_dir: &Path, report: &AlertReport) -> PathBuf {
    output_dir.join(&report.array).join(format!(
        "{}_{}_{}.html",
        report.array,
        report.kind.tag(),
        report.date.format("%Y-%m-%d")
    ))
}

pub async fn write_report(output_dir: &Path, report: &AlertReport) -> Result<PathBuf> {
    let path = report_path(output_dir, report);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }

    tokio::fs::write(&path, render_report(report))
        .await
        .with_context(|| format!("Failed to write alert report {:?}", path))?;

    Ok(path)
}
