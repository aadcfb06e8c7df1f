// Coverage catalog - parses the portal's per-array CSV export and the
// local engineering stream lists
use crate::domain::coverage::{ParameterKey, StreamKey};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CatalogRow {
    reference_designator: String,
    method: String,
    stream_name: String,
    parameter_name: String,
}

/// Parse the export; columns other than the four key columns are ignored
pub fn parse_catalog(body: &str) -> Result<Vec<ParameterKey>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let mut entries = Vec::new();
    for (line, row) in reader.deserialize::<CatalogRow>().enumerate() {
        let row = row.with_context(|| format!("Failed to parse catalog row {}", line + 1))?;
        entries.push(ParameterKey::new(
            row.reference_designator,
            row.method,
            row.stream_name,
            row.parameter_name,
        ));
    }

    Ok(entries)
}

#[derive(Debug, Deserialize)]
struct EngineeringRow {
    refdes: String,
    stream: String,
}

/// Parse a `refdes,stream` list; every stream gets the same delivery method
pub fn parse_engineering_streams(body: &str, method: &str) -> Result<Vec<StreamKey>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let mut streams = Vec::new();
    for (line, row) in reader.deserialize::<EngineeringRow>().enumerate() {
        let row = row.with_context(|| format!("Failed to parse engineering stream row {}", line + 1))?;
        streams.push(StreamKey::new(row.refdes, method, row.stream));
    }

    Ok(streams)
}

pub async fn load_engineering_streams(path: &Path, method: &str) -> Result<Vec<StreamKey>> {
    let body = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read engineering stream list {:?}", path))?;
    parse_engineering_streams(&body, method)
}
