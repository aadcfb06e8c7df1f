// M2M repository implementation
use crate::application::monitoring_source::{MonitoringSource, StreamRequest};
use crate::domain::annotation::Annotation;
use crate::domain::coverage::{ParameterKey, Refdes, StreamKey};
use crate::domain::deployment::Deployment;
use crate::domain::error::EngineIssue;
use crate::domain::reading::RawRecord;
use crate::domain::threshold::{Bound, ThresholdTable, ThresholdTableBuilder};
use crate::infrastructure::config::{M2mSettings, PortalSettings};
use crate::infrastructure::coverage_catalog::parse_catalog;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

const QC_PARAMETERS_PATH: &str = "12578/qcparameters/";
const ANNOTATIONS_PATH: &str = "12580/anno/find";
const DEPLOYMENTS_PATH: &str = "12587/events/deployment/inv";
const SENSOR_PATH: &str = "12576/sensor/inv";

const GLOBAL_RANGE_QC_ID: &str = "dataqc_globalrangetest_minmax";
// 2012-01-01T01:00:01Z, before the first deployment
const ANNOTATIONS_BEGIN_MS: i64 = 1_325_379_601_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QcParameter {
    #[serde(rename = "qcParameterPK")]
    pk: QcParameterPk,
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QcParameterPk {
    qc_id: String,
    parameter: String,
    stream_parameter: String,
    ref_des: RefDesParts,
}

#[derive(Debug, Deserialize)]
struct RefDesParts {
    subsite: String,
    node: String,
    sensor: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentEvent {
    #[serde(default)]
    reference_designator: Option<String>,
    #[serde(default)]
    deployment_number: u32,
    #[serde(default)]
    event_start_time: Option<i64>,
    #[serde(default)]
    event_stop_time: Option<i64>,
}

impl DeploymentEvent {
    /// `None` for events without a usable start time
    fn into_deployment(self, refdes: &str) -> Option<Deployment> {
        let start = DateTime::from_timestamp_millis(self.event_start_time?)?;
        Some(Deployment {
            refdes: self.reference_designator.unwrap_or_else(|| refdes.to_string()),
            number: self.deployment_number,
            start,
            // an unrepresentable stop time still ends the deployment
            end: self
                .event_stop_time
                .map(|ms| DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MAX_UTC)),
        })
    }
}

#[derive(Debug, Deserialize)]
struct M2mAnnotation {
    subsite: String,
    #[serde(default)]
    node: Option<String>,
    #[serde(default)]
    sensor: Option<String>,
    #[serde(rename = "qcFlag", default)]
    qc_flag: Option<String>,
    #[serde(rename = "endDT", default)]
    end_dt: Option<i64>,
}

impl From<M2mAnnotation> for Annotation {
    fn from(raw: M2mAnnotation) -> Self {
        Annotation {
            subsite: raw.subsite,
            platform: raw.node.filter(|s| !s.is_empty()),
            sensor: raw.sensor.filter(|s| !s.is_empty()),
            flag: raw.qc_flag.unwrap_or_default(),
            // an unrepresentable end time still closes the annotation
            end_time: raw
                .end_dt
                .map(|ms| DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MAX_UTC)),
        }
    }
}

fn qc_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Merge `dat_min`/`dat_max` rows of the global range test into one table
fn thresholds_from_qc(rows: Vec<QcParameter>) -> (ThresholdTable, Vec<EngineIssue>) {
    let mut builder = ThresholdTableBuilder::new();
    for row in rows {
        if row.pk.qc_id != GLOBAL_RANGE_QC_ID {
            continue;
        }
        let bound = match row.pk.parameter.as_str() {
            "dat_min" => Bound::Min,
            "dat_max" => Bound::Max,
            _ => continue,
        };
        let refdes = format!(
            "{}-{}-{}",
            row.pk.ref_des.subsite, row.pk.ref_des.node, row.pk.ref_des.sensor
        );
        match qc_value(&row.value) {
            Some(value) => {
                builder.bound(&refdes, &row.pk.stream_parameter, bound, value);
            }
            None => tracing::warn!(
                "Ignoring non-numeric {:?} for {} {}: {}",
                bound,
                refdes,
                row.pk.stream_parameter,
                row.value
            ),
        }
    }
    builder.build()
}

fn deployments_from_events(events: Vec<DeploymentEvent>, refdes: &str) -> Vec<Deployment> {
    let total = events.len();
    let deployments: Vec<Deployment> = events
        .into_iter()
        .filter_map(|e| e.into_deployment(refdes))
        .collect();
    if deployments.len() < total {
        tracing::debug!("Skipped {} deployment events of {} without a start", total - deployments.len(), refdes);
    }
    deployments
}

fn m2m_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S.000Z").to_string()
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

#[derive(Debug, Clone)]
pub struct M2mRepository {
    client: reqwest::Client,
    base_url: String,
    catalog_url: String,
    username: String,
    token: String,
    max_retries: u32,
    backoff: Duration,
}

impl M2mRepository {
    pub fn new(m2m: &M2mSettings, portal: &PortalSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(m2m.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: m2m.base_url.trim_end_matches('/').to_string(),
            catalog_url: portal.catalog_url.clone(),
            username: m2m.username.clone(),
            token: m2m.token.clone(),
            max_retries: m2m.max_retries,
            backoff: Duration::from_millis(m2m.backoff_ms),
        })
    }

    fn sensor_url(&self, stream: &StreamKey, request: &StreamRequest) -> Result<String> {
        let refdes = Refdes::parse(&stream.refdes)
            .with_context(|| format!("Malformed reference designator {}", stream.refdes))?;
        let mut url = format!(
            "{}/{}/{}/{}/{}/{}/{}?beginDT={}",
            self.base_url,
            SENSOR_PATH,
            refdes.subsite,
            refdes.node,
            refdes.sensor,
            stream.method,
            stream.stream,
            urlencoding::encode(&m2m_time(request.begin))
        );
        if let Some(end) = request.end {
            url.push_str(&format!("&endDT={}", urlencoding::encode(&m2m_time(end))));
        }
        url.push_str(&format!("&limit={}", request.limit));
        Ok(url)
    }

    fn annotations_url(&self, refdes: &str, now: DateTime<Utc>) -> String {
        format!(
            "{}/{}?beginDT={}&endDT={}&refdes={}",
            self.base_url,
            ANNOTATIONS_PATH,
            ANNOTATIONS_BEGIN_MS,
            now.timestamp_millis(),
            urlencoding::encode(refdes)
        )
    }

    /// GET with retries on connect errors, timeouts and 5xx. `None` for 404,
    /// which M2M returns when there is nothing to report.
    async fn get(&self, url: &str, authenticated: bool) -> Result<Option<reqwest::Response>> {
        let mut attempt = 0;
        loop {
            let mut request = self.client.get(url).header("Accept", "application/json");
            if authenticated {
                request = request.basic_auth(&self.username, Some(&self.token));
            }
            let result = request.send().await;

            let retryable = match &result {
                Ok(response) => response.status().is_server_error(),
                Err(e) => e.is_connect() || e.is_timeout(),
            };
            if retryable && attempt < self.max_retries {
                let delay = backoff_delay(self.backoff, attempt);
                tracing::debug!("Retrying {} in {:?} (attempt {})", url, delay, attempt + 1);
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let response = result.with_context(|| format!("Failed to send request to {}", url))?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("Request to {} failed with status {}: {}", url, status, body);
            }
            return Ok(Some(response));
        }
    }

    async fn get_json<T: DeserializeOwned + Default>(&self, url: &str) -> Result<T> {
        match self.get(url, true).await? {
            Some(response) => response
                .json::<T>()
                .await
                .with_context(|| format!("Failed to parse response from {}", url)),
            None => Ok(T::default()),
        }
    }
}

#[async_trait]
impl MonitoringSource for M2mRepository {
    async fn fetch_catalog(&self, code: &str) -> Result<Vec<ParameterKey>> {
        let url = format!("{}{}", self.catalog_url, urlencoding::encode(code));
        let response = self
            .get(&url, false)
            .await?
            .with_context(|| format!("No coverage catalog at {}", url))?;
        let body = response
            .text()
            .await
            .context("Failed to read coverage catalog")?;
        parse_catalog(&body)
    }

    async fn fetch_thresholds(&self) -> Result<(ThresholdTable, Vec<EngineIssue>)> {
        let url = format!("{}/{}", self.base_url, QC_PARAMETERS_PATH);
        let rows: Vec<QcParameter> = self.get_json(&url).await?;
        Ok(thresholds_from_qc(rows))
    }

    async fn fetch_deployments(&self, refdes: &str) -> Result<Vec<Deployment>> {
        let parts = Refdes::parse(refdes)
            .with_context(|| format!("Malformed reference designator {}", refdes))?;
        let url = format!(
            "{}/{}/{}/{}/{}/-1",
            self.base_url, DEPLOYMENTS_PATH, parts.subsite, parts.node, parts.sensor
        );
        let events: Vec<DeploymentEvent> = self.get_json(&url).await?;
        Ok(deployments_from_events(events, refdes))
    }

    async fn fetch_annotations(&self, refdes: &str) -> Result<Vec<Annotation>> {
        let url = self.annotations_url(refdes, Utc::now());
        let raw: Vec<M2mAnnotation> = self.get_json(&url).await?;
        Ok(raw.into_iter().map(Annotation::from).collect())
    }

    async fn fetch_stream(&self, stream: &StreamKey, request: &StreamRequest) -> Result<Vec<RawRecord>> {
        let url = self.sensor_url(stream, request)?;
        self.get_json(&url).await
    }
}
