use crate::domain::scope::ArrayScope;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    pub m2m: M2mSettings,
    pub portal: PortalSettings,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub arrays: Vec<ArrayScope>,
    #[serde(default)]
    pub platforms: Vec<PlatformScope>,
}

/// Engineering streams of one platform group, listed in a local CSV
#[derive(Debug, Deserialize, Clone)]
pub struct PlatformScope {
    pub name: String,
    pub streams_file: PathBuf,
    #[serde(default = "default_engineering_method")]
    pub method: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct M2mSettings {
    pub base_url: String,
    pub username: String,
    pub token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PortalSettings {
    /// Base URL of the per-array CSV export; the array code is appended
    pub catalog_url: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RunConfig {
    pub workers: usize,
    pub lookback_hours: i64,
    pub record_limit: usize,
    pub engineering_record_limit: usize,
    pub stats_record_limit: usize,
    pub output_dir: PathBuf,
    pub subject_template: String,
    pub engineering_subject_template: String,
    pub stats_subject_template: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 20,
            lookback_hours: 24,
            record_limit: 1000,
            engineering_record_limit: 100,
            stats_record_limit: 50,
            output_dir: PathBuf::from("output"),
            subject_template: "Data Quality and Availability Alert for ${array} on ${date}".to_string(),
            engineering_subject_template: "Engineering Streams Alert for ${array} on ${date}".to_string(),
            stats_subject_template: "Stats completed for ${array} on ${date}".to_string(),
        }
    }
}

fn default_engineering_method() -> String {
    "streamed".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    10
}

fn default_backoff_ms() -> u64 {
    300
}

pub fn load_monitor_config() -> anyhow::Result<MonitorConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/monitor"))
        .add_source(config::Environment::with_prefix("QC_MONITOR").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Replace `${name}` placeholders in a template string
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}
