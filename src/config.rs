use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::pipeline::batch::statistics::GpaSource;

/// Application-level constants
pub const APP_NAME: &str = "Gradlens";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix shared by every environment variable the service reads.
const ENV_PREFIX: &str = "GRADLENS_";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
/// Per-file limit. Transcripts are a few pages; 20 MB leaves room for scans.
const DEFAULT_MAX_FILE_BYTES: usize = 20 * 1024 * 1024;
const DEFAULT_MAX_FILES_PER_BATCH: usize = 500;
const DEFAULT_MAX_REQUEST_BYTES: usize = 512 * 1024 * 1024;
const DEFAULT_BATCH_TIMEOUT_SECS: u64 = 120;
const DEFAULT_HISTOGRAM_BINS: usize = 16;

/// Tracing filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> String {
    "gradlens_lib=info,gradlens=info,tower_http=info".to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Runtime configuration of the HTTP service and batch engine.
///
/// Every field can be overridden through a `GRADLENS_*` environment variable;
/// unset variables fall back to the defaults below.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceConfig {
    /// `GRADLENS_BIND_ADDR`
    pub bind_addr: SocketAddr,
    /// `GRADLENS_MAX_FILE_BYTES`: largest single upload accepted.
    pub max_file_bytes: usize,
    /// `GRADLENS_MAX_FILES`: most documents in one batch request.
    pub max_files_per_batch: usize,
    /// `GRADLENS_MAX_REQUEST_BYTES`: whole multipart body of one request.
    pub max_request_bytes: usize,
    /// `GRADLENS_WORKERS`: concurrent per-document pipelines.
    pub worker_count: usize,
    /// `GRADLENS_BATCH_TIMEOUT_SECS`: overall deadline of one batch request.
    #[serde(serialize_with = "serialize_secs")]
    pub batch_timeout: Duration,
    /// `GRADLENS_HISTOGRAM_BINS`
    pub histogram_bins: usize,
    /// `GRADLENS_GPA_SOURCE`: default GPA series for collective mode.
    pub gpa_source: GpaSource,
    /// `GRADLENS_POLICY_PATH`: JSON policy file. Built-in policy when unset.
    pub policy_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 5000))),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_files_per_batch: DEFAULT_MAX_FILES_PER_BATCH,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            worker_count: default_worker_count(),
            batch_timeout: Duration::from_secs(DEFAULT_BATCH_TIMEOUT_SECS),
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            gpa_source: GpaSource::LatestYearAverage,
            policy_path: None,
        }
    }
}

impl ServiceConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Keys are the full variable names (`GRADLENS_WORKERS`, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| (key, v))
        };

        let mut config = Self::default();

        if let Some((key, value)) = get("BIND_ADDR") {
            config.bind_addr = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = get("MAX_FILE_BYTES") {
            config.max_file_bytes = parse_positive(&key, &value)?;
        }
        if let Some((key, value)) = get("MAX_FILES") {
            config.max_files_per_batch = parse_positive(&key, &value)?;
        }
        if let Some((key, value)) = get("MAX_REQUEST_BYTES") {
            config.max_request_bytes = parse_positive(&key, &value)?;
        }
        if let Some((key, value)) = get("WORKERS") {
            config.worker_count = parse_positive(&key, &value)?;
        }
        if let Some((key, value)) = get("BATCH_TIMEOUT_SECS") {
            let secs: usize = parse_positive(&key, &value)?;
            config.batch_timeout = Duration::from_secs(secs as u64);
        }
        if let Some((key, value)) = get("HISTOGRAM_BINS") {
            config.histogram_bins = parse_positive(&key, &value)?;
        }
        if let Some((key, value)) = get("GPA_SOURCE") {
            config.gpa_source = value.parse().map_err(|_| ConfigError::InvalidValue {
                key,
                value: value.clone(),
                reason: "expected latest_year_average, term_gpas or course_grade_points".into(),
            })?;
        }
        if let Some((_, value)) = get("POLICY_PATH") {
            config.policy_path = Some(PathBuf::from(value));
        }

        Ok(config)
    }
}

/// One worker per available core; PDF decoding is CPU-bound.
fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_positive(key: &str, value: &str) -> Result<usize, ConfigError> {
    let parsed: usize = parse_value(key, value)?;
    if parsed == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(parsed)
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}
