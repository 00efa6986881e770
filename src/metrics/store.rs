//! Append-only CSV metrics table.

use crate::error::{BenchError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Column headers of the metrics table, in order.
pub const METRIC_HEADERS: [&str; 7] = [
    "Tool",
    "Execution Time (seconds)",
    "CPU Usage (percent)",
    "Memory Usage (MB)",
    "llm_tokens",
    "embedding_tokens",
    "pages_calls",
];

/// Marker written for metrics that do not apply to a strategy.
pub const NOT_APPLICABLE: &str = "N/A";

/// One measured strategy invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    #[serde(rename = "Tool")]
    pub tool: String,
    #[serde(rename = "Execution Time (seconds)")]
    pub execution_time_secs: f64,
    #[serde(rename = "CPU Usage (percent)")]
    pub cpu_usage_percent: f64,
    #[serde(rename = "Memory Usage (MB)")]
    pub memory_usage_mb: f64,
    #[serde(serialize_with = "write_optional", deserialize_with = "read_optional")]
    pub llm_tokens: Option<u64>,
    #[serde(serialize_with = "write_optional", deserialize_with = "read_optional")]
    pub embedding_tokens: Option<u64>,
    #[serde(serialize_with = "write_optional", deserialize_with = "read_optional")]
    pub pages_calls: Option<u64>,
}

fn write_optional<S: Serializer>(value: &Option<u64>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_u64(*v),
        None => serializer.serialize_str(NOT_APPLICABLE),
    }
}

fn read_optional<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<u64>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    let raw = raw.trim();
    if raw.is_empty() || raw == NOT_APPLICABLE {
        return Ok(None);
    }
    raw.parse().map(Some).map_err(serde::de::Error::custom)
}

/// CSV file holding one [`MetricRecord`] per row.
#[derive(Debug, Clone)]
pub struct MetricsStore {
    path: PathBuf,
    retry: RetryPolicy,
}

impl MetricsStore {
    pub fn new(path: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            path: path.into(),
            retry,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate the table to just its header row.
    pub fn reset(&self) -> Result<()> {
        self.ensure_parent()?;
        self.retry.run_blocking("reset metrics table", |_| {
            let mut writer = csv::Writer::from_path(&self.path)
                .map_err(|e| BenchError::persistence(&self.path, e))?;
            writer
                .write_record(METRIC_HEADERS)
                .map_err(|e| BenchError::persistence(&self.path, e))?;
            writer.flush().map_err(|e| BenchError::persistence(&self.path, e))
        })
    }

    /// Append one record, writing the header first if the table is new.
    pub fn append(&self, record: &MetricRecord) -> Result<()> {
        self.ensure_parent()?;
        self.retry.run_blocking("append metric record", |_| {
            let is_new = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| BenchError::persistence(&self.path, e))?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(is_new)
                .from_writer(file);
            writer
                .serialize(record)
                .map_err(|e| BenchError::persistence(&self.path, e))?;
            writer.flush().map_err(|e| BenchError::persistence(&self.path, e))
        })
    }

    /// Read every record back.
    pub fn read_all(&self) -> Result<Vec<MetricRecord>> {
        let mut reader = csv::Reader::from_path(&self.path)
            .map_err(|e| BenchError::persistence(&self.path, e))?;
        reader
            .deserialize()
            .collect::<std::result::Result<Vec<MetricRecord>, _>>()
            .map_err(|e| BenchError::Serialization(e.to_string()))
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| BenchError::io(parent, e))?;
            }
        }
        Ok(())
    }
}
