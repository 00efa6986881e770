//! Time, CPU and memory measurement around one unit of work.

use super::store::{MetricRecord, MetricsStore};
use crate::error::Result;
use std::future::Future;
use std::time::Instant;
use sysinfo::{Pid, System};
use tracing::debug;

/// Optional metrics a unit of work can report about itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtraMetrics {
    pub llm_tokens: Option<u64>,
    pub embedding_tokens: Option<u64>,
    pub pages_calls: Option<u64>,
}

impl ExtraMetrics {
    /// No extra metrics; every column is recorded as not applicable.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_pages(pages: u64) -> Self {
        Self {
            pages_calls: Some(pages),
            ..Default::default()
        }
    }

    pub fn with_llm_tokens(tokens: u64) -> Self {
        Self {
            llm_tokens: Some(tokens),
            ..Default::default()
        }
    }
}

/// One reading of the process resources.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSample {
    pub at: Instant,
    /// Global CPU usage since the previous refresh.
    pub cpu_percent: f32,
    /// Resident set size of this process in MB.
    pub rss_mb: f64,
}

/// Reads CPU usage and resident memory of the current process.
pub struct ResourceProbe {
    system: System,
    pid: Option<Pid>,
}

impl Default for ResourceProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between refreshes; prime the first one.
        system.refresh_cpu();
        Self {
            system,
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    pub fn sample(&mut self) -> ResourceSample {
        self.system.refresh_cpu();
        let cpu_percent = self.system.global_cpu_info().cpu_usage();

        let rss_mb = match self.pid {
            Some(pid) if self.system.refresh_process(pid) => self
                .system
                .process(pid)
                .map(|p| p.memory() as f64 / (1024.0 * 1024.0))
                .unwrap_or(0.0),
            _ => 0.0,
        };

        ResourceSample {
            at: Instant::now(),
            cpu_percent,
            rss_mb,
        }
    }
}

/// Build the record for a finished unit of work.
pub fn metric_record(
    label: &str,
    start: &ResourceSample,
    end: &ResourceSample,
    extra: ExtraMetrics,
) -> MetricRecord {
    MetricRecord {
        tool: label.to_string(),
        execution_time_secs: end.at.duration_since(start.at).as_secs_f64(),
        cpu_usage_percent: (end.cpu_percent - start.cpu_percent) as f64,
        memory_usage_mb: end.rss_mb - start.rss_mb,
        llm_tokens: extra.llm_tokens,
        embedding_tokens: extra.embedding_tokens,
        pages_calls: extra.pages_calls,
    }
}

/// Wraps work with resource sampling and persists one row per call.
pub struct MetricsRecorder {
    store: MetricsStore,
    probe: ResourceProbe,
}

impl MetricsRecorder {
    pub fn new(store: MetricsStore) -> Self {
        Self {
            store,
            probe: ResourceProbe::new(),
        }
    }

    pub fn store(&self) -> &MetricsStore {
        &self.store
    }

    /// Run `work`, sample resources around it and append the record labelled `label`.
    ///
    /// Work that fails is not recorded and its error is returned unchanged.
    /// A record that cannot be persisted is an error as well.
    pub async fn measure<Fut>(&mut self, label: &str, work: Fut) -> Result<MetricRecord>
    where
        Fut: Future<Output = Result<ExtraMetrics>>,
    {
        let start = self.probe.sample();
        let extra = work.await?;
        let end = self.probe.sample();

        let record = metric_record(label, &start, &end, extra);
        debug!(
            tool = %record.tool,
            secs = record.execution_time_secs,
            cpu = record.cpu_usage_percent,
            mem_mb = record.memory_usage_mb,
            "measured"
        );
        self.store.append(&record)?;
        Ok(record)
    }
}
