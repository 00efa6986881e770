//! Performance metrics for extraction strategies.
//!
//! - `recorder`: samples time, CPU and resident memory around a unit of work
//! - `store`: append-only CSV table with one row per measured invocation

pub mod recorder;
pub mod store;

pub use recorder::{ExtraMetrics, MetricsRecorder, ResourceProbe, ResourceSample};
pub use store::{METRIC_HEADERS, MetricRecord, MetricsStore, NOT_APPLICABLE};
