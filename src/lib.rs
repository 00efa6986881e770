//! PDF QA Bench - a benchmarking harness for PDF text extraction.
//!
//! Several extraction strategies are run over a folder of PDFs while time,
//! CPU and memory are measured per invocation. The extracted artifacts are
//! then questioned by one or more chat models, and each answer is graded
//! against ground truth by an LLM judge.
//!
//! # Quick Start
//!
//! ```no_run
//! use pdf_qa_bench::{
//!     config::Config,
//!     driver::BatchDriver,
//!     metrics::{MetricsRecorder, MetricsStore},
//!     strategy::StrategyRegistry,
//! };
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let output = Path::new("output_data");
//!
//!     let store = MetricsStore::new(config.paths.metrics_file_for(output), config.retry.clone());
//!     let registry = StrategyRegistry::standard(&config)?;
//!     let mut driver = BatchDriver::new(registry, MetricsRecorder::new(store), config.retry.clone());
//!
//!     let report = driver.run_all(Path::new("input_data"), output).await?;
//!     report.print_summary();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **metrics**: resource sampling around a unit of work and the CSV metrics table
//! - **strategy**: the `ExtractionStrategy` trait, its adapters and the registry
//! - **driver**: runs the registry over every input file
//! - **answer**: fans question sets out over artifacts and models
//! - **judge**: grades answers with a fixed rubric
//! - **results**: answer and score tables

pub mod answer;
pub mod config;
pub mod document;
pub mod driver;
pub mod error;
pub mod judge;
pub mod llm;
pub mod metrics;
pub mod questions;
pub mod results;
pub mod retry;
pub mod search;
pub mod strategy;

// Re-export commonly used types
pub use answer::{AnswerFanout, AnswerRecord, AnswerRun, Transcript};
pub use config::Config;
pub use driver::{BatchDriver, RunReport};
pub use error::{BenchError, Result};
pub use judge::{ScoringClient, Verdict};
pub use llm::{ChatBackend, LlmClient};
pub use metrics::{ExtraMetrics, MetricRecord, MetricsRecorder, MetricsStore};
pub use retry::RetryPolicy;
pub use strategy::{ExtractionStrategy, StrategyDescriptor, StrategyRegistry};
