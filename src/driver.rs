//! Batch driver: every registered strategy over every input document.
//!
//! The driver is sequential. For each document it creates the per-document
//! output folder and runs the registry in registration order, measuring each
//! invocation with the [`MetricsRecorder`]. Failures are retried and then
//! collected in the [`RunReport`]; they never abort the batch.

use crate::document::{SourceDocument, list_input_files};
use crate::error::{BenchError, Result};
use crate::metrics::{MetricRecord, MetricsRecorder};
use crate::retry::RetryPolicy;
use crate::strategy::{StrategyDescriptor, StrategyRegistry};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

/// Extensions of artifacts removed from the output folder before a run.
const ARTIFACT_EXTENSIONS: [&str; 3] = ["txt", "html", "md"];

/// Outcome of one (strategy, document) pair.
#[derive(Debug, Clone)]
pub struct StrategyRun {
    pub strategy: String,
    pub file: String,
    pub attempts: u32,
    /// Present when the strategy succeeded.
    pub record: Option<MetricRecord>,
    /// Last error when every attempt failed.
    pub error: Option<String>,
}

impl StrategyRun {
    pub fn succeeded(&self) -> bool {
        self.record.is_some()
    }
}

/// Everything a batch run did.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub documents: usize,
    pub runs: Vec<StrategyRun>,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = &StrategyRun> {
        self.runs.iter().filter(|r| !r.succeeded())
    }

    pub fn success_count(&self) -> usize {
        self.runs.iter().filter(|r| r.succeeded()).count()
    }

    /// `(successes, failures)` per strategy name.
    pub fn per_strategy(&self) -> BTreeMap<&str, (usize, usize)> {
        let mut counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for run in &self.runs {
            let entry = counts.entry(run.strategy.as_str()).or_default();
            if run.succeeded() {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
        }
        counts
    }

    /// Print summary to stdout.
    pub fn print_summary(&self) {
        println!("\n========== Extraction Run ==========");
        println!("Documents:   {}", self.documents);
        println!("Invocations: {}", self.runs.len());
        println!("Succeeded:   {}", self.success_count());
        println!("------------------------------------");
        for (strategy, (ok, failed)) in self.per_strategy() {
            println!("{:<20} ok: {:>3}  failed: {:>3}", strategy, ok, failed);
        }
        let failures: Vec<_> = self.failures().collect();
        if !failures.is_empty() {
            println!("------------------------------------");
            for run in failures {
                println!(
                    "FAILED {} on {}: {}",
                    run.strategy,
                    run.file,
                    run.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        println!("====================================\n");
    }
}

/// Line source the driver waits on after a failed strategy.
type OperatorInput = Box<dyn AsyncBufRead + Unpin + Send>;

/// Runs the registry over an input folder.
pub struct BatchDriver {
    registry: StrategyRegistry,
    recorder: MetricsRecorder,
    retry: RetryPolicy,
    /// One reader for the whole run so buffered lines carry over between gates.
    operator: Option<OperatorInput>,
}

impl BatchDriver {
    pub fn new(registry: StrategyRegistry, recorder: MetricsRecorder, retry: RetryPolicy) -> Self {
        Self {
            registry,
            recorder,
            retry,
            operator: None,
        }
    }

    /// Wait for the operator on stdin after each failed strategy.
    pub fn with_pause_on_error(mut self, pause: bool) -> Self {
        self.operator = match pause {
            true => Some(Box::new(BufReader::new(tokio::io::stdin()))),
            false => None,
        };
        self
    }

    /// Wait for a line from `input` after each failed strategy.
    pub fn with_operator_input(mut self, input: impl AsyncBufRead + Unpin + Send + 'static) -> Self {
        self.operator = Some(Box::new(input));
        self
    }

    /// Extract every file of `input_dir` with every strategy.
    ///
    /// Prior artifacts in `output_dir` are cleared and the metrics table is
    /// reset first, so each run leaves exactly one row per successful
    /// (strategy, file) pair.
    pub async fn run_all(&mut self, input_dir: &Path, output_dir: &Path) -> Result<RunReport> {
        let documents = list_input_files(input_dir)?;
        fs::create_dir_all(output_dir).map_err(|e| BenchError::io(output_dir, e))?;
        clear_output_dir(output_dir)?;
        self.recorder.store().reset()?;

        info!(
            documents = documents.len(),
            strategies = self.registry.len(),
            input = %input_dir.display(),
            "starting extraction run"
        );

        let mut report = RunReport {
            documents: documents.len(),
            runs: Vec::with_capacity(documents.len() * self.registry.len()),
        };

        let descriptors: Vec<StrategyDescriptor> = self.registry.iter().cloned().collect();
        for document in &documents {
            let document_dir = document.output_dir(output_dir);
            fs::create_dir_all(&document_dir).map_err(|e| BenchError::io(&document_dir, e))?;

            for descriptor in &descriptors {
                let run = self.run_one(descriptor, document, &document_dir).await?;
                let failed = !run.succeeded();
                report.runs.push(run);
                if failed {
                    if let Some(input) = self.operator.as_mut() {
                        wait_for_operator(input).await;
                    }
                }
            }
        }

        info!(
            succeeded = report.success_count(),
            total = report.runs.len(),
            "extraction run finished"
        );
        Ok(report)
    }

    /// Run one strategy on one document with retries.
    ///
    /// Strategy errors end up in the returned [`StrategyRun`]; only metrics
    /// persistence errors are returned as `Err`.
    async fn run_one(
        &mut self,
        descriptor: &StrategyDescriptor,
        document: &SourceDocument,
        document_dir: &Path,
    ) -> Result<StrategyRun> {
        let output = descriptor.output_path(document_dir);
        let attempts = self.retry.attempts();
        let mut last_error = None;

        for attempt in 1..=attempts {
            let work = descriptor.strategy.extract(&document.path, &output);
            match self.recorder.measure(&descriptor.name, work).await {
                Ok(record) => {
                    info!(
                        strategy = %descriptor.name,
                        file = %document.file_name,
                        secs = record.execution_time_secs,
                        "extracted"
                    );
                    return Ok(StrategyRun {
                        strategy: descriptor.name.clone(),
                        file: document.file_name.clone(),
                        attempts: attempt,
                        record: Some(record),
                        error: None,
                    });
                }
                Err(e @ BenchError::Persistence { .. }) => return Err(e),
                Err(e) => {
                    warn!(
                        strategy = %descriptor.name,
                        file = %document.file_name,
                        attempt,
                        attempts,
                        error = %e,
                        "strategy failed"
                    );
                    last_error = Some(e.to_string());
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.backoff(attempt)).await;
                    }
                }
            }
        }

        error!(
            strategy = %descriptor.name,
            file = %document.file_name,
            "giving up after {} attempts",
            attempts
        );
        Ok(StrategyRun {
            strategy: descriptor.name.clone(),
            file: document.file_name.clone(),
            attempts,
            record: None,
            error: last_error,
        })
    }
}

/// Remove `txt`, `html` and `md` files and every subdirectory of `output_dir`.
pub fn clear_output_dir(output_dir: &Path) -> Result<()> {
    let entries = fs::read_dir(output_dir).map_err(|e| BenchError::io(output_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| BenchError::io(output_dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| BenchError::io(&path, e))?;

        if file_type.is_dir() {
            fs::remove_dir_all(&path).map_err(|e| BenchError::io(&path, e))?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ARTIFACT_EXTENSIONS.contains(&ext))
        {
            fs::remove_file(&path).map_err(|e| BenchError::io(&path, e))?;
        }
    }
    Ok(())
}

async fn wait_for_operator(input: &mut OperatorInput) {
    println!("Strategy failed. Press Enter to continue...");
    let mut line = String::new();
    match input.read_line(&mut line).await {
        Ok(0) => warn!("operator input closed, continuing"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "could not read operator input, continuing"),
    }
}
