//! Checkpointed benchmark runner.
//!
//! Walks eligible models × dataset items strictly sequentially. Every scored
//! item is appended to the progress ledger before the next request is sent,
//! so a killed run resumes at the first item that was not yet logged.

use crate::config::RunConfig;
use crate::dataset::{Dataset, IndexedItem};
use crate::error::{BenchError, InferenceError};
use crate::inference::InferenceBackend;
use crate::ledger::{self, FailureDetails, LedgerKey, LedgerRecord, ProgressLedger};
use crate::matcher::{is_exact_match, marker_count};
use crate::registry::{ModelDescriptor, partition_by_size};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Settings the runner needs, detached from file paths.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub max_size_gb: Option<f64>,
    pub max_consecutive_failures: usize,
    pub warmup_prompt: String,
    pub system_prompt: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

impl From<&RunConfig> for RunnerConfig {
    fn from(run: &RunConfig) -> Self {
        Self {
            max_size_gb: run.max_size_gb,
            max_consecutive_failures: run.max_consecutive_failures,
            warmup_prompt: run.warmup_prompt.clone(),
            system_prompt: run.system_prompt.clone(),
        }
    }
}

/// An incorrect answer observed during this run.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedCase {
    pub index: usize,
    pub details: FailureDetails,
}

/// Per-model accumulator for one run.
#[derive(Debug, Clone, Default)]
pub struct ModelRunStats {
    pub latencies: Vec<f64>,
    pub response_lengths: Vec<usize>,
    pub correct_count: usize,
    pub total_count: usize,
    /// Requests that returned an error.
    pub failed_count: usize,
    /// Items already present in the ledger.
    pub skipped_count: usize,
    /// Set when the failure cutoff ended this model early.
    pub aborted: bool,
    pub failed_cases: Vec<FailedCase>,
}

impl ModelRunStats {
    fn record(&mut self, record: &LedgerRecord) {
        self.latencies.push(record.latency);
        self.response_lengths.push(record.response_length);
        self.total_count += 1;
        if record.is_correct {
            self.correct_count += 1;
        }
        if let Some(details) = &record.failure_details {
            self.failed_cases.push(FailedCase {
                index: record.index,
                details: details.clone(),
            });
        }
    }

    pub fn avg_latency(&self) -> Option<f64> {
        mean_of(self.latencies.iter().copied())
    }

    pub fn avg_response_length(&self) -> Option<f64> {
        mean_of(self.response_lengths.iter().map(|&l| l as f64))
    }

    /// Fraction of scored items that were correct.
    pub fn accuracy(&self) -> Option<f64> {
        (self.total_count > 0).then(|| self.correct_count as f64 / self.total_count as f64)
    }
}

fn mean_of(values: impl ExactSizeIterator<Item = f64>) -> Option<f64> {
    let n = values.len();
    (n > 0).then(|| values.sum::<f64>() / n as f64)
}

/// What happened to one model.
#[derive(Debug, Clone)]
pub enum ModelOutcome {
    FailedWarmup { error: String },
    Tested(ModelRunStats),
}

#[derive(Debug, Clone)]
pub struct ModelResult {
    pub model_name: String,
    pub outcome: ModelOutcome,
}

/// Result of a whole sweep.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Models excluded by the eligibility filter.
    pub ineligible: Vec<ModelDescriptor>,
    pub results: Vec<ModelResult>,
}

impl RunSummary {
    pub fn result(&self, model_name: &str) -> Option<&ModelOutcome> {
        self.results
            .iter()
            .find(|r| r.model_name == model_name)
            .map(|r| &r.outcome)
    }
}

/// Score one response into a ledger record.
pub fn score_response(
    model_name: &str,
    index: usize,
    expected: &str,
    actual: &str,
    latency: f64,
) -> LedgerRecord {
    let is_correct = is_exact_match(expected, actual);
    LedgerRecord {
        model_name: model_name.to_string(),
        index,
        latency,
        is_correct,
        response_length: actual.chars().count(),
        failure_details: (!is_correct).then(|| FailureDetails {
            expected_response: expected.to_string(),
            actual_response: actual.to_string(),
            expected_marker_count: marker_count(expected),
            actual_marker_count: marker_count(actual),
        }),
    }
}

/// Drives a benchmark sweep against one inference backend.
pub struct BenchmarkRunner {
    config: RunnerConfig,
    backend: Arc<dyn InferenceBackend>,
}

impl BenchmarkRunner {
    pub fn new(config: RunnerConfig, backend: Arc<dyn InferenceBackend>) -> Self {
        Self { config, backend }
    }

    /// Load the ledger at `ledger_path`, open it for appending and run.
    pub async fn resume(
        &self,
        models: &[ModelDescriptor],
        dataset: &Dataset,
        ledger_path: &Path,
    ) -> Result<RunSummary, BenchError> {
        let mut completed = ledger::load(ledger_path)?;
        info!(
            path = %ledger_path.display(),
            completed = completed.len(),
            "Loaded progress ledger; completed items will be skipped"
        );
        let mut ledger = ProgressLedger::open(ledger_path)?;
        self.run(models, dataset, &mut ledger, &mut completed).await
    }

    /// Run every eligible model over the dataset.
    ///
    /// Keys in `completed` are skipped; newly logged keys are added to it.
    /// Only a ledger write failure ends the sweep early.
    pub async fn run(
        &self,
        models: &[ModelDescriptor],
        dataset: &Dataset,
        ledger: &mut ProgressLedger,
        completed: &mut HashSet<LedgerKey>,
    ) -> Result<RunSummary, BenchError> {
        let started_at = Utc::now();
        let (eligible, ineligible) = partition_by_size(models, self.config.max_size_gb);

        for model in &ineligible {
            info!(
                model = %model.name,
                size_gb = model.size_gb.unwrap_or_default(),
                max_size_gb = self.config.max_size_gb.unwrap_or_default(),
                "Skipping model above size limit"
            );
        }
        info!(
            eligible = eligible.len(),
            skipped = ineligible.len(),
            backend = self.backend.name(),
            "Starting benchmark sweep"
        );

        let mut results = Vec::with_capacity(eligible.len());
        for model in &eligible {
            let outcome = self.run_model(model, dataset, ledger, completed).await?;
            results.push(ModelResult {
                model_name: model.name.clone(),
                outcome,
            });
        }

        Ok(RunSummary {
            started_at,
            finished_at: Utc::now(),
            ineligible,
            results,
        })
    }

    async fn run_model(
        &self,
        model: &ModelDescriptor,
        dataset: &Dataset,
        ledger: &mut ProgressLedger,
        completed: &mut HashSet<LedgerKey>,
    ) -> Result<ModelOutcome, BenchError> {
        let name = model.name.as_str();
        let system = self.config.system_prompt.as_deref();

        info!(model = %name, "Warming up model");
        if let Err(e) = self
            .backend
            .infer(&self.config.warmup_prompt, name, system)
            .await
        {
            warn!(model = %name, error = %e, "Warm-up failed; skipping model");
            return Ok(ModelOutcome::FailedWarmup {
                error: e.to_string(),
            });
        }

        let mut stats = ModelRunStats::default();
        let total = dataset.line_count;

        for entry in &dataset.items {
            let key = LedgerKey::new(name, entry.index);
            if completed.contains(&key) {
                info!(model = %name, item = entry.index + 1, total, "Already in ledger; skipping");
                stats.skipped_count += 1;
                continue;
            }

            match self.score_item(name, entry, system).await {
                Ok(record) => {
                    ledger.append(&record)?;
                    completed.insert(key);
                    log_scored(&record, total);
                    stats.record(&record);
                }
                Err(e) => {
                    stats.failed_count += 1;
                    warn!(
                        model = %name,
                        item = entry.index + 1,
                        total,
                        failures = stats.failed_count,
                        error = %e,
                        "Request failed"
                    );
                    // failed_count is never reset by a success
                    if stats.failed_count > self.config.max_consecutive_failures {
                        warn!(
                            model = %name,
                            failures = stats.failed_count,
                            "Too many failures; skipping remaining items"
                        );
                        stats.aborted = true;
                        break;
                    }
                }
            }
        }

        info!(
            model = %name,
            scored = stats.total_count,
            correct = stats.correct_count,
            failed = stats.failed_count,
            skipped = stats.skipped_count,
            "Model finished"
        );
        Ok(ModelOutcome::Tested(stats))
    }

    async fn score_item(
        &self,
        model_name: &str,
        entry: &IndexedItem,
        system: Option<&str>,
    ) -> Result<LedgerRecord, InferenceError> {
        let started = Instant::now();
        let actual = self
            .backend
            .infer(&entry.item.query, model_name, system)
            .await?;
        let latency = started.elapsed().as_secs_f64();
        Ok(score_response(
            model_name,
            entry.index,
            &entry.item.response,
            &actual,
            latency,
        ))
    }
}

fn log_scored(record: &LedgerRecord, total: usize) {
    let item = record.index + 1;
    match &record.failure_details {
        None => info!(
            model = %record.model_name,
            item,
            total,
            latency_s = record.latency,
            length = record.response_length,
            "Correct"
        ),
        Some(details) => info!(
            model = %record.model_name,
            item,
            total,
            latency_s = record.latency,
            length = record.response_length,
            expected = %details.expected_response,
            expected_commands = details.expected_marker_count,
            actual = %details.actual_response,
            actual_commands = details.actual_marker_count,
            "Incorrect"
        ),
    }
}
