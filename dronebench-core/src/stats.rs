//! Log analysis: per-model accuracy, latency distribution and throughput.
//!
//! Accepts two line shapes, freely mixed across or within files:
//! progress-ledger records written by the runner, and offline evaluation
//! records (`response`, `model_ans`, `sp_time`) that carry the raw decoded
//! sequence. A record's own `model_name` wins; otherwise the file stem names
//! the model.

use crate::error::BenchError;
use crate::extract::extract_response;
use crate::ledger::{FailureDetails, LedgerRecord};
use crate::matcher::is_contains_match;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by `n`); 0 for an empty slice.
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Percentile `p` (0..=100) with linear interpolation between closest ranks.
/// Input need not be sorted; 0 for an empty slice.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Maximum value; 0 for an empty slice.
pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

/// Offline evaluation record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvalRecord {
    /// Ground truth.
    #[serde(default)]
    pub response: Option<String>,
    /// Raw decoded model output, template tokens included.
    #[serde(default)]
    pub model_ans: Option<String>,
    /// Elapsed seconds.
    #[serde(default)]
    pub sp_time: Option<f64>,
    #[serde(default)]
    pub model_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LogLine {
    Ledger(LedgerRecord),
    Eval(EvalRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The model answered, but with the wrong content.
    ContentMismatch,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureCase {
    pub index: Option<usize>,
    pub reason: FailureReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<FailureDetails>,
}

/// Raw samples collected for one model.
#[derive(Debug, Clone, Default)]
pub struct ModelAccumulator {
    pub latencies: Vec<f64>,
    pub throughputs: Vec<f64>,
    pub exact_matches: usize,
    /// Samples for which both texts were available to the contains check.
    pub contains_checked: usize,
    pub contains_matches: usize,
    pub failure_cases: Vec<FailureCase>,
}

impl ModelAccumulator {
    fn push(&mut self, latency: f64, response_chars: usize, exact: bool, contains: Option<bool>) {
        self.latencies.push(latency);
        self.throughputs.push(response_chars as f64 / latency);
        if exact {
            self.exact_matches += 1;
        }
        if let Some(hit) = contains {
            self.contains_checked += 1;
            if hit {
                self.contains_matches += 1;
            }
        }
    }

    pub fn count(&self) -> usize {
        self.latencies.len()
    }

    fn finish(self, model: String) -> AggregatedStats {
        let count = self.count();
        let pct = |n: usize| n as f64 / count as f64 * 100.0;
        let avg_latency = mean(&self.latencies);
        AggregatedStats {
            model,
            total_samples: count,
            correct: self.exact_matches,
            incorrect: count - self.exact_matches,
            exact_match_pct: pct(self.exact_matches),
            contains_samples: self.contains_checked,
            contains_match_pct: (self.contains_checked > 0).then(|| {
                self.contains_matches as f64 / self.contains_checked as f64 * 100.0
            }),
            avg_latency_s: avg_latency,
            std_latency_s: population_std(&self.latencies),
            inferences_per_second: if avg_latency > 0.0 { 1.0 / avg_latency } else { 0.0 },
            p95_latency_s: percentile(&self.latencies, 95.0),
            max_latency_s: max(&self.latencies),
            avg_throughput_cps: mean(&self.throughputs),
            failure_cases: self.failure_cases,
        }
    }
}

/// Derived per-model statistics. Never persisted as the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedStats {
    pub model: String,
    pub total_samples: usize,
    /// Exact-match correct count.
    pub correct: usize,
    pub incorrect: usize,
    pub exact_match_pct: f64,
    /// Samples the contains percentage is computed over.
    pub contains_samples: usize,
    /// `None` when no sample carried both texts (ledger records of correct answers).
    pub contains_match_pct: Option<f64>,
    pub avg_latency_s: f64,
    pub std_latency_s: f64,
    pub inferences_per_second: f64,
    pub p95_latency_s: f64,
    pub max_latency_s: f64,
    /// Mean of response characters per second across samples.
    pub avg_throughput_cps: f64,
    pub failure_cases: Vec<FailureCase>,
}

/// Groups log records by model and accumulates samples.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    groups: BTreeMap<String, ModelAccumulator>,
    malformed_lines: usize,
    excluded_records: usize,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines that were not valid JSON records.
    pub fn malformed_lines(&self) -> usize {
        self.malformed_lines
    }

    /// Records dropped for missing ground truth, answer, or positive timing.
    pub fn excluded_records(&self) -> usize {
        self.excluded_records
    }

    /// Ingest a file, or every `*.jsonl` file in a directory (sorted by name).
    /// Missing paths are logged and skipped.
    pub fn ingest_path(&mut self, path: &Path) -> Result<(), BenchError> {
        for file in expand_inputs(path)? {
            let content = std::fs::read_to_string(&file)?;
            let source = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            tracing::debug!(path = %file.display(), model = %source, "Analyzing log file");
            self.ingest_str(&source, &content);
        }
        Ok(())
    }

    /// Ingest JSONL content whose fallback model name is `source`.
    pub fn ingest_str(&mut self, source: &str, content: &str) {
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogLine>(line) {
                Ok(LogLine::Ledger(record)) => self.ingest_ledger(source, record),
                Ok(LogLine::Eval(record)) => self.ingest_eval(source, record),
                Err(e) => {
                    self.malformed_lines += 1;
                    tracing::warn!(
                        source = %source,
                        line = line_no + 1,
                        error = %e,
                        "Skipping malformed line"
                    );
                }
            }
        }
    }

    pub fn ingest_ledger(&mut self, source: &str, record: LedgerRecord) {
        if record.latency.is_nan() || record.latency <= 0.0 {
            self.excluded_records += 1;
            return;
        }

        // Only failure details keep both texts; a correct record stores neither.
        let contains = record
            .failure_details
            .as_ref()
            .map(|d| is_contains_match(&d.expected_response, &d.actual_response));

        let acc = self.group(model_name(Some(&record.model_name), source));
        acc.push(
            record.latency,
            record.response_length,
            record.is_correct,
            contains,
        );
        if !record.is_correct {
            acc.failure_cases.push(FailureCase {
                index: Some(record.index),
                reason: if record.failure_details.is_some() {
                    FailureReason::ContentMismatch
                } else {
                    FailureReason::Unknown
                },
                details: record.failure_details,
            });
        }
    }

    pub fn ingest_eval(&mut self, source: &str, record: EvalRecord) {
        let ground_truth = record.response.as_deref().map(str::trim).unwrap_or("");
        let raw = record.model_ans.as_deref().unwrap_or("");
        let latency = record.sp_time.unwrap_or(0.0);
        if ground_truth.is_empty() || raw.is_empty() || latency.is_nan() || latency <= 0.0 {
            self.excluded_records += 1;
            return;
        }

        let model = model_name(record.model_name.as_deref(), source);
        let cleaned = extract_response(raw, &model);
        let exact = cleaned == ground_truth;
        // Contains uses the untrimmed ground truth against the raw output.
        let contains = is_contains_match(record.response.as_deref().unwrap_or(""), raw);

        self.group(model)
            .push(latency, cleaned.chars().count(), exact, Some(contains));
    }

    fn group(&mut self, model: String) -> &mut ModelAccumulator {
        self.groups.entry(model).or_default()
    }

    /// Final statistics sorted by model name; models without samples are dropped.
    pub fn finish(self) -> Vec<AggregatedStats> {
        self.groups
            .into_iter()
            .filter(|(_, acc)| acc.count() > 0)
            .map(|(model, acc)| acc.finish(model))
            .collect()
    }
}

fn model_name(field: Option<&str>, source: &str) -> String {
    match field.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => source.to_string(),
    }
}

fn expand_inputs(path: &Path) -> Result<Vec<PathBuf>, BenchError> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "Analysis input not found; skipping");
        return Ok(Vec::new());
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();
    Ok(files)
}

/// Analyze every input path and return per-model statistics.
pub fn analyze_paths(paths: &[PathBuf]) -> Result<Vec<AggregatedStats>, BenchError> {
    let mut aggregator = StatsAggregator::new();
    for path in paths {
        aggregator.ingest_path(path)?;
    }
    if aggregator.malformed_lines() > 0 || aggregator.excluded_records() > 0 {
        tracing::info!(
            malformed = aggregator.malformed_lines(),
            excluded = aggregator.excluded_records(),
            "Some records were not counted"
        );
    }
    Ok(aggregator.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_distribution_helpers() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(close(percentile(&values, 95.0), 4.8));
        assert!(close(mean(&values), 3.0));
        assert!(close(population_std(&values), 2f64.sqrt()));
        assert!(close(max(&values), 5.0));
    }

    #[test]
    fn test_percentile_unsorted_and_edges() {
        let values = [5.0, 1.0, 4.0, 2.0, 3.0];
        assert!(close(percentile(&values, 95.0), 4.8));
        assert!(close(percentile(&values, 0.0), 1.0));
        assert!(close(percentile(&values, 100.0), 5.0));
        assert!(close(percentile(&[7.0], 95.0), 7.0));
        assert_eq!(percentile(&[], 95.0), 0.0);
    }

    #[test]
    fn test_eval_records_use_extraction_and_file_stem() {
        let content = concat!(
            r#"{"response":"takeoff(); land()","model_ans":"<|im_start|>assistant\ntakeoff(); land()<|im_end|>","sp_time":2.0}"#,
            "\n",
            r#"{"response":"hover(3)","model_ans":"<|im_start|>assistant\nhover(3) now<|im_end|>","sp_time":1.0}"#,
            "\n",
        );
        let mut agg = StatsAggregator::new();
        agg.ingest_str("qwen2.5_0.5b_after", content);
        let stats = agg.finish();

        assert_eq!(stats.len(), 1);
        let s = &stats[0];
        assert_eq!(s.model, "qwen2.5_0.5b_after");
        assert_eq!(s.total_samples, 2);
        assert!(close(s.exact_match_pct, 50.0));
        // "hover(3)" is contained in the raw text of the second answer
        assert_eq!(s.contains_match_pct, Some(100.0));
        // 17 chars / 2s and 12 chars / 1s
        assert!(close(s.avg_throughput_cps, (17.0 / 2.0 + 12.0) / 2.0));
        assert!(close(s.inferences_per_second, 1.0 / 1.5));
    }

    #[test]
    fn test_unknown_family_counts_as_incorrect() {
        let mut agg = StatsAggregator::new();
        agg.ingest_str(
            "mystery",
            r#"{"response":"land()","model_ans":"land()","sp_time":1.0}"#,
        );
        let stats = agg.finish();
        assert_eq!(stats[0].correct, 0);
        assert!(close(stats[0].exact_match_pct, 0.0));
        assert_eq!(stats[0].contains_match_pct, Some(100.0));
        assert!(close(stats[0].avg_throughput_cps, 0.0));
    }

    #[test]
    fn test_filtered_records_leave_denominator() {
        let content = concat!(
            r#"{"response":"","model_ans":"x","sp_time":1.0}"#, "\n",
            r#"{"response":"a","model_ans":"","sp_time":1.0}"#, "\n",
            r#"{"response":"a","model_ans":"x","sp_time":0}"#, "\n",
            r#"{"response":"a","model_ans":"x"}"#, "\n",
            "not json\n",
        );
        let mut agg = StatsAggregator::new();
        agg.ingest_str("qwen2.5", content);
        assert_eq!(agg.excluded_records(), 4);
        assert_eq!(agg.malformed_lines(), 1);
        // A model with zero qualifying samples is dropped entirely.
        assert!(agg.finish().is_empty());
    }

    #[test]
    fn test_ledger_records_group_by_field() {
        let content = concat!(
            r#"{"model_name":"a","index":0,"latency":1.0,"is_correct":true,"response_length":10}"#, "\n",
            r#"{"model_name":"a","index":1,"latency":3.0,"is_correct":false,"response_length":6,"failure_details":{"expected_response":"x;y","actual_response":"y x","expected_semicolons":1,"actual_semicolons":0}}"#, "\n",
            r#"{"model_name":"b","index":0,"latency":2.0,"is_correct":false,"response_length":4}"#, "\n",
            r#"{"model_name":"b","index":1,"latency":0.0,"is_correct":true,"response_length":4}"#, "\n",
        );
        let mut agg = StatsAggregator::new();
        agg.ingest_str("test_progress", content);
        let stats = agg.finish();

        assert_eq!(stats.len(), 2);
        let a = &stats[0];
        assert_eq!(a.model, "a");
        assert_eq!((a.correct, a.incorrect), (1, 1));
        assert!(close(a.exact_match_pct, 50.0));
        // Only the failed record carries both texts.
        assert_eq!(a.contains_samples, 1);
        assert_eq!(a.contains_match_pct, Some(100.0));
        assert!(close(a.avg_throughput_cps, (10.0 + 2.0) / 2.0));
        assert_eq!(a.failure_cases.len(), 1);
        assert_eq!(a.failure_cases[0].reason, FailureReason::ContentMismatch);

        let b = &stats[1];
        assert_eq!(b.total_samples, 1);
        assert_eq!(b.failure_cases[0].reason, FailureReason::Unknown);
        assert_eq!(b.contains_match_pct, None);
    }

    #[test]
    fn test_ingest_directory_sorted_and_missing_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("gemma2-2b.jsonl"),
            "{\"response\":\"land()\",\"model_ans\":\"<start_of_turn>model\\nland()<end_of_turn><eos>\",\"sp_time\":0.5}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let stats = analyze_paths(&[
            dir.path().to_path_buf(),
            dir.path().join("missing.jsonl"),
        ])
        .unwrap();

        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].model, "gemma2-2b");
        assert!(close(stats[0].exact_match_pct, 100.0));
        assert!(close(stats[0].max_latency_s, 0.5));
        assert!(close(stats[0].std_latency_s, 0.0));
    }

    #[test]
    fn test_record_model_name_overrides_file_stem() {
        let mut agg = StatsAggregator::new();
        agg.ingest_str(
            "before",
            r#"{"model_name":"llama3.2_1b","response":"land()","model_ans":"assistant<|end_header_id|>\n\nland()<|eot_id|>","sp_time":1.0}"#,
        );
        let stats = agg.finish();
        assert_eq!(stats[0].model, "llama3.2_1b");
        assert_eq!(stats[0].correct, 1);
    }

    #[test]
    fn test_correct_ledger_record_with_dotted_truth_is_not_a_contains_hit() {
        let truth = "takeoff(); fly_forward(2.0); land()";
        assert!(!is_contains_match(truth, truth));

        let content = concat!(
            r#"{"model_name":"m","index":0,"latency":1.0,"is_correct":true,"response_length":35}"#, "\n",
            r#"{"model_name":"m","index":1,"latency":1.0,"is_correct":false,"response_length":17,"failure_details":{"expected_response":"takeoff(); fly_forward(2.0); land()","actual_response":"takeoff(); land()","expected_semicolons":2,"actual_semicolons":1}}"#, "\n",
        );
        let mut agg = StatsAggregator::new();
        agg.ingest_str("progress", content);
        let stats = agg.finish();

        assert!(close(stats[0].exact_match_pct, 50.0));
        assert_eq!(stats[0].contains_samples, 1);
        assert_eq!(stats[0].contains_match_pct, Some(0.0));
    }

    #[test]
    fn test_contains_is_unknown_for_correct_only_ledger() {
        let mut agg = StatsAggregator::new();
        agg.ingest_str(
            "progress",
            r#"{"model_name":"m","index":0,"latency":1.0,"is_correct":true,"response_length":8}"#,
        );
        let stats = agg.finish();
        assert_eq!(stats[0].contains_samples, 0);
        assert_eq!(stats[0].contains_match_pct, None);
    }
}
