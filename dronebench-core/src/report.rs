//! Report rendering and export.
//!
//! Tables are rendered with `tabled`; the spreadsheet artifact is a CSV file.
//! Exports are written to a `.tmp` sibling and renamed into place.

use crate::error::BenchError;
use crate::runner::{ModelOutcome, RunSummary};
use crate::stats::AggregatedStats;
use std::fmt::Write as _;
use std::path::Path;
use tabled::settings::Style;
use tabled::{Table, Tabled};

const NA: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Tabled)]
pub struct SummaryRow {
    #[tabled(rename = "Model")]
    pub model: String,
    #[tabled(rename = "Avg Latency (s)")]
    pub avg_latency: String,
    #[tabled(rename = "Avg Resp. Length")]
    pub avg_response_length: String,
    #[tabled(rename = "Accuracy")]
    pub accuracy: String,
    #[tabled(rename = "Tests")]
    pub tests: String,
}

/// One summary row per model, in run order.
pub fn summary_rows(summary: &RunSummary) -> Vec<SummaryRow> {
    summary
        .results
        .iter()
        .map(|result| {
            let model = result.model_name.clone();
            match &result.outcome {
                ModelOutcome::FailedWarmup { .. } => na_row(model, "warm-up failed"),
                ModelOutcome::Tested(stats) => match (
                    stats.avg_latency(),
                    stats.avg_response_length(),
                    stats.accuracy(),
                ) {
                    (Some(latency), Some(length), Some(accuracy)) => SummaryRow {
                        model,
                        avg_latency: format!("{latency:.2}"),
                        avg_response_length: format!("{length:.0}"),
                        accuracy: format!("{:.2}%", accuracy * 100.0),
                        tests: format!("{}/{}", stats.correct_count, stats.total_count),
                    },
                    _ => na_row(model, "no valid tests"),
                },
            }
        })
        .collect()
}

fn na_row(model: String, tests: &str) -> SummaryRow {
    SummaryRow {
        model,
        avg_latency: NA.into(),
        avg_response_length: NA.into(),
        accuracy: NA.into(),
        tests: tests.into(),
    }
}

/// Summary table for a finished run.
pub fn render_run_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let elapsed = summary.finished_at - summary.started_at;
    let _ = writeln!(
        out,
        "Run finished at {} ({}s)",
        summary.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
        elapsed.num_seconds()
    );
    if !summary.ineligible.is_empty() {
        let names: Vec<_> = summary.ineligible.iter().map(|m| m.name.as_str()).collect();
        let _ = writeln!(out, "Skipped by size limit: {}", names.join(", "));
    }

    let mut table = Table::new(summary_rows(summary));
    table.with(Style::rounded());
    let _ = writeln!(out, "{table}");

    for result in &summary.results {
        match &result.outcome {
            ModelOutcome::FailedWarmup { error } => {
                let _ = writeln!(out, "{}: warm-up failed: {error}", result.model_name);
            }
            ModelOutcome::Tested(stats) if stats.failed_count > 0 || stats.skipped_count > 0 => {
                let _ = writeln!(
                    out,
                    "{}: {} request failures, {} items resumed from ledger{}",
                    result.model_name,
                    stats.failed_count,
                    stats.skipped_count,
                    if stats.aborted { ", aborted" } else { "" }
                );
            }
            ModelOutcome::Tested(_) => {}
        }
    }
    out
}

/// Detailed listing of every incorrect answer in the run.
pub fn render_failure_analysis(summary: &RunSummary) -> String {
    let mut out = String::new();
    for result in &summary.results {
        let ModelOutcome::Tested(stats) = &result.outcome else {
            continue;
        };
        if stats.failed_cases.is_empty() {
            continue;
        }
        let _ = writeln!(out, "--- Model: {} ---", result.model_name);
        for case in &stats.failed_cases {
            let d = &case.details;
            let _ = writeln!(out, "  - Item #{}:", case.index + 1);
            let _ = writeln!(
                out,
                "    - expected ({} commands): '{}'",
                d.expected_marker_count, d.expected_response
            );
            let _ = writeln!(
                out,
                "    - got      ({} commands): '{}'",
                d.actual_marker_count, d.actual_response
            );
        }
    }
    if out.is_empty() {
        out.push_str("No model produced an incorrect answer.\n");
    }
    out
}

#[derive(Debug, Clone, PartialEq, Tabled)]
struct AnalysisRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Total Samples")]
    total: usize,
    #[tabled(rename = "Exact Match Acc (%)")]
    exact: String,
    #[tabled(rename = "Contains Acc (%)")]
    contains: String,
    #[tabled(rename = "Avg Latency (s)")]
    avg_latency: String,
    #[tabled(rename = "Std Latency (s)")]
    std_latency: String,
    #[tabled(rename = "IPS")]
    ips: String,
    #[tabled(rename = "P95 Latency (s)")]
    p95_latency: String,
    #[tabled(rename = "Max Latency (s)")]
    max_latency: String,
    #[tabled(rename = "Avg Throughput (chars/s)")]
    throughput: String,
}

const CSV_HEADERS: [&str; 10] = [
    "Model",
    "Total Samples",
    "Exact Match Acc (%)",
    "Contains Acc (%)",
    "Avg Latency (s)",
    "Std Latency (s)",
    "IPS",
    "P95 Latency (s)",
    "Max Latency (s)",
    "Avg Throughput (chars/s)",
];

/// Analysis table with four decimals.
pub fn render_analysis(stats: &[AggregatedStats]) -> String {
    if stats.is_empty() {
        return "No data processed. Check the input paths and their content.\n".to_string();
    }
    let f = |v: f64| format!("{v:.4}");
    let rows: Vec<AnalysisRow> = stats
        .iter()
        .map(|s| AnalysisRow {
            model: s.model.clone(),
            total: s.total_samples,
            exact: f(s.exact_match_pct),
            contains: s.contains_match_pct.map_or_else(|| NA.to_string(), f),
            avg_latency: f(s.avg_latency_s),
            std_latency: f(s.std_latency_s),
            ips: f(s.inferences_per_second),
            p95_latency: f(s.p95_latency_s),
            max_latency: f(s.max_latency_s),
            throughput: f(s.avg_throughput_cps),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    format!("{table}\n")
}

/// Write the analysis as CSV at full precision.
pub fn export_csv(stats: &[AggregatedStats], path: &Path) -> Result<(), BenchError> {
    write_atomically(path, |tmp| {
        let mut writer = csv::Writer::from_path(tmp)?;
        writer.write_record(CSV_HEADERS)?;
        for s in stats {
            writer.write_record([
                s.model.clone(),
                s.total_samples.to_string(),
                s.exact_match_pct.to_string(),
                s.contains_match_pct
                    .map_or_else(|| NA.to_string(), |v| v.to_string()),
                s.avg_latency_s.to_string(),
                s.std_latency_s.to_string(),
                s.inferences_per_second.to_string(),
                s.p95_latency_s.to_string(),
                s.max_latency_s.to_string(),
                s.avg_throughput_cps.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    })
}

/// Write the analysis, failure cases included, as pretty JSON.
pub fn export_json(stats: &[AggregatedStats], path: &Path) -> Result<(), BenchError> {
    let json = serde_json::to_string_pretty(stats)?;
    write_atomically(path, |tmp| Ok(std::fs::write(tmp, json.as_bytes())?))
}

fn write_atomically(
    path: &Path,
    write: impl FnOnce(&Path) -> Result<(), BenchError>,
) -> Result<(), BenchError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    write(&tmp)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
