//! Subcommand handlers.

use anyhow::{Context, bail};
use clap::Args;
use dronebench_core::config::BackendKind;
use dronebench_core::inference::OllamaBackend;
use dronebench_core::registry::parse_ollama_list;
use dronebench_core::{
    BenchConfig, BenchmarkRunner, Dataset, InferenceBackend, ModelDescriptor, RunnerConfig,
    create_backend, report, stats,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// JSONL dataset of {"query", "response"} items
    #[arg(long)]
    pub dataset: Option<PathBuf>,

    /// Progress ledger to resume from and append to
    #[arg(long)]
    pub ledger: Option<PathBuf>,

    /// Skip models larger than this many GB
    #[arg(long)]
    pub max_size_gb: Option<f64>,

    /// Model to test (repeatable); replaces the configured list
    #[arg(short, long = "model")]
    pub models: Vec<String>,

    /// File holding `ollama list` output
    #[arg(long)]
    pub models_file: Option<PathBuf>,

    /// Add every model the Ollama server reports
    #[arg(long)]
    pub discover: bool,

    /// Inference backend (ollama, openai)
    #[arg(long)]
    pub backend: Option<BackendKind>,

    /// Backend base URL
    #[arg(long)]
    pub base_url: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct AnalyzeArgs {
    /// Ledger or evaluation JSONL files, or directories of them
    pub paths: Vec<PathBuf>,

    /// Write per-model statistics as CSV
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Write per-model statistics and failure cases as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,
}

/// Fold command-line flags over the loaded configuration.
fn apply_run_overrides(config: &mut BenchConfig, args: &RunArgs) {
    if let Some(dataset) = &args.dataset {
        config.run.dataset_path = dataset.clone();
    }
    if let Some(ledger) = &args.ledger {
        config.run.ledger_path = ledger.clone();
    }
    if args.max_size_gb.is_some() {
        config.run.max_size_gb = args.max_size_gb;
    }
    if let Some(path) = &args.models_file {
        config.run.models_file = Some(path.clone());
    }
    if let Some(kind) = args.backend {
        config.backend.kind = kind;
    }
    if let Some(url) = &args.base_url {
        config.backend.base_url = url.clone();
    }
    if !args.models.is_empty() {
        config.run.models = args.models.iter().map(ModelDescriptor::named).collect();
    }
}

/// Concatenate model sources, keeping the first entry seen for each name.
fn merge_models(sources: impl IntoIterator<Item = Vec<ModelDescriptor>>) -> Vec<ModelDescriptor> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .flatten()
        .filter(|m| seen.insert(m.name.clone()))
        .collect()
}

async fn collect_models(config: &BenchConfig, discover: bool) -> anyhow::Result<Vec<ModelDescriptor>> {
    let mut sources = vec![config.run.models.clone()];

    if let Some(path) = &config.run.models_file {
        let listing = std::fs::read_to_string(path)
            .with_context(|| format!("reading model list {}", path.display()))?;
        sources.push(parse_ollama_list(&listing));
    }

    if discover {
        if config.backend.kind != BackendKind::Ollama {
            bail!("--discover requires the ollama backend");
        }
        let discovered = OllamaBackend::new(&config.backend)?.list_models().await?;
        tracing::info!(count = discovered.len(), "Discovered models");
        sources.push(discovered);
    }

    Ok(merge_models(sources))
}

pub async fn run(args: RunArgs, mut config: BenchConfig) -> anyhow::Result<()> {
    apply_run_overrides(&mut config, &args);

    let models = collect_models(&config, args.discover).await?;
    if models.is_empty() {
        bail!("no models to test; pass --model, --models-file or --discover");
    }

    let dataset = Dataset::load(&config.run.dataset_path)?;
    tracing::info!(
        items = dataset.len(),
        models = models.len(),
        backend = ?config.backend.kind,
        "Starting benchmark"
    );

    let backend: Arc<dyn InferenceBackend> = Arc::from(create_backend(&config.backend)?);
    let runner = BenchmarkRunner::new(RunnerConfig::from(&config.run), backend);
    let summary = runner
        .resume(&models, &dataset, &config.run.ledger_path)
        .await?;

    println!("{}", report::render_run_summary(&summary));
    println!("{}", report::render_failure_analysis(&summary));
    Ok(())
}

pub fn analyze(args: AnalyzeArgs, config: BenchConfig) -> anyhow::Result<()> {
    let paths = if args.paths.is_empty() {
        config.analysis.inputs
    } else {
        args.paths
    };
    if paths.is_empty() {
        bail!("nothing to analyze; pass one or more paths");
    }

    let results = stats::analyze_paths(&paths)?;
    println!("{}", report::render_analysis(&results));

    if let Some(path) = args.export.or(config.analysis.export_csv) {
        report::export_csv(&results, &path)?;
        println!("CSV written to {}", path.display());
    }
    if let Some(path) = args.json.or(config.analysis.export_json) {
        report::export_json(&results, &path)?;
        println!("JSON written to {}", path.display());
    }
    Ok(())
}

pub fn config_init(workspace: &Path) -> anyhow::Result<()> {
    let path = dronebench_core::config::write_default_config(workspace)?;
    println!("Created {}", path.display());
    Ok(())
}

pub fn config_show(workspace: &Path, explicit: Option<&Path>) -> anyhow::Result<()> {
    let config = dronebench_core::load_config(Some(workspace), explicit)?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
