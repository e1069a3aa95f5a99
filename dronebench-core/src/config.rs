//! Configuration for dronebench.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/dronebench/config.toml` and/or
//! `.dronebench/config.toml` in the working directory, or from an explicit path.

use crate::error::BenchError;
use crate::registry::ModelDescriptor;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// Which inference API to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Ollama `/api/generate`.
    #[default]
    Ollama,
    /// Any OpenAI-compatible `/chat/completions` endpoint.
    OpenAi,
}

impl std::str::FromStr for BackendKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "openai-compat" | "cloud" => Ok(Self::OpenAi),
            other => Err(BenchError::config(format!("unknown backend '{other}'"))),
        }
    }
}

/// Inference endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    /// Base URL, e.g. `http://localhost:11434` or `https://api.deepseek.com`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key (OpenAI-compatible backends only).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Benchmark sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    /// Skip models larger than this (GB). Models of unknown size always run.
    #[serde(default)]
    pub max_size_gb: Option<f64>,
    /// Abort a model once its request failures exceed this count. Successes in
    /// between do not reset the count.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: usize,
    #[serde(default = "default_warmup_prompt")]
    pub warmup_prompt: String,
    /// Optional system prompt sent with every request.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Models to benchmark, in order.
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
    /// File holding captured `ollama list` output, appended to `models`.
    #[serde(default)]
    pub models_file: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dataset_path: default_dataset_path(),
            ledger_path: default_ledger_path(),
            max_size_gb: None,
            max_consecutive_failures: default_max_consecutive_failures(),
            warmup_prompt: default_warmup_prompt(),
            system_prompt: None,
            models: Vec::new(),
            models_file: None,
        }
    }
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("val_dataset.jsonl")
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("test_progress.jsonl")
}

fn default_max_consecutive_failures() -> usize {
    5
}

fn default_warmup_prompt() -> String {
    "Hello".to_string()
}

/// Log analysis configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Files or directories of JSONL logs.
    #[serde(default)]
    pub inputs: Vec<PathBuf>,
    /// CSV export target.
    #[serde(default)]
    pub export_csv: Option<PathBuf>,
    /// JSON export target.
    #[serde(default)]
    pub export_json: Option<PathBuf>,
}

const CONFIG_DIR: &str = ".dronebench";
const CONFIG_FILE: &str = "config.toml";

/// User-level config file location, if the platform has one.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "dronebench", "dronebench")
        .map(|d| d.config_dir().join(CONFIG_FILE))
}

/// Workspace-level config file location.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `DRONEBENCH_`, `__` for nesting)
/// 2. Explicit config file, or the workspace `.dronebench/config.toml`
/// 3. User config (`~/.config/dronebench/config.toml`)
/// 4. Built-in defaults
///
/// CLI flags are applied by the caller on the returned value.
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<BenchConfig, BenchError> {
    let mut figment = Figment::from(Serialized::defaults(BenchConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(BenchError::config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }
        None => {
            if let Some(ws) = workspace {
                let ws_config = workspace_config_path(ws);
                if ws_config.exists() {
                    figment = figment.merge(Toml::file(&ws_config));
                }
            }
        }
    }

    // DRONEBENCH_RUN__LEDGER_PATH, DRONEBENCH_BACKEND__BASE_URL, ...
    figment = figment.merge(Env::prefixed("DRONEBENCH_").split("__"));

    figment
        .extract()
        .map_err(|e| BenchError::config(e.to_string()))
}

/// Write a default config file into the workspace, refusing to overwrite.
pub fn write_default_config(workspace: &Path) -> Result<PathBuf, BenchError> {
    let path = workspace_config_path(workspace);
    if path.exists() {
        return Err(BenchError::config(format!(
            "config already exists: {}",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(&BenchConfig::default())
        .map_err(|e| BenchError::config(e.to_string()))?;
    std::fs::write(&path, body)?;
    Ok(path)
}
