//! dronebench CLI: run resumable model sweeps and analyze their logs.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Benchmark drone-command language models for accuracy and latency
#[derive(Parser, Debug)]
#[command(name = "dronebench", version, about, long_about = None)]
struct Cli {
    /// Configuration file path (defaults to .dronebench/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Working directory used to locate the workspace config
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run (or resume) a benchmark sweep
    Run(commands::RunArgs),
    /// Aggregate ledgers and evaluation logs into per-model statistics
    Analyze(commands::AnalyzeArgs),
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (API keys for hosted backends)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable layer for stderr (always active)
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured run logs
    let log_dir = directories::ProjectDirs::from("dev", "dronebench", "dronebench")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "dronebench.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if let Commands::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => commands::config_init(&workspace),
            ConfigAction::Show => commands::config_show(&workspace, cli.config.as_deref()),
        };
    }

    let config = dronebench_core::load_config(Some(&workspace), cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => commands::run(args, config).await,
        Commands::Analyze(args) => commands::analyze(args, config),
        Commands::Config { .. } => Ok(()),
    }
}
