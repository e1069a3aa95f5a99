//! # dronebench-core
//!
//! Resumable accuracy and latency benchmarks for language models that turn
//! natural-language drone instructions into command sequences.
//!
//! - [`runner`] sweeps models × dataset items against an [`inference`] backend,
//!   appending each scored item to the [`ledger`] as it goes.
//! - [`stats`] rebuilds per-model statistics from ledgers and offline
//!   evaluation dumps; [`report`] renders and exports them.

pub mod config;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod inference;
pub mod ledger;
pub mod matcher;
pub mod registry;
pub mod report;
pub mod runner;
pub mod stats;

pub use config::{BenchConfig, load_config};
pub use dataset::{Dataset, DatasetItem};
pub use error::{BenchError, InferenceError};
pub use inference::{InferenceBackend, create_backend};
pub use ledger::{LedgerKey, LedgerRecord, ProgressLedger};
pub use registry::ModelDescriptor;
pub use runner::{BenchmarkRunner, RunSummary, RunnerConfig};
pub use stats::{AggregatedStats, StatsAggregator};
