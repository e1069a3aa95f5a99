//! Model descriptors and eligibility filtering.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// An inference target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    /// On-disk size in GB, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_gb: Option<f64>,
}

impl ModelDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size_gb: None,
        }
    }

    pub fn with_size(name: impl Into<String>, size_gb: f64) -> Self {
        Self {
            name: name.into(),
            size_gb: Some(size_gb),
        }
    }
}

static OLLAMA_LIST_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+)\s+[a-f0-9]+\s+([\d.]+)\s+(MB|GB)").expect("static regex is valid")
});

/// Parse the tabular output of `ollama list`.
///
/// The header row is skipped, as is any row that does not carry a
/// `NAME ID SIZE UNIT` prefix. MB sizes are converted to GB by dividing by 1024.
pub fn parse_ollama_list(output: &str) -> Vec<ModelDescriptor> {
    output
        .trim()
        .lines()
        .skip(1)
        .filter_map(|line| {
            let caps = OLLAMA_LIST_ROW.captures(line.trim_start())?;
            let size: f64 = caps[2].parse().ok()?;
            let size_gb = if &caps[3] == "MB" { size / 1024.0 } else { size };
            Some(ModelDescriptor::with_size(&caps[1], size_gb))
        })
        .collect()
}

/// Split models into `(eligible, skipped)` by size ceiling, preserving order.
///
/// Models of unknown size are eligible; without a ceiling every model is.
pub fn partition_by_size(
    models: &[ModelDescriptor],
    max_size_gb: Option<f64>,
) -> (Vec<ModelDescriptor>, Vec<ModelDescriptor>) {
    models.iter().cloned().partition(|m| match (m.size_gb, max_size_gb) {
        (Some(size), Some(max)) => size <= max,
        _ => true,
    })
}
