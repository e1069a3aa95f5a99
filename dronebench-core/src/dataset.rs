//! Ground-truth dataset loading.

use crate::error::BenchError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One prompt with its expected command sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetItem {
    pub query: String,
    pub response: String,
}

/// A dataset item together with its ledger index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedItem {
    /// Zero-based line number in the dataset file.
    pub index: usize,
    pub item: DatasetItem,
}

/// The loaded dataset, in file order.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub items: Vec<IndexedItem>,
    /// Number of lines in the source file, blank and malformed ones included.
    pub line_count: usize,
}

impl Dataset {
    /// Load a JSONL dataset. A missing file is fatal; malformed lines are skipped.
    pub fn load(path: &Path) -> Result<Self, BenchError> {
        if !path.exists() {
            return Err(BenchError::DatasetNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let dataset = Self::parse(&content);
        if dataset.items.is_empty() {
            return Err(BenchError::dataset(format!(
                "no usable items in {}",
                path.display()
            )));
        }
        Ok(dataset)
    }

    /// Parse JSONL content. Indices follow line numbers so they stay stable
    /// when a neighbouring line is malformed or blank.
    pub fn parse(content: &str) -> Self {
        let mut items = Vec::new();
        let mut line_count = 0;
        for (index, line) in content.lines().enumerate() {
            line_count = index + 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DatasetItem>(line) {
                Ok(item) => items.push(IndexedItem { index, item }),
                Err(e) => {
                    tracing::warn!(line = index + 1, error = %e, "Skipping invalid dataset line")
                }
            }
        }
        Self { items, line_count }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
