//! Append-only progress ledger.
//!
//! One JSON record per line, one line per completed `(model_name, index)`.
//! The ledger is the only durable state of a benchmark run: re-reading it
//! rebuilds the set of items to skip after a crash or restart.

use crate::error::BenchError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Identity of a ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LedgerKey {
    pub model_name: String,
    pub index: usize,
}

impl LedgerKey {
    pub fn new(model_name: impl Into<String>, index: usize) -> Self {
        Self {
            model_name: model_name.into(),
            index,
        }
    }
}

/// Diagnostic detail stored for an incorrect answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetails {
    pub expected_response: String,
    pub actual_response: String,
    #[serde(rename = "expected_semicolons", alias = "expected_marker_count")]
    pub expected_marker_count: usize,
    #[serde(rename = "actual_semicolons", alias = "actual_marker_count")]
    pub actual_marker_count: usize,
}

/// One completed benchmark item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub model_name: String,
    pub index: usize,
    /// Wall-clock inference time in seconds.
    pub latency: f64,
    pub is_correct: bool,
    /// Character count of the raw response.
    pub response_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_details: Option<FailureDetails>,
}

impl LedgerRecord {
    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.model_name.clone(), self.index)
    }
}

/// Read every parseable record from a ledger file.
///
/// A missing file is an empty ledger. Blank lines are ignored; malformed
/// lines are logged and skipped.
pub fn read_records(path: &Path) -> Result<Vec<LedgerRecord>, BenchError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path).map_err(|e| BenchError::ledger(path, e))?;
    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| BenchError::ledger(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LedgerRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(
                path = %path.display(),
                line = line_no + 1,
                error = %e,
                "Skipping invalid ledger line: {}",
                line.trim()
            ),
        }
    }
    Ok(records)
}

/// Load the set of completed keys from a ledger file.
pub fn load(path: &Path) -> Result<HashSet<LedgerKey>, BenchError> {
    Ok(read_records(path)?.iter().map(LedgerRecord::key).collect())
}

/// Writer half of the ledger, opened in append mode.
pub struct ProgressLedger {
    path: PathBuf,
    file: File,
}

impl ProgressLedger {
    /// Open (or create) the ledger for appending. Existing content is kept.
    ///
    /// If the file ends in a torn line from an interrupted write, a newline
    /// is written so the next record starts on a line of its own.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BenchError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| BenchError::ledger(&path, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(|e| BenchError::ledger(&path, e))?;

        if ends_with_partial_line(&mut file).map_err(|e| BenchError::ledger(&path, e))? {
            tracing::warn!(path = %path.display(), "Ledger ends with a partial line; sealing it");
            file.write_all(b"\n")
                .and_then(|_| file.sync_data())
                .map_err(|e| BenchError::ledger(&path, e))?;
        }

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and make it durable before returning.
    pub fn append(&mut self, record: &LedgerRecord) -> Result<(), BenchError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .and_then(|_| self.file.sync_data())
            .map_err(|e| BenchError::ledger(&self.path, e))
    }
}

fn ends_with_partial_line(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
