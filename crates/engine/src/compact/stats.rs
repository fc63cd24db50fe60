//! Per-iteration compaction statistics.
//!
//! One CSV row per trial, one writer per run. Rows are flushed as they are
//! written so a crashed or interrupted run still leaves a complete record of
//! everything it attempted.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::common::error::{Error, Result};

/// Column set of the A0 statistics file.
pub const A0_HEADER: [&str; 8] = [
    "asm_source",
    "removed_codeline",
    "compiles",
    "lsim_ok",
    "tat",
    "fsim_ok",
    "coverage",
    "verdict",
];

/// Column set of the A1xx statistics file (adds the block index).
pub const A1XX_HEADER: [&str; 9] = [
    "asm_source",
    "block_index",
    "removed_codelines",
    "compiles",
    "lsim_ok",
    "tat",
    "fsim_ok",
    "coverage",
    "verdict",
];

/// Final decision of one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The removal is kept; compaction proceeds.
    Proceed,
    /// The removal is undone.
    Restore,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proceed => write!(f, "Proceed"),
            Self::Restore => write!(f, "Restore"),
        }
    }
}

/// One statistics row; unset fields render as empty cells.
#[derive(Debug, Clone, Default)]
pub struct IterationStats {
    /// Source file the removal acted on.
    pub asm_source: Option<String>,
    /// A1xx only: index of the block under teardown.
    pub block_index: Option<usize>,
    /// Display form of the removed codeline(s).
    pub removed: Option<String>,
    /// Whether the assembly still cross-compiles (`YES`/`NO`).
    pub compiles: Option<String>,
    /// Logic simulation outcome (`YES` or `NO-<reason>`).
    pub lsim_ok: Option<String>,
    /// Captured test application time.
    pub tat: Option<u64>,
    /// Fault simulation outcome (`YES` or `NO-<reason>`).
    pub fsim_ok: Option<String>,
    /// Computed coverage value.
    pub coverage: Option<f64>,
    /// Trial verdict.
    pub verdict: Option<Verdict>,
}

impl IterationStats {
    /// Whether any field has been set.
    pub fn is_populated(&self) -> bool {
        self.asm_source.is_some()
            || self.block_index.is_some()
            || self.removed.is_some()
            || self.compiles.is_some()
            || self.lsim_ok.is_some()
            || self.tat.is_some()
            || self.fsim_ok.is_some()
            || self.coverage.is_some()
            || self.verdict.is_some()
    }

    /// Renders the row in header order.
    fn to_record(&self, with_block_index: bool) -> Vec<String> {
        let mut record = Vec::with_capacity(9);
        record.push(self.asm_source.clone().unwrap_or_default());
        if with_block_index {
            record.push(self.block_index.map(|i| i.to_string()).unwrap_or_default());
        }
        record.push(self.removed.clone().unwrap_or_default());
        record.push(self.compiles.clone().unwrap_or_default());
        record.push(self.lsim_ok.clone().unwrap_or_default());
        record.push(self.tat.map(|t| t.to_string()).unwrap_or_default());
        record.push(self.fsim_ok.clone().unwrap_or_default());
        record.push(self.coverage.map(|c| c.to_string()).unwrap_or_default());
        record.push(self.verdict.map(|v| v.to_string()).unwrap_or_default());
        record
    }
}

/// CSV writer for the per-iteration statistics of one run.
#[derive(Debug)]
pub struct CompactionStatistics {
    writer: csv::Writer<File>,
    path: PathBuf,
    with_block_index: bool,
}

impl CompactionStatistics {
    /// Creates the statistics file and writes the header row.
    ///
    /// `with_block_index` selects the A1xx column set.
    pub fn create(path: impl AsRef<Path>, with_block_index: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        let mut writer = csv::Writer::from_writer(file);

        let header: &[&str] = if with_block_index {
            &A1XX_HEADER
        } else {
            &A0_HEADER
        };
        writer
            .write_record(header)
            .and_then(|()| writer.flush().map_err(Into::into))
            .map_err(|e| Error::io(&path, std::io::Error::other(e)))?;

        Ok(Self {
            writer,
            path,
            with_block_index,
        })
    }

    /// The statistics file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one row and flushes it to disk.
    pub fn append(&mut self, row: &IterationStats) -> Result<()> {
        self.writer
            .write_record(row.to_record(self.with_block_index))
            .and_then(|()| self.writer.flush().map_err(Into::into))
            .map_err(|e| Error::io(&self.path, std::io::Error::other(e)))
    }
}
