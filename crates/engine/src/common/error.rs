//! Engine error definitions.
//!
//! One enum covers every failure the engine reports across the core/driver
//! boundary. Iteration-local simulator outcomes (compile failure, simulation
//! error, timeout) are deliberately *not* errors: they are status variants
//! returned by the invoker, recorded in the statistics log, and followed by a
//! restore. Everything here is either fatal to the run or fatal to startup.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used by every fallible operation in the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All engine-level failures.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file could not be loaded or is missing required keys.
    ///
    /// The message carries the offending key path (e.g.
    /// `vcs_logic_simulation_control.timeout`).
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O failure on a file the engine owns (sources, reports, traces).
    #[error("i/o error on {path}: {source}")]
    Io {
        /// File the operation was acting on.
        path: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Malformed line in the ISA language file.
    ///
    /// Raised for empty lines and for non-comment lines with more than one
    /// whitespace-separated token.
    #[error("syntax error at line {line} of ISA file {path}")]
    IsaSyntax {
        /// The ISA language file.
        path: PathBuf,
        /// 1-based offending line number.
        line: usize,
    },

    /// A candidate with the requested line number is not in the handler.
    #[error("requested codeline with line number {0} not found")]
    CandidateNotFound(usize),

    /// A handler operation was asked for but no candidates remain.
    #[error("no candidates available in {0}")]
    NoCandidates(PathBuf),

    /// Fault report section extraction or grammar failure.
    #[error("fault report error: {0}")]
    Report(String),

    /// Coverage formula lexing, parsing, or evaluation failure.
    #[error("coverage formula error: {0}")]
    Formula(String),

    /// The requested coverage formula does not exist in the report.
    #[error("coverage formula {0:?} not present in the fault report")]
    UnknownFormula(String),

    /// Processor trace could not be parsed with the configured grammar.
    #[error("trace parse error: {0}")]
    Trace(String),

    /// Trace query matched no row.
    #[error("no trace row found for {0}")]
    NoRowFound(String),

    /// Trace query matched several rows but multiples were not allowed.
    #[error("trace query resulted in multiple rows for {0}")]
    AmbiguousQuery(String),

    /// ELF container or DWARF line-program failure.
    #[error("dwarf error on {path}: {message}")]
    Dwarf {
        /// The ELF file being inspected.
        path: PathBuf,
        /// Failure description from the object/DWARF reader.
        message: String,
    },

    /// The captured test application time was not an integer.
    ///
    /// Almost always a misconfigured `test_application_time_regex` or capture
    /// group index; the run cannot continue without a usable TaT.
    #[error("test application time capture {0:?} is not an integer; check the regex and group index")]
    TatCapture(String),

    /// Unrecoverable toolchain failure (HDL compile, baseline lsim/fsim).
    #[error("tool error: {0}")]
    Tool(String),

    /// Internal invariant violated; unreachable in a correct build.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl Error {
    /// Builds an [`Error::Io`] from a path and an OS error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
