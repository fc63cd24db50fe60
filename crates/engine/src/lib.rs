//! STL compaction engine library.
//!
//! This crate implements an assembly-level Self-Test-Library (STL) compaction
//! engine for fault-simulation-driven verification flows:
//! 1. **Assembly:** ISA mnemonic catalog, normalized codeline model, and an
//!    undo-capable in-place editor of assembly sources with a line-number
//!    accurate candidate index.
//! 2. **Toolchain:** a shell invoker for cross-compilation, logic simulation
//!    (test application time capture) and fault simulation, with timeouts and
//!    process-group cleanup.
//! 3. **Fault analysis:** a parser for textual fault reports (fault lists with
//!    equivalence resolution, status groups, coverage formulas) and a coverage
//!    engine with a dedicated arithmetic evaluator.
//! 4. **Preprocessing:** a processor-trace parser and queryable trace table,
//!    DWARF program-counter to source-line resolution, and candidate pruning
//!    around fault-injection windows.
//! 5. **Compaction:** the A0 (single-instruction, random order) and A1xx
//!    (block-wise, Back/Forward/Random order) drivers with per-iteration CSV
//!    statistics.

/// Assembly sources: codeline model and the in-place assembly handler.
pub mod asm;
/// Pre-run archival of the starting assembly sources.
pub mod backup;
/// Compaction drivers: shared trial pipeline, A0, A1xx, and statistics.
pub mod compact;
/// Common types: crate-wide error enum and result alias.
pub mod common;
/// TOML configuration (tables, regex/duration fields, placeholder expansion).
pub mod config;
/// DWARF line-table lookup: program counter to (source file, line).
pub mod dwarf;
/// Fault model, fault-report parsing, and the coverage engine.
pub mod fault;
/// ISA mnemonic catalog.
pub mod isa;
/// Shell command execution: compilation, logic and fault simulation.
pub mod invoker;
/// Candidate pruning from fault attributes, trace windows and DWARF info.
pub mod prep;
/// Termination and reaping of leftover simulator child processes.
pub mod reap;
/// Processor trace parsing and the queryable in-memory trace table.
pub mod trace;

/// Crate-wide error type; every fallible operation returns this.
pub use crate::common::error::{Error, Result};
/// Root configuration type; deserialize with [`Config::load`].
pub use crate::config::Config;
/// In-place editor of one assembly source file.
pub use crate::asm::handler::AssemblyHandler;
/// ISA mnemonic catalog; construct once and share across handlers.
pub use crate::isa::Isa;
