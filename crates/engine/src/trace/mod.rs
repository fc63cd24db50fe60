//! Processor trace parsing and the queryable trace table.

/// In-memory single-table view of a parsed trace.
pub mod db;
/// Per-processor trace grammars producing CSV rows.
pub mod parser;

pub use db::TraceDb;
pub use parser::{trace_parser_for, TraceParser};
