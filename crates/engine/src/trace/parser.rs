//! Per-processor trace grammars.
//!
//! A trace parser converts the textual execution trace of one processor into
//! a rectangular CSV table: the first produced row is the header
//! (comma-joined field names), every following row one trace entry, with
//! embedded-comma cells double-quoted. Parsers are looked up by processor
//! name through [`trace_parser_for`].
//!
//! The reference grammar is the CV32E40P tracer format:
//!
//! ```text
//! Time          Cycle      PC       Instr    Decoded instruction Register and memory contents
//! 142  67 0000015c c622 c.swsp  x8,12(x2) x2:0x00002000 x8:0x00000000 PA:0x0000200c
//! ```
//!
//! The decoded-instruction cell is whitespace-collapsed and quoted; the
//! register-and-memory cell (every trailing `name:value` token) is
//! `", "`-joined and quoted, `""` when absent.

use tracing::debug;

use crate::common::error::{Error, Result};

/// Converts one processor's textual trace into CSV rows.
pub trait TraceParser {
    /// Parses the whole trace; row 0 is the header.
    fn parse(&self, text: &str) -> Result<Vec<String>>;
}

/// Returns the trace parser registered for `processor_name`.
///
/// # Errors
///
/// [`Error::Trace`] when no grammar exists for the processor.
pub fn trace_parser_for(processor_name: &str) -> Result<Box<dyn TraceParser>> {
    match processor_name {
        "CV32E40P" => Ok(Box::new(Cv32e40p)),
        other => Err(Error::Trace(format!(
            "no trace grammar registered for processor {other:?}"
        ))),
    }
}

/// Trace grammar of the CV32E40P core tracer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cv32e40p;

impl Cv32e40p {
    /// Canonical column set of this tracer format.
    const HEADER: &'static str =
        "Time,Cycle,PC,Instr,Decoded instruction,Register and memory contents";

    /// Parses one entry line into a CSV row.
    fn entry(line: &str, lineno: usize) -> Result<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 5 {
            return Err(Error::Trace(format!(
                "trace line {lineno}: expected at least 5 fields, got {}",
                tokens.len()
            )));
        }

        let (fixed, rest) = tokens.split_at(4);
        let time = fixed[0];
        let cycle = fixed[1];
        let pc = fixed[2];
        let instr = fixed[3];

        if !cycle.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::Trace(format!(
                "trace line {lineno}: cycle {cycle:?} is not a number"
            )));
        }
        if !pc.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::Trace(format!(
                "trace line {lineno}: PC {pc:?} is not a hex address"
            )));
        }

        // Register/memory content tokens are `name:value` pairs; everything
        // before the first such token belongs to the decoded instruction.
        let boundary = rest
            .iter()
            .position(|token| token.contains(':'))
            .unwrap_or(rest.len());
        let (decoded, reg_and_mem) = rest.split_at(boundary);

        if decoded.is_empty() {
            return Err(Error::Trace(format!(
                "trace line {lineno}: missing decoded instruction"
            )));
        }

        let decoded_cell = format!("\"{}\"", decoded.join(" "));
        let reg_cell = if reg_and_mem.is_empty() {
            "\"\"".to_string()
        } else {
            format!("\"{}\"", reg_and_mem.join(", "))
        };

        Ok(format!("{time},{cycle},{pc},{instr},{decoded_cell},{reg_cell}"))
    }
}

impl TraceParser for Cv32e40p {
    fn parse(&self, text: &str) -> Result<Vec<String>> {
        let mut rows = Vec::new();
        let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

        let Some((_, header)) = lines.next() else {
            return Err(Error::Trace("empty trace".into()));
        };
        if !header.trim_start().starts_with("Time") || !header.contains("PC") {
            return Err(Error::Trace(format!(
                "unrecognized trace header {header:?}"
            )));
        }
        rows.push(Self::HEADER.to_string());

        for (lineno, line) in lines {
            rows.push(Self::entry(line, lineno + 1)?);
        }

        debug!("parsed {} trace entries", rows.len().saturating_sub(1));
        Ok(rows)
    }
}
