//! Candidate pruning from fault-injection windows.
//!
//! After the golden fault simulation, every prime fault that carries the
//! configured attributes (typically an injection time and a program counter)
//! pins a point in the execution trace. Querying the trace table around each
//! point yields a short window of program counters — the instruction
//! sequence leading to the injection — and DWARF resolves those program
//! counters back to assembly source lines. The union of the resolved lines
//! becomes the search space the drivers iterate over; everything outside the
//! windows is dropped from the candidate list before the main loop starts.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::asm::codeline::CodelineRef;
use crate::common::error::{Error, Result};
use crate::config::PreprocessingConfig;
use crate::dwarf;
use crate::fault::model::FaultList;
use crate::trace::{trace_parser_for, TraceDb};

/// Trace-window length: the matched row plus three predecessors.
const WINDOW_HISTORY: usize = 4;

/// Prunes the compaction search space using the golden-run artifacts.
#[derive(Debug)]
pub struct Preprocessor {
    trace_db: TraceDb,
    /// Fault-attribute name → trace column name.
    attr_to_column: BTreeMap<String, String>,
    elf_file: PathBuf,
}

impl Preprocessor {
    /// Parses the processor trace and builds the trace table.
    ///
    /// # Errors
    ///
    /// [`Error::Trace`] for an unknown processor grammar or a malformed
    /// trace; [`Error::Io`] when the trace cannot be read.
    pub fn new(settings: &PreprocessingConfig) -> Result<Self> {
        let parser = trace_parser_for(&settings.processor_name)?;
        let text = fs::read_to_string(&settings.processor_trace)
            .map_err(|e| Error::io(&settings.processor_trace, e))?;
        let rows = parser.parse(&text)?;
        let trace_db = TraceDb::from_rows(&rows)?;

        Ok(Self {
            trace_db,
            attr_to_column: settings.zoix_to_trace.clone(),
            elf_file: settings.elf_file.clone(),
        })
    }

    /// Direct access to the underlying trace table.
    pub fn trace_db(&self) -> &TraceDb {
        &self.trace_db
    }

    /// Computes the relevant `(asm-id, 0-based line)` set from the fault
    /// list.
    ///
    /// Faults lacking any mapped attribute are skipped; duplicate attribute
    /// pairs and duplicate PC windows are queried once; PCs that resolve to
    /// no line or to a file outside the handler set are skipped with a
    /// warning; duplicate lines keep their first occurrence.
    pub fn relevant_lines(
        &self,
        fault_list: &FaultList,
        path_to_id: &BTreeMap<String, usize>,
    ) -> Result<BTreeSet<(usize, usize)>> {
        // 1. Gather the distinct attribute pairs of the fault list.
        let mut attribute_sets: Vec<BTreeMap<String, String>> = Vec::new();
        for fault in fault_list {
            if fault.fault_attributes.is_empty() {
                continue;
            }

            let mut entry = BTreeMap::new();
            let mut complete = true;
            for (attr, column) in &self.attr_to_column {
                match fault.attribute(attr) {
                    Some(value) => {
                        let _ = entry.insert(column.clone(), value.to_string());
                    }
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if complete && !attribute_sets.contains(&entry) {
                attribute_sets.push(entry);
            }
        }

        // 2. One PC window per attribute pair.
        let mut windows: Vec<Vec<String>> = Vec::new();
        for entry in &attribute_sets {
            match self.trace_db.query("PC", entry, WINDOW_HISTORY, false) {
                Ok(rows) => {
                    let window: Vec<String> =
                        rows.into_iter().map(|mut row| row.remove(0)).collect();
                    if !windows.contains(&window) {
                        windows.push(window);
                    }
                }
                Err(Error::NoRowFound(query) | Error::AmbiguousQuery(query)) => {
                    debug!("skipping unusable trace query ({query})");
                }
                Err(e) => return Err(e),
            }
        }

        // 3. Resolve every windowed PC to an assembly line.
        let mut relevant: BTreeSet<(usize, usize)> = BTreeSet::new();
        let mut warned_files: BTreeSet<String> = BTreeSet::new();
        let mut warned_pcs: BTreeSet<String> = BTreeSet::new();

        for pc in windows.into_iter().flatten() {
            let Some((asm_file, line)) = dwarf::addr2line(&self.elf_file, &pc)? else {
                if warned_pcs.insert(pc.clone()) {
                    warn!(
                        "program counter {pc} not found in {}",
                        self.elf_file.display()
                    );
                }
                continue;
            };

            let Some(asm_id) = path_to_id.get(&asm_file) else {
                if warned_files.insert(asm_file.clone()) {
                    warn!(
                        "PC value {pc} maps to line {line} of {asm_file} which isn't in asm sources; skipping"
                    );
                }
                continue;
            };

            // DWARF lines are 1-based, codelines 0-based.
            let line0 = (line as usize).saturating_sub(1);
            if !relevant.insert((*asm_id, line0)) {
                debug!("line {line} of {asm_file} already marked relevant");
            }
        }

        Ok(relevant)
    }

    /// Prunes a flat candidate list in place, retaining only the codelines
    /// inside the fault-injection windows.
    pub fn prune_candidates(
        &self,
        candidates: &mut Vec<(usize, CodelineRef)>,
        fault_list: &FaultList,
        path_to_id: &BTreeMap<String, usize>,
    ) -> Result<()> {
        let relevant = self.relevant_lines(fault_list, path_to_id)?;

        candidates.retain(|(asm_id, codeline)| {
            relevant.contains(&(*asm_id, codeline.borrow().line_no))
        });
        Ok(())
    }

    /// Prunes and re-chunks the candidate list for block-wise compaction.
    ///
    /// The pruned codelines are grouped per source file and partitioned into
    /// blocks of `chunksize`.
    pub fn prune_chunked(
        &self,
        candidates: &mut Vec<(usize, CodelineRef)>,
        fault_list: &FaultList,
        path_to_id: &BTreeMap<String, usize>,
        chunksize: usize,
    ) -> Result<Vec<(usize, Vec<CodelineRef>)>> {
        self.prune_candidates(candidates, fault_list, path_to_id)?;
        Ok(chunk_by_source(candidates, chunksize))
    }
}

/// Groups candidates by source id and partitions each group into chunks.
pub fn chunk_by_source(
    candidates: &[(usize, CodelineRef)],
    chunksize: usize,
) -> Vec<(usize, Vec<CodelineRef>)> {
    let chunksize = chunksize.max(1);
    let Some(max_id) = candidates.iter().map(|(asm_id, _)| *asm_id).max() else {
        return Vec::new();
    };

    let mut grouped: Vec<Vec<CodelineRef>> = vec![Vec::new(); max_id + 1];
    for (asm_id, codeline) in candidates {
        grouped[*asm_id].push(codeline.clone());
    }

    let mut chunked = Vec::new();
    for (asm_id, group) in grouped.into_iter().enumerate() {
        let mut it = group.into_iter().peekable();
        while it.peek().is_some() {
            chunked.push((asm_id, it.by_ref().take(chunksize).collect()));
        }
    }
    chunked
}
