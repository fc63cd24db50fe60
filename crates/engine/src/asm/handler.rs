//! In-place assembly source editing.
//!
//! One [`AssemblyHandler`] owns exactly one assembly source file. It keeps a
//! chunked index of removal candidates (instruction lines only) and applies
//! `remove`/`restore`/`save` operations while keeping every candidate's line
//! number consistent with the on-disk file:
//!
//! - removing line `k` rewrites the file without it, detaches the codeline
//!   from the candidate index, and decrements every later candidate;
//! - restoring re-inserts the most recently removed line on disk and in the
//!   index, incrementing every candidate at or after it.
//!
//! Rewrites go through a sibling temp file that is fsynced and atomically
//! renamed over the source, so readers never observe a torn file. Restores
//! are strictly LIFO; the drivers uphold that discipline.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rand::Rng;
use tracing::debug;

use crate::asm::codeline::{Codeline, CodelineRef};
use crate::common::error::{Error, Result};
use crate::isa::Isa;

/// Where a detached codeline sat in the candidate index, so that a restore
/// can put it back exactly where it was.
#[derive(Debug, Clone, Copy)]
struct Slot {
    chunk: usize,
    index: usize,
    /// The chunk became empty and was dropped when the codeline left it.
    chunk_emptied: bool,
}

/// One changelog entry: a removed codeline plus its old index position.
///
/// `slot` is `None` when the codeline was no longer in the index at removal
/// time (it had been popped by a selection with `pop = true`); a restore then
/// re-enters the line on disk only.
#[derive(Debug)]
struct RemovedLine {
    codeline: CodelineRef,
    slot: Option<Slot>,
}

/// Manages one assembly file: candidate index, in-place edits, undo log.
#[derive(Debug)]
pub struct AssemblyHandler {
    asm_file: PathBuf,
    candidates: Vec<Vec<CodelineRef>>,
    changelog: Vec<RemovedLine>,
}

impl AssemblyHandler {
    /// Reads and indexes an assembly source file.
    ///
    /// Lines are numbered from 0, whitespace-normalized (runs collapsed to a
    /// single space, ends trimmed), and classified against `isa`. Empty lines
    /// are skipped; instruction lines become candidates, partitioned into
    /// chunks of `chunksize` (clamped to at least 1).
    ///
    /// # Errors
    ///
    /// [`Error::Io`] when the source cannot be read or resolved.
    pub fn new(isa: &Isa, assembly_source: impl AsRef<Path>, chunksize: usize) -> Result<Self> {
        let asm_file = assembly_source
            .as_ref()
            .canonicalize()
            .map_err(|e| Error::io(assembly_source.as_ref(), e))?;

        debug!("reading from file {}", asm_file.display());
        let text = fs::read_to_string(&asm_file).map_err(|e| Error::io(&asm_file, e))?;

        let chunksize = chunksize.max(1);
        let mut flat: Vec<CodelineRef> = Vec::new();

        for (lineno, raw) in text.lines().enumerate() {
            let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
            if normalized.is_empty() {
                continue;
            }
            if isa.is_instruction(&normalized) {
                flat.push(Codeline::shared(lineno, normalized, true));
            }
        }

        let mut candidates = Vec::with_capacity(flat.len().div_ceil(chunksize));
        let mut it = flat.into_iter().peekable();
        while it.peek().is_some() {
            candidates.push(it.by_ref().take(chunksize).collect());
        }

        Ok(Self {
            asm_file,
            candidates,
            changelog: Vec::new(),
        })
    }

    /// Absolute path of the owned assembly source.
    pub fn asm_source(&self) -> &Path {
        &self.asm_file
    }

    /// All candidates, flattened, in chunk order.
    pub fn code(&self) -> Vec<CodelineRef> {
        self.candidates
            .iter()
            .flat_map(|chunk| chunk.iter().cloned())
            .collect()
    }

    /// The candidate chunks, in order.
    pub fn chunks(&self) -> &[Vec<CodelineRef>] {
        &self.candidates
    }

    /// Number of live candidates.
    pub fn candidate_count(&self) -> usize {
        self.candidates.iter().map(Vec::len).sum()
    }

    /// Line numbers currently recorded in the changelog, in removal order.
    pub fn changelog_lines(&self) -> Vec<usize> {
        self.changelog
            .iter()
            .map(|entry| entry.codeline.borrow().line_no)
            .collect()
    }

    /// Finds the candidate with the given line number.
    ///
    /// # Errors
    ///
    /// [`Error::CandidateNotFound`] when no live candidate has `line_no`.
    pub fn candidate(&self, line_no: usize) -> Result<CodelineRef> {
        self.candidates
            .iter()
            .flatten()
            .find(|codeline| codeline.borrow().line_no == line_no)
            .cloned()
            .ok_or(Error::CandidateNotFound(line_no))
    }

    /// Uniformly selects a random candidate: first a chunk, then a codeline
    /// within it. With `pop` the codeline leaves the index (and an emptied
    /// chunk is dropped).
    ///
    /// The two-level draw is deliberate: selection is uniform over chunks and
    /// then over members, not uniform over all codelines.
    ///
    /// # Errors
    ///
    /// [`Error::NoCandidates`] when the index is empty.
    pub fn random_candidate<R: Rng>(&mut self, rng: &mut R, pop: bool) -> Result<CodelineRef> {
        if self.candidates.is_empty() {
            return Err(Error::NoCandidates(self.asm_file.clone()));
        }

        let chunk_idx = rng.random_range(0..self.candidates.len());
        let line_idx = rng.random_range(0..self.candidates[chunk_idx].len());

        let codeline = if pop {
            let codeline = self.candidates[chunk_idx].remove(line_idx);
            if self.candidates[chunk_idx].is_empty() {
                let _ = self.candidates.remove(chunk_idx);
            }
            codeline
        } else {
            self.candidates[chunk_idx][line_idx].clone()
        };

        debug!("randomly selected {}", codeline.borrow());
        Ok(codeline)
    }

    /// Removes `codeline` from the assembly file.
    ///
    /// The source is rewritten without line `codeline.line_no` (temp file +
    /// fsync + atomic rename). The codeline is detached from the candidate
    /// index (when present, by identity) and pushed onto the changelog with
    /// its line number untouched; every candidate with a greater line number
    /// is decremented by one.
    pub fn remove(&mut self, codeline: &CodelineRef) -> Result<()> {
        let line_no = codeline.borrow().line_no;
        debug!("removing line #{} = {}", line_no, codeline.borrow().data);

        self.write_without_line(line_no)?;

        let slot = self.detach(codeline);

        for chunk in &mut self.candidates {
            for other in chunk {
                let mut other = other.borrow_mut();
                if other.line_no > line_no {
                    other.shift_down(1);
                }
            }
        }

        self.changelog.push(RemovedLine {
            codeline: codeline.clone(),
            slot,
        });
        debug!("changelog lines are now {:?}", self.changelog_lines());
        Ok(())
    }

    /// Re-enters the most recently removed codeline into the assembly file.
    ///
    /// A no-op on an empty changelog. Every candidate at or after the
    /// restored line number is incremented by one, the codeline is
    /// re-inserted at its old index position (when it had one), and the
    /// source regains the line at its recorded position — appended at the end
    /// when the file is now shorter.
    pub fn restore(&mut self) -> Result<()> {
        let Some(entry) = self.changelog.pop() else {
            debug!("changelog empty, nothing to restore");
            return Ok(());
        };

        let line_no = entry.codeline.borrow().line_no;
        debug!("restoring {}", entry.codeline.borrow());

        for chunk in &mut self.candidates {
            for other in chunk {
                // The codeline being restored is detached, but guard by
                // identity anyway: shifting it would misplace the insertion
                // point by one.
                if Rc::ptr_eq(other, &entry.codeline) {
                    continue;
                }
                let mut other = other.borrow_mut();
                if other.line_no >= line_no {
                    other.shift_up(1);
                }
            }
        }

        if let Some(slot) = entry.slot {
            self.reattach(entry.codeline.clone(), slot);
        }

        let data = entry.codeline.borrow().data.clone();
        self.write_with_line(line_no, &data)?;
        debug!("changelog lines are now {:?}", self.changelog_lines());
        Ok(())
    }

    /// Saves the current source next to the original, stem suffixed with the
    /// changelog line numbers (`-`-joined). Returns the saved path, or `None`
    /// when the changelog is empty.
    ///
    /// A suffix longer than 128 characters is replaced by a 16-hex-digit
    /// FNV-1a hash of the sequence to keep filenames bounded.
    pub fn save(&self) -> Result<Option<PathBuf>> {
        if self.changelog.is_empty() {
            debug!("no changes in changelog to be saved");
            return Ok(None);
        }

        let lines = self.changelog_lines();
        let mut suffix = lines
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("-");
        if suffix.len() > 128 {
            suffix = format!("{:016x}", fnv1a(&suffix));
        }

        let stem = self
            .asm_file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let ext = self
            .asm_file
            .extension()
            .and_then(|s| s.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();

        let target = self
            .asm_file
            .with_file_name(format!("{stem}-{suffix}{ext}"));

        let _ = fs::copy(&self.asm_file, &target).map_err(|e| Error::io(&target, e))?;
        Ok(Some(target))
    }

    /// Detaches `codeline` (by identity) from the candidate index, returning
    /// where it sat.
    fn detach(&mut self, codeline: &CodelineRef) -> Option<Slot> {
        let (chunk_idx, index) = self.candidates.iter().enumerate().find_map(|(ci, chunk)| {
            chunk
                .iter()
                .position(|c| Rc::ptr_eq(c, codeline))
                .map(|i| (ci, i))
        })?;

        let _ = self.candidates[chunk_idx].remove(index);
        let chunk_emptied = self.candidates[chunk_idx].is_empty();
        if chunk_emptied {
            let _ = self.candidates.remove(chunk_idx);
        }

        Some(Slot {
            chunk: chunk_idx,
            index,
            chunk_emptied,
        })
    }

    /// Puts a codeline back at its recorded index position.
    fn reattach(&mut self, codeline: CodelineRef, slot: Slot) {
        if slot.chunk_emptied {
            let chunk = slot.chunk.min(self.candidates.len());
            self.candidates.insert(chunk, vec![codeline]);
        } else if let Some(chunk) = self.candidates.get_mut(slot.chunk) {
            chunk.insert(slot.index.min(chunk.len()), codeline);
        } else {
            // LIFO discipline violated upstream; keep the candidate live
            // rather than losing it.
            debug_assert!(false, "restore out of order");
            self.candidates.push(vec![codeline]);
        }
    }

    /// Rewrites the source without the line at `line_no`.
    fn write_without_line(&self, line_no: usize) -> Result<()> {
        let text = fs::read_to_string(&self.asm_file).map_err(|e| Error::io(&self.asm_file, e))?;
        let mut out = String::with_capacity(text.len());

        for (lineno, line) in text.split_inclusive('\n').enumerate() {
            if lineno == line_no {
                continue;
            }
            out.push_str(line);
        }

        self.persist(&out)
    }

    /// Rewrites the source with `data` re-inserted at `line_no` (appended
    /// when the file has fewer lines).
    fn write_with_line(&self, line_no: usize, data: &str) -> Result<()> {
        let text = fs::read_to_string(&self.asm_file).map_err(|e| Error::io(&self.asm_file, e))?;
        let mut out = String::with_capacity(text.len() + data.len() + 1);

        let mut restored = false;
        for (lineno, line) in text.split_inclusive('\n').enumerate() {
            if lineno == line_no {
                out.push_str(data);
                out.push('\n');
                restored = true;
            }
            out.push_str(line);
        }
        if !restored {
            out.push_str(data);
            out.push('\n');
        }

        self.persist(&out)
    }

    /// Writes `contents` to a sibling temp file, fsyncs, and atomically
    /// renames it over the source.
    fn persist(&self, contents: &str) -> Result<()> {
        let dir = self
            .asm_file
            .parent()
            .ok_or_else(|| Error::Invariant(format!("{} has no parent", self.asm_file.display())))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
        tmp.write_all(contents.as_bytes())
            .map_err(|e| Error::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| Error::io(tmp.path(), e))?;
        let _ = tmp
            .persist(&self.asm_file)
            .map_err(|e| Error::io(&self.asm_file, e.error))?;
        Ok(())
    }
}

/// FNV-1a over a string, for bounded save-file suffixes.
fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in s.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
