//! ISA mnemonic catalog.
//!
//! The ISA language file is a plain-text list of mnemonics, one per line,
//! with `#`-prefixed comment lines. The catalog answers exactly one question:
//! does a line of assembly start with a known mnemonic? An STL targets one
//! ISA per run, so the host constructs a single [`Isa`] and threads a shared
//! handle through every assembly handler.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::common::error::{Error, Result};

/// The set of instruction mnemonics of the targeted ISA.
#[derive(Debug, Clone)]
pub struct Isa {
    mnemonics: BTreeSet<String>,
    source: PathBuf,
}

impl Isa {
    /// Loads the mnemonic set from an ISA language file.
    ///
    /// Each line is either a `#` comment or a single mnemonic token. An empty
    /// line, or a non-comment line with more than one whitespace-separated
    /// token, is a syntax error carrying the 1-based line number.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] when the file cannot be read, [`Error::IsaSyntax`] on a
    /// malformed line.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = path
            .as_ref()
            .canonicalize()
            .map_err(|e| Error::io(path.as_ref(), e))?;

        debug!("reading ISA language from file {}", source.display());
        let text = fs::read_to_string(&source).map_err(|e| Error::io(&source, e))?;

        let mut mnemonics = BTreeSet::new();

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim_end();

            if line.is_empty() {
                return Err(Error::IsaSyntax {
                    path: source,
                    line: lineno + 1,
                });
            }

            if !line.starts_with('#') && line.split_whitespace().count() > 1 {
                return Err(Error::IsaSyntax {
                    path: source,
                    line: lineno + 1,
                });
            }

            if line.starts_with('#') {
                continue;
            }

            let _ = mnemonics.insert(line.trim().to_string());
        }

        Ok(Self { mnemonics, source })
    }

    /// The ISA language file this catalog was loaded from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// All known mnemonics.
    pub fn mnemonics(&self) -> &BTreeSet<String> {
        &self.mnemonics
    }

    /// Returns true when the first whitespace-separated token of
    /// `assembly_line` is a known mnemonic.
    ///
    /// Labels, directives, comments and empty lines all answer `false`.
    pub fn is_instruction(&self, assembly_line: &str) -> bool {
        assembly_line
            .split_whitespace()
            .next()
            .is_some_and(|token| self.mnemonics.contains(token))
    }
}
