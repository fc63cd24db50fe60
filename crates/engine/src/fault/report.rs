//! The textual fault report.
//!
//! A fault report is a text document of named, brace-balanced sections. The
//! engine depends on three of them — `FaultList`, `StatusGroups` and
//! `Coverage` — extracted with a linear brace-depth scan and parsed with the
//! grammars in [`crate::fault::grammar`]. The report file is rewritten by the
//! fault simulator on every run, so the driver re-loads it after each
//! successful fault simulation.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::common::error::{Error, Result};
use crate::fault::grammar;
use crate::fault::model::FaultList;

/// Parsed view of one fault report file.
#[derive(Debug, Clone)]
pub struct TxtFaultReport {
    path: PathBuf,
    fault_report: String,
    /// The equivalence-resolved fault list, when the section is present.
    pub fault_list: Option<FaultList>,
    /// Status groups in report order, when the section is present.
    pub status_groups: Option<Vec<(String, Vec<String>)>>,
    /// Coverage formulas in report order, when the section is present.
    pub coverage: Option<Vec<(String, String)>>,
}

impl TxtFaultReport {
    /// Reads and parses a fault report file.
    ///
    /// Absent sections parse to `None`; present but malformed sections fail
    /// the load.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] when the file cannot be read; [`Error::Report`] on a
    /// malformed section.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let fault_report = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;

        let mut report = Self {
            path,
            fault_report,
            fault_list: None,
            status_groups: None,
            coverage: None,
        };

        report.fault_list = report
            .extract("FaultList")
            .map(|section| grammar::parse_fault_list(&section))
            .transpose()?;
        report.status_groups = report
            .extract("StatusGroups")
            .map(|section| grammar::parse_status_groups(&section))
            .transpose()?;
        report.coverage = report
            .extract("Coverage")
            .map(|section| grammar::parse_coverage(&section))
            .transpose()?;

        Ok(report)
    }

    /// The report file this view was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The raw report text.
    pub fn text(&self) -> &str {
        &self.fault_report
    }

    /// Extracts a named brace-delimited section, outer braces included.
    ///
    /// A linear scan skips blank lines and starts collecting when `section`
    /// and `{` co-occur on a line; collection ends when the running brace
    /// depth returns to zero. Returns `None` when the section is absent.
    pub fn extract(&self, section: &str) -> Option<String> {
        let mut extracted: Vec<&str> = Vec::new();
        let mut section_found = false;
        let mut depth: i64 = 0;

        for line in self.fault_report.lines() {
            if line.is_empty() {
                continue;
            }

            if !section_found && line.contains(section) && line.contains('{') {
                debug!("found section {section}: {line:?}");
                section_found = true;
            }

            if !section_found {
                continue;
            }

            if line.contains('{') {
                depth += 1;
            }
            if line.contains('}') {
                depth -= 1;
            }

            extracted.push(line);

            if depth == 0 {
                break;
            }
        }

        if !section_found {
            debug!("requested section {section:?} not found");
            return None;
        }

        Some(extracted.join("\n"))
    }
}
