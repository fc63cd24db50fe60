//! Grammars of the fault-report sections.
//!
//! The report's `FaultList`, `StatusGroups` and `Coverage` sections each have
//! a small line-oriented grammar. The parsers here are hand-written
//! recursive descent over a character cursor; a malformed entry fails the
//! whole section parse, which is fatal to the iteration that requested it.
//!
//! FaultList entries look like:
//!
//! ```text
//! <  1> ON 1 (7.52ns) {PORT "tb.dut.u.cell.A1"} + {PORT "tb.dut.u.cell.A2"} (* "t"->INSTR=3cb3079a; *)
//!       -- 1 {PORT "tb.dut.u.cell.Z"}
//! ```
//!
//! A `--` status marks the entry as functionally equivalent to the most
//! recently parsed prime: it inherits that prime's status, bumps the prime's
//! equivalence count, and records the back-pointer.

use std::collections::BTreeMap;

use crate::common::error::{Error, Result};
use crate::fault::model::{Fault, FaultId, FaultList};

/// Known fault-site location kinds.
const LOCATION_KINDS: &[&str] = &["PORT", "FLOP", "ARRY", "WIRE", "PRIM", "VARI"];

/// Fault types accepted by the grammar.
const FAULT_TYPES: &[&str] = &["0", "1", "R", "F", "~"];

/// Character cursor shared by the section parsers.
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            let _ = self.bump();
        }
    }

    /// Consumes `c` after skipping whitespace.
    fn expect(&mut self, c: char) -> Result<()> {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            let _ = self.bump();
            Ok(())
        } else {
            Err(self.fail(&format!("expected {c:?}")))
        }
    }

    /// True (and consumed) when the next non-whitespace char is `c`.
    fn eat(&mut self, c: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            let _ = self.bump();
            true
        } else {
            false
        }
    }

    /// Next word of `[A-Za-z0-9_.~-]` characters.
    fn word(&mut self) -> Result<&'a str> {
        self.skip_whitespace();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '~' | '-'))
        {
            let _ = self.bump();
        }
        if self.pos == start {
            return Err(self.fail("expected a word"));
        }
        Ok(&self.text[start..self.pos])
    }

    /// A double-quoted string; returns the content without the quotes.
    fn quoted(&mut self) -> Result<&'a str> {
        self.expect('"')?;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '"' {
                let content = &self.text[start..self.pos];
                let _ = self.bump();
                return Ok(content);
            }
            let _ = self.bump();
        }
        Err(self.fail("unterminated string"))
    }

    /// Error carrying the line/column of the current position.
    fn fail(&self, message: &str) -> Error {
        let consumed = &self.text[..self.pos];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed.chars().rev().take_while(|&c| c != '\n').count() + 1;
        Error::Report(format!("{message} at line {line}, column {column}"))
    }
}

/// Parses a `FaultList { … }` section into an equivalence-resolved list.
///
/// # Errors
///
/// [`Error::Report`] on any malformed entry (the whole parse fails).
pub fn parse_fault_list(section: &str) -> Result<FaultList> {
    let mut cursor = Cursor::new(section);
    let mut faults = FaultList::new();

    let keyword = cursor.word()?;
    if keyword != "FaultList" {
        return Err(cursor.fail("expected FaultList"));
    }

    // Optional list name.
    cursor.skip_whitespace();
    if cursor.peek() != Some('{') {
        let _ = cursor.word()?;
    }
    cursor.expect('{')?;

    let mut prev_prime: Option<FaultId> = None;
    let mut prev_status = String::new();

    loop {
        if cursor.eat('}') {
            break;
        }
        if cursor.peek().is_none() {
            return Err(cursor.fail("unterminated FaultList section"));
        }

        // Optional fault info: "<  1>", contents discarded.
        if cursor.eat('<') {
            while let Some(c) = cursor.peek() {
                let _ = cursor.bump();
                if c == '>' {
                    break;
                }
            }
        }

        let status_token = cursor.word()?;
        let is_equivalent = status_token == "--";
        if !is_equivalent
            && !(status_token.len() == 2
                && status_token.chars().all(|c| c.is_ascii_uppercase()))
        {
            return Err(cursor.fail(&format!("invalid fault status {status_token:?}")));
        }

        let type_token = cursor.word()?;
        if !FAULT_TYPES.contains(&type_token) {
            return Err(cursor.fail(&format!("invalid fault type {type_token:?}")));
        }

        // Optional timing info: parenthesized, but not an attribute block.
        let mut timing_info = Vec::new();
        cursor.skip_whitespace();
        if cursor.peek() == Some('(') && !cursor.rest().starts_with("(*") {
            let _ = cursor.bump();
            let start = cursor.pos;
            while let Some(c) = cursor.peek() {
                if c == ')' {
                    break;
                }
                let _ = cursor.bump();
            }
            timing_info = cursor.text[start..cursor.pos]
                .split_whitespace()
                .map(str::to_string)
                .collect();
            cursor.expect(')')?;
        }

        // Fault sites: one or more `{ KIND "site" }`, '+'-joined.
        let mut fault_sites = Vec::new();
        loop {
            cursor.expect('{')?;
            let kind = cursor.word()?;
            if !LOCATION_KINDS.contains(&kind) {
                return Err(cursor.fail(&format!("invalid location kind {kind:?}")));
            }
            let site = cursor.quoted()?;
            fault_sites.push(site.to_string());
            cursor.expect('}')?;

            if !cursor.eat('+') {
                break;
            }
        }

        // Optional attributes: `(* "test"->name=value; … *)`.
        let mut fault_attributes = BTreeMap::new();
        cursor.skip_whitespace();
        if cursor.rest().starts_with("(*") {
            let _ = cursor.bump();
            let _ = cursor.bump();
            loop {
                cursor.skip_whitespace();
                if cursor.rest().starts_with("*)") {
                    let _ = cursor.bump();
                    let _ = cursor.bump();
                    break;
                }
                if cursor.peek().is_none() {
                    return Err(cursor.fail("unterminated attribute block"));
                }

                let _test_name = cursor.quoted()?;
                cursor.expect('-')?;
                cursor.expect('>')?;
                let name = cursor.word()?;
                cursor.expect('=')?;

                cursor.skip_whitespace();
                let value = if cursor.peek() == Some('"') {
                    cursor.quoted()?.trim().to_string()
                } else {
                    let start = cursor.pos;
                    while cursor.peek().is_some_and(|c| c != ';' && c != '\n') {
                        let _ = cursor.bump();
                    }
                    cursor.text[start..cursor.pos].trim().to_string()
                };
                cursor.expect(';')?;

                let _ = fault_attributes.insert(name.to_string(), value);
            }
        }

        // Equivalence resolution against the most recent prime.
        if is_equivalent {
            let prime_id = prev_prime
                .ok_or_else(|| cursor.fail("equivalent fault with no preceding prime"))?;
            let mut fault = Fault::new(prev_status.clone(), type_token);
            fault.timing_info = timing_info;
            fault.fault_sites = fault_sites;
            fault.fault_attributes = fault_attributes;
            fault.equivalent_to = Some(prime_id);

            if let Some(prime) = faults.get_mut(prime_id) {
                prime.equivalent_faults += 1;
            }
            let _ = faults.push(fault);
        } else {
            let mut fault = Fault::new(status_token, type_token);
            fault.timing_info = timing_info;
            fault.fault_sites = fault_sites;
            fault.fault_attributes = fault_attributes;

            prev_status = status_token.to_string();
            prev_prime = Some(faults.push(fault));
        }
    }

    faults.verify_equivalences()?;
    Ok(faults)
}

/// Parses a `StatusGroups { … }` section.
///
/// Each entry is `GROUP "Description" ( ST1, ST2, … );`; descriptions are
/// discarded. Returns the groups in report order.
pub fn parse_status_groups(section: &str) -> Result<Vec<(String, Vec<String>)>> {
    let mut cursor = Cursor::new(section);
    let mut groups = Vec::new();

    let keyword = cursor.word()?;
    if keyword != "StatusGroups" {
        return Err(cursor.fail("expected StatusGroups"));
    }
    cursor.expect('{')?;

    loop {
        if cursor.eat('}') {
            break;
        }
        if cursor.peek().is_none() {
            return Err(cursor.fail("unterminated StatusGroups section"));
        }

        let group = cursor.word()?.to_string();
        let _description = cursor.quoted()?;

        cursor.expect('(')?;
        let mut statuses = Vec::new();
        loop {
            let status = cursor.word()?;
            statuses.push(status.to_string());
            if !cursor.eat(',') {
                break;
            }
        }
        cursor.expect(')')?;
        cursor.expect(';')?;

        groups.push((group, statuses));
    }

    Ok(groups)
}

/// Parses a `Coverage { … }` section.
///
/// Each entry is `"name" = "body";`. Bodies have `^` rewritten to `**`, the
/// power operator the evaluator understands. Returns formulas in report
/// order.
pub fn parse_coverage(section: &str) -> Result<Vec<(String, String)>> {
    let mut cursor = Cursor::new(section);
    let mut formulas = Vec::new();

    let keyword = cursor.word()?;
    if keyword != "Coverage" {
        return Err(cursor.fail("expected Coverage"));
    }
    cursor.expect('{')?;

    loop {
        if cursor.eat('}') {
            break;
        }
        if cursor.peek().is_none() {
            return Err(cursor.fail("unterminated Coverage section"));
        }

        let name = cursor.quoted()?.trim().to_string();
        cursor.expect('=')?;
        let body = cursor.quoted()?.replace('^', "**");
        cursor.expect(';')?;

        formulas.push((name, body));
    }

    Ok(formulas)
}
