//! Queryable in-memory trace table.
//!
//! The parsed trace (CSV rows, header first) is ingested into a single
//! relational table. Row identity is the 1-based arrival index; the one
//! supported query shape is an equality conjunction returning, per match, a
//! window of up to `history` rows ending at the match, in original order —
//! the instruction sequence leading up to a fault-injection point.

use std::collections::BTreeMap;

use tracing::debug;

use crate::common::error::{Error, Result};

/// Single-table relational view of one processor trace.
#[derive(Debug, Clone)]
pub struct TraceDb {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TraceDb {
    /// Builds the table from parser output (row 0 is the header).
    ///
    /// Data cells are read back through a CSV reader so quoted cells with
    /// embedded commas survive the round trip.
    ///
    /// # Errors
    ///
    /// [`Error::Trace`] on an empty input or a row with a mismatched cell
    /// count.
    pub fn from_rows(rows: &[String]) -> Result<Self> {
        let Some((header, body)) = rows.split_first() else {
            return Err(Error::Trace("cannot build a trace table without a header".into()));
        };

        let columns: Vec<String> = header.split(',').map(str::to_string).collect();

        let joined = body.join("\n");
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(joined.as_bytes());

        let mut data = Vec::with_capacity(body.len());
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|e| Error::Trace(format!("row {}: {e}", index + 1)))?;
            if record.len() != columns.len() {
                return Err(Error::Trace(format!(
                    "row {}: expected {} cells, got {}",
                    index + 1,
                    columns.len(),
                    record.len()
                )));
            }
            data.push(record.iter().map(str::to_string).collect());
        }

        debug!("trace table created with {} rows", data.len());
        Ok(Self {
            columns,
            rows: data,
        })
    }

    /// Column names, in table order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Windowed equality query.
    ///
    /// Finds every row whose columns equal all `conditions` values. For each
    /// match at (0-based) index `r` the result gains the `select` values of
    /// rows `r-history+1 ..= r` (clipped at the start), ascending. `select`
    /// may be a column name or `*` for all columns.
    ///
    /// # Errors
    ///
    /// [`Error::Trace`] for an unknown column, [`Error::NoRowFound`] when
    /// nothing matches, [`Error::AmbiguousQuery`] on several matches without
    /// `allow_multiple`.
    pub fn query(
        &self,
        select: &str,
        conditions: &BTreeMap<String, String>,
        history: usize,
        allow_multiple: bool,
    ) -> Result<Vec<Vec<String>>> {
        let selected: Option<usize> = if select == "*" {
            None
        } else {
            Some(self.column_index(select)?)
        };

        let mut condition_indices = Vec::with_capacity(conditions.len());
        for (column, value) in conditions {
            condition_indices.push((self.column_index(column)?, value));
        }

        let matches: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                condition_indices
                    .iter()
                    .all(|(index, value)| &row[*index] == *value)
            })
            .map(|(index, _)| index)
            .collect();

        if matches.is_empty() {
            return Err(Error::NoRowFound(describe(conditions)));
        }
        if matches.len() > 1 && !allow_multiple {
            return Err(Error::AmbiguousQuery(describe(conditions)));
        }

        let mut result = Vec::new();
        for matched in matches {
            let start = (matched + 1).saturating_sub(history);
            for row in &self.rows[start..=matched] {
                match selected {
                    Some(index) => result.push(vec![row[index].clone()]),
                    None => result.push(row.clone()),
                }
            }
        }

        Ok(result)
    }

    fn column_index(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|name| name == column)
            .ok_or_else(|| Error::Trace(format!("unknown trace column {column:?}")))
    }
}

/// Renders a condition map as `k=v, k2=v2` for error messages.
fn describe(conditions: &BTreeMap<String, String>) -> String {
    conditions
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}
