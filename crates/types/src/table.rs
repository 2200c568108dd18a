//! Opaque fragment result tables.

use crate::DependencyId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Collected results keyed by dependency id, one table per respondent.
///
/// Insertion order is the order the dependency ids were declared in.
pub type DependencyResults = IndexMap<DependencyId, Vec<Table>>;

/// Result table produced by executing one fragment.
///
/// The ordering core never looks inside a table; it only moves tables
/// between respondents and the fragments that consume them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<i64>>,
}

impl Table {
    /// Create an empty table with the given column names.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row, builder style.
    pub fn with_row(mut self, row: Vec<i64>) -> Self {
        self.push_row(row);
        self
    }

    /// Append a row.
    pub fn push_row(&mut self, row: Vec<i64>) {
        debug_assert_eq!(
            row.len(),
            self.columns.len(),
            "Row width does not match column count"
        );
        self.rows.push(row);
    }

    /// Column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Row data.
    pub fn rows(&self) -> &[Vec<i64>] {
        &self.rows
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
