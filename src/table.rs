//! Tabular data model shared by every component.
//!
//! A [`Table`] is an ordered set of named columns over row-major cells. Cells
//! are tagged scalars so that mixed string/number/date content from scraped
//! pages and spreadsheets flows through one representation. The canonical
//! text form defined here is the single source of truth for serialization
//! and hashing: two semantically equal values with different native
//! representations (e.g. `2` the number and `"2"` the string) canonicalize
//! to the same text and therefore hash identically.

use chrono::NaiveDate;
use std::fmt;

use crate::error::{Result, TablekeeperError};

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Missing/empty cell
    Null,
    /// Free-form text
    Str(String),
    /// Numeric value
    Number(f64),
    /// Calendar date (no time component)
    Date(NaiveDate),
}

impl CellValue {
    /// Canonical text form, used for CSV serialization and checksums.
    ///
    /// - `Null` renders as the empty string.
    /// - `Str` renders verbatim.
    /// - `Number` drops a trailing `.0` for integral values, so `2.0` and
    ///   `2` serialize identically.
    /// - `Date` renders as `%Y-%m-%d`.
    pub fn canonical(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Str(s) => s.clone(),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    /// Parse a text field back into a tagged value.
    ///
    /// A field only becomes a `Number` or `Date` when its canonical rendering
    /// reproduces the input exactly. This keeps formatting-bearing strings
    /// like `"007"` or `"1.50"` as text, so identifiers survive a round trip
    /// through CSV unchanged.
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            return Self::Null;
        }
        if let Ok(n) = text.parse::<f64>() {
            let candidate = Self::Number(n);
            if candidate.canonical() == text {
                return candidate;
            }
        }
        if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            return Self::Date(d);
        }
        Self::Str(text.to_owned())
    }

    /// True for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// An ordered sequence of named columns with positionally aligned rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl Table {
    /// Create an empty table with the given column headers.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Create a table from headers and rows. Every row must match the
    /// header width.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Result<Self> {
        let width = columns.len();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(TablekeeperError::Other(format!(
                    "Row {i} has {} cells, expected {width}",
                    row.len()
                )));
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// True when the table carries no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a named column, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at (row, col); `Null` when out of bounds.
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&CellValue::Null)
    }

    /// Append a row, padding or truncating it to the column count. Scraped
    /// HTML rows are occasionally ragged; padding keeps alignment intact.
    pub fn push_row(&mut self, mut row: Vec<CellValue>) {
        row.resize(self.columns.len(), CellValue::Null);
        self.rows.push(row);
    }
}
