//! Common types: cell values, datasets and hierarchy levels.

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Cell Values
// ─────────────────────────────────────────────────────────────────────────────

/// A typed scalar held by one dataset cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Empty cell.
    #[default]
    Empty,
    /// Boolean value.
    Bool(bool),
    /// Numeric value.
    Number(f64),
    /// Calendar date.
    Date(NaiveDate),
    /// String value.
    Text(String),
}

impl CellValue {
    /// Returns the numeric value if this is a number.
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string value if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Parses a raw text field (CSV cell) into the narrowest matching type.
    ///
    /// Empty text becomes [`CellValue::Empty`]; `true`/`false` become booleans;
    /// numbers and ISO dates (`YYYY-MM-DD`) are recognised; anything else is text.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Self::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Self::Bool(false);
        }
        if let Ok(n) = trimmed.replace(',', "").parse::<f64>() {
            if n.is_finite() {
                return Self::Number(n);
            }
        }
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Self::Date(d);
        }
        Self::Text(raw.to_string())
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Key Tuples
// ─────────────────────────────────────────────────────────────────────────────

/// The values of a level's key columns for one row.
///
/// Numbers compare by bit pattern so tuples can be hashed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeyTuple(pub Vec<CellValue>);

impl KeyTuple {
    /// Returns the first `len` values as a new tuple.
    pub fn prefix(&self, len: usize) -> Self {
        Self(self.0[..len.min(self.0.len())].to_vec())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for KeyTuple {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(&other.0)
                .all(|(a, b)| match (a, b) {
                    (CellValue::Number(x), CellValue::Number(y)) => x.to_bits() == y.to_bits(),
                    _ => a == b,
                })
    }
}

impl Eq for KeyTuple {}

impl Hash for KeyTuple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for value in &self.0 {
            std::mem::discriminant(value).hash(state);
            match value {
                CellValue::Empty => {}
                CellValue::Bool(b) => b.hash(state),
                CellValue::Number(n) => n.to_bits().hash(state),
                CellValue::Date(d) => d.hash(state),
                CellValue::Text(s) => s.hash(state),
            }
        }
    }
}

impl fmt::Display for KeyTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Datasets
// ─────────────────────────────────────────────────────────────────────────────

/// One named column of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<CellValue>,
}

impl Column {
    pub fn new<V: Into<CellValue>>(name: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// An ordered set of named, positionally aligned columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<Column>,
    rows: usize,
}

impl Dataset {
    /// Creates a dataset, checking that names are unique and lengths agree.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let rows = columns.first().map_or(0, |c| c.values.len());
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(ReportError::DuplicateColumn(column.name.clone()));
            }
            if column.values.len() != rows {
                return Err(ReportError::RaggedDataset {
                    column: column.name.clone(),
                    expected: rows,
                    actual: column.values.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    /// Creates a dataset from a header and row-major values.
    pub fn from_rows(header: &[&str], rows: Vec<Vec<CellValue>>) -> Result<Self> {
        let mut columns: Vec<Column> = header
            .iter()
            .map(|name| Column {
                name: (*name).to_string(),
                values: Vec::with_capacity(rows.len()),
            })
            .collect();
        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(ReportError::RaggedDataset {
                    column: format!("row {index}"),
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.values.push(value);
            }
        }
        Self::new(columns)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub const fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Returns the value at `row` in column `col`.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of bounds.
    pub fn value(&self, row: usize, col: usize) -> &CellValue {
        &self.columns[col].values[row]
    }

    /// Borrows one row as a name-addressable view.
    pub fn row(&self, index: usize) -> Row<'_> {
        Row {
            dataset: self,
            index,
        }
    }

    /// Collects the key tuple of `row` over the given column indices.
    pub fn key(&self, row: usize, key_columns: &[usize]) -> KeyTuple {
        KeyTuple(
            key_columns
                .iter()
                .map(|&col| self.value(row, col).clone())
                .collect(),
        )
    }
}

/// A borrowed view of one dataset row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    dataset: &'a Dataset,
    index: usize,
}

impl<'a> Row<'a> {
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Returns the value in the named column, if the column exists.
    pub fn get(&self, column: &str) -> Option<&'a CellValue> {
        self.dataset
            .column_index(column)
            .map(|col| self.dataset.value(self.index, col))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Levels
// ─────────────────────────────────────────────────────────────────────────────

/// One tier of a hierarchy: a name, its key columns and its rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    pub name: String,
    pub key_columns: Vec<String>,
    pub dataset: Dataset,
}

impl Level {
    pub fn new(name: impl Into<String>, key_columns: Vec<String>, dataset: Dataset) -> Self {
        Self {
            name: name.into(),
            key_columns,
            dataset,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
