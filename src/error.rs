//! Error types for table construction and rendering.
//!
//! Every builder fails fast with a [`ReportError`] before any cell reaches a
//! sheet surface, so a failed table never leaves partial output behind.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::KeyTuple;

/// Result alias used throughout the library.
pub type Result<T, E = ReportError> = std::result::Result<T, E>;

/// Why a key tuple has no partner across two adjacent levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanReason {
    /// A non-leaf key tuple has no rows at the next level.
    NoChildren,
    /// A row's key prefix does not exist at the parent level.
    NoParent,
}

impl fmt::Display for OrphanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoChildren => f.write_str("has no rows at the next level"),
            Self::NoParent => f.write_str("has no matching row at the parent level"),
        }
    }
}

/// Errors raised while building or rendering a report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("unknown format '{0}'")]
    UnknownFormat(String),

    #[error("unsupported aggregate function '{0}'")]
    UnsupportedAggregate(String),

    #[error("column '{column}' not found in {context}")]
    ColumnNotFound { column: String, context: String },

    #[error("dataset for {0} has no columns")]
    EmptyDataset(String),

    #[error("dataset column '{column}' has {actual} rows, expected {expected}")]
    RaggedDataset {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("dataset column '{0}' appears more than once")]
    DuplicateColumn(String),

    #[error("key {key} at level '{level}' {reason}")]
    OrphanKey {
        level: String,
        key: KeyTuple,
        reason: OrphanReason,
    },

    #[error("row with key {key} at level '{level}' matches {matches} parent rows")]
    UnmatchedChild {
        level: String,
        key: KeyTuple,
        matches: usize,
    },

    #[error("cell ({row}, {col}) is written twice")]
    DuplicateCellWrite { row: u32, col: u16 },

    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    #[error("invalid rule for {target}: {reason}")]
    InvalidRule { target: String, reason: String },

    #[error("invalid condition '{text}': {reason}")]
    InvalidCondition { text: String, reason: String },

    #[error("report definition error: {0}")]
    Definition(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

impl ReportError {
    pub(crate) fn column_not_found(column: &str, context: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            column: column.to_string(),
            context: context.into(),
        }
    }

    pub(crate) fn invalid_rule(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CellValue;

    #[test]
    fn orphan_key_message_names_level_and_key() {
        let err = ReportError::OrphanKey {
            level: "Team".to_string(),
            key: KeyTuple(vec![CellValue::from("Marketing")]),
            reason: OrphanReason::NoParent,
        };
        assert_eq!(
            err.to_string(),
            "key (Marketing) at level 'Team' has no matching row at the parent level"
        );
    }

    #[test]
    fn column_not_found_message_has_context() {
        let err = ReportError::column_not_found("Profit", "table 'sales'");
        assert_eq!(err.to_string(), "column 'Profit' not found in table 'sales'");
    }
}
