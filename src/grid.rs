//! The cell grid handed to a sheet surface, plus A1 reference helpers.
//!
//! A [`TableGrid`] is the complete output of one table build: cell writes,
//! merges, outline groups, conditional formats, validations and column
//! metadata. [`GridBuilder`] assembles it and rejects a second write to any
//! position.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{ReportError, Result};
use crate::format::{GuardedCondition, StyleDescriptor};
use crate::types::CellValue;

/// Zero-based row index.
pub type RowNum = u32;
/// Zero-based column index.
pub type ColNum = u16;

/// Excel's last column index (XFD).
pub const MAX_COL: ColNum = 16_383;

// ─────────────────────────────────────────────────────────────────────────────
// A1 References
// ─────────────────────────────────────────────────────────────────────────────

/// Converts a zero-based column index to its letters (`0` → `A`, `27` → `AB`).
pub fn column_name(col: ColNum) -> String {
    let mut n = u32::from(col) + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + u8::try_from(rem).unwrap_or(0)));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// A1 reference of one cell (`(2, 1)` → `B3`).
pub fn cell_ref(row: RowNum, col: ColNum) -> String {
    format!("{}{}", column_name(col), row + 1)
}

/// Converts a `usize` offset to a column index, checking Excel's limit.
pub fn to_col(value: usize) -> Result<ColNum> {
    ColNum::try_from(value)
        .ok()
        .filter(|c| *c <= MAX_COL)
        .ok_or_else(|| ReportError::invalid_rule("layout", format!("column {value} exceeds XFD")))
}

/// Converts a `usize` offset to a row index.
pub fn to_row(value: usize) -> Result<RowNum> {
    RowNum::try_from(value)
        .map_err(|_| ReportError::invalid_rule("layout", format!("row {value} exceeds u32")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Spans
// ─────────────────────────────────────────────────────────────────────────────

/// An inclusive range of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RowSpan {
    pub first: RowNum,
    pub last: RowNum,
}

impl RowSpan {
    pub const fn new(first: RowNum, last: RowNum) -> Self {
        Self { first, last }
    }

    pub const fn single(row: RowNum) -> Self {
        Self {
            first: row,
            last: row,
        }
    }

    pub const fn len(&self) -> u32 {
        self.last - self.first + 1
    }

    pub const fn contains(&self, row: RowNum) -> bool {
        row >= self.first && row <= self.last
    }

    /// Returns `[first+1, last]`, or `None` for a single-row span.
    pub const fn without_first(&self) -> Option<Self> {
        if self.last > self.first {
            Some(Self::new(self.first + 1, self.last))
        } else {
            None
        }
    }

    /// Returns `[first, last-1]`, or `None` for a single-row span.
    pub const fn without_last(&self) -> Option<Self> {
        if self.last > self.first {
            Some(Self::new(self.first, self.last - 1))
        } else {
            None
        }
    }

    /// Compresses rows into maximal contiguous spans, in ascending order.
    pub fn runs(rows: impl IntoIterator<Item = RowNum>) -> Vec<Self> {
        let mut sorted: Vec<RowNum> = rows.into_iter().collect();
        sorted.sort_unstable();
        sorted.dedup();
        let mut runs: Vec<Self> = Vec::new();
        for row in sorted {
            match runs.last_mut() {
                Some(run) if run.last + 1 == row => run.last = row,
                _ => runs.push(Self::single(row)),
            }
        }
        runs
    }

    /// A1 reference of this span in one column (`B3:B5`, or `B3` for one row).
    pub fn a1(&self, col: ColNum) -> String {
        if self.first == self.last {
            cell_ref(self.first, col)
        } else {
            format!("{}:{}", cell_ref(self.first, col), cell_ref(self.last, col))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Grid Contents
// ─────────────────────────────────────────────────────────────────────────────

/// Index into a grid's interned style table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct StyleId(pub usize);

/// What a cell receives: a literal value or formula text (with leading `=`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellContent {
    Value(CellValue),
    Formula(String),
}

impl CellContent {
    pub fn formula(&self) -> Option<&str> {
        match self {
            Self::Formula(f) => Some(f),
            Self::Value(_) => None,
        }
    }

    pub fn value(&self) -> Option<&CellValue> {
        match self {
            Self::Value(v) => Some(v),
            Self::Formula(_) => None,
        }
    }
}

impl From<CellValue> for CellContent {
    fn from(value: CellValue) -> Self {
        Self::Value(value)
    }
}

/// One cell write: the engine's atomic output unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellWrite {
    pub row: RowNum,
    pub col: ColNum,
    pub content: CellContent,
    pub style: Option<StyleId>,
}

/// An outline group over a block of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GroupingInstruction {
    pub rows: RowSpan,
    pub depth: usize,
    pub collapsed: bool,
}

/// A merged block carrying one value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeInstruction {
    pub rows: RowSpan,
    pub first_col: ColNum,
    pub last_col: ColNum,
    pub text: String,
    pub style: Option<StyleId>,
}

/// A spreadsheet-native conditional format over one column block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionalFormatInstruction {
    pub rows: RowSpan,
    pub col: ColNum,
    pub condition: GuardedCondition,
    pub style: StyleId,
    pub stop_if_true: bool,
}

/// A dropdown list constraint over one column block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationInstruction {
    pub rows: RowSpan,
    pub col: ColNum,
    pub allowed: Vec<String>,
}

/// A cell comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteInstruction {
    pub row: RowNum,
    pub col: ColNum,
    pub text: String,
}

/// Where a flat table's parts landed, for charts that reference it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TableLayout {
    pub header_row: RowNum,
    pub first_col: ColNum,
    pub columns: Vec<String>,
    pub data_rows: Option<RowSpan>,
    pub total_row: Option<RowNum>,
    /// Data rows mix summary rows with leaf rows.
    pub grouped: bool,
}

impl TableLayout {
    /// Absolute column index of a named column.
    pub fn column(&self, name: &str) -> Option<ColNum> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| ColNum::try_from(i).ok())
            .map(|i| self.first_col + i)
    }
}

/// The complete output of one table build.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TableGrid {
    pub name: String,
    pub styles: Vec<StyleDescriptor>,
    pub cells: Vec<CellWrite>,
    pub merges: Vec<MergeInstruction>,
    pub groups: Vec<GroupingInstruction>,
    pub conditional_formats: Vec<ConditionalFormatInstruction>,
    pub validations: Vec<ValidationInstruction>,
    pub notes: Vec<NoteInstruction>,
    pub hidden_columns: Vec<ColNum>,
    pub column_widths: Vec<(ColNum, f64)>,
    pub freeze: Option<(RowNum, ColNum)>,
    pub autofilter: Option<(RowNum, ColNum, RowNum, ColNum)>,
    pub summary_above: bool,
    pub layout: TableLayout,
}

impl TableGrid {
    /// Returns the write at `(row, col)`, if any.
    pub fn cell(&self, row: RowNum, col: ColNum) -> Option<&CellWrite> {
        self.cells.iter().find(|c| c.row == row && c.col == col)
    }

    /// Resolves a write's style.
    pub fn style(&self, id: StyleId) -> Option<&StyleDescriptor> {
        self.styles.get(id.0)
    }

    /// Number of distinct rows receiving cell writes.
    pub fn row_count(&self) -> usize {
        self.cells.iter().map(|c| c.row).collect::<HashSet<_>>().len()
    }

    /// Number of distinct columns receiving cell writes.
    pub fn column_count(&self) -> usize {
        self.cells.iter().map(|c| c.col).collect::<HashSet<_>>().len()
    }

    /// Last row touched by a write or merge.
    pub fn last_row(&self) -> Option<RowNum> {
        let cells = self.cells.iter().map(|c| c.row);
        let merges = self.merges.iter().map(|m| m.rows.last);
        cells.chain(merges).max()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Grid Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Accumulates a [`TableGrid`], interning styles and guarding positions.
#[derive(Debug, Default)]
pub struct GridBuilder {
    grid: TableGrid,
    occupied: HashSet<(RowNum, ColNum)>,
    style_index: HashMap<StyleDescriptor, StyleId>,
}

impl GridBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            grid: TableGrid {
                name: name.into(),
                ..TableGrid::default()
            },
            ..Self::default()
        }
    }

    /// Returns the id of `style`, adding it to the style table on first use.
    pub fn intern(&mut self, style: &StyleDescriptor) -> StyleId {
        if let Some(id) = self.style_index.get(style) {
            return *id;
        }
        let id = StyleId(self.grid.styles.len());
        self.grid.styles.push(style.clone());
        self.style_index.insert(style.clone(), id);
        id
    }

    /// Writes one cell.
    pub fn write(
        &mut self,
        row: RowNum,
        col: ColNum,
        content: CellContent,
        style: Option<StyleId>,
    ) -> Result<()> {
        self.claim(row, col)?;
        self.grid.cells.push(CellWrite {
            row,
            col,
            content,
            style,
        });
        Ok(())
    }

    /// Merges a block and writes `text` into it.
    pub fn merge(
        &mut self,
        rows: RowSpan,
        first_col: ColNum,
        last_col: ColNum,
        text: impl Into<String>,
        style: Option<StyleId>,
    ) -> Result<()> {
        for row in rows.first..=rows.last {
            for col in first_col..=last_col {
                self.claim(row, col)?;
            }
        }
        self.grid.merges.push(MergeInstruction {
            rows,
            first_col,
            last_col,
            text: text.into(),
            style,
        });
        Ok(())
    }

    pub fn group(&mut self, instruction: GroupingInstruction) {
        self.grid.groups.push(instruction);
    }

    pub fn conditional_format(&mut self, instruction: ConditionalFormatInstruction) {
        self.grid.conditional_formats.push(instruction);
    }

    pub fn validation(&mut self, instruction: ValidationInstruction) {
        self.grid.validations.push(instruction);
    }

    pub fn note(&mut self, row: RowNum, col: ColNum, text: impl Into<String>) {
        self.grid.notes.push(NoteInstruction {
            row,
            col,
            text: text.into(),
        });
    }

    pub fn hide_column(&mut self, col: ColNum) {
        if !self.grid.hidden_columns.contains(&col) {
            self.grid.hidden_columns.push(col);
        }
    }

    pub fn column_width(&mut self, col: ColNum, width: f64) {
        self.grid.column_widths.push((col, width));
    }

    pub fn freeze(&mut self, row: RowNum, col: ColNum) {
        self.grid.freeze = Some((row, col));
    }

    pub fn autofilter(&mut self, rows: RowSpan, first_col: ColNum, last_col: ColNum) {
        self.grid.autofilter = Some((rows.first, first_col, rows.last, last_col));
    }

    pub fn summary_above(&mut self, above: bool) {
        self.grid.summary_above = above;
    }

    pub fn layout(&mut self, layout: TableLayout) {
        self.grid.layout = layout;
    }

    pub fn finish(self) -> TableGrid {
        self.grid
    }

    fn claim(&mut self, row: RowNum, col: ColNum) -> Result<()> {
        if self.occupied.insert((row, col)) {
            Ok(())
        } else {
            Err(ReportError::DuplicateCellWrite { row, col })
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
