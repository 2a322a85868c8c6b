//! The sheet surface boundary.
//!
//! Builders never touch a worksheet. A finished [`TableGrid`] is handed to a
//! [`SheetSurface`] through [`apply`], which performs every call in a fixed
//! order. [`RecordingSurface`] keeps the calls in memory for inspection.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::chart::ChartPlan;
use crate::error::Result;
use crate::format::{GuardedCondition, StyleDescriptor};
use crate::grid::{cell_ref, column_name, CellContent, ColNum, RowNum, RowSpan, StyleId, TableGrid};

/// Surface-side handle of a registered style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct StyleTag(pub usize);

/// Operations a worksheet backend provides to the engine.
pub trait SheetSurface {
    /// Registers a style; the same descriptor always yields the same tag.
    fn register_style(&mut self, style: &StyleDescriptor) -> Result<StyleTag>;

    fn write_cell(
        &mut self,
        row: RowNum,
        col: ColNum,
        content: &CellContent,
        style: Option<StyleTag>,
    ) -> Result<()>;

    fn merge_cells(
        &mut self,
        rows: RowSpan,
        first_col: ColNum,
        last_col: ColNum,
        text: &str,
        style: Option<StyleTag>,
    ) -> Result<()>;

    fn set_column_hidden(&mut self, col: ColNum) -> Result<()>;

    fn set_column_width(&mut self, col: ColNum, width: f64) -> Result<()>;

    fn add_conditional_format(
        &mut self,
        rows: RowSpan,
        col: ColNum,
        condition: &GuardedCondition,
        style: StyleTag,
        stop_if_true: bool,
    ) -> Result<()>;

    /// Places outline buttons on summary rows above (or below) their groups.
    fn set_outline_summary_above(&mut self, above: bool) -> Result<()>;

    fn group_rows(&mut self, rows: RowSpan, depth: usize, collapsed: bool) -> Result<()>;

    fn add_data_validation(&mut self, rows: RowSpan, col: ColNum, allowed: &[String]) -> Result<()>;

    fn add_note(&mut self, row: RowNum, col: ColNum, text: &str) -> Result<()>;

    fn freeze_panes(&mut self, row: RowNum, col: ColNum) -> Result<()>;

    fn autofilter(
        &mut self,
        first_row: RowNum,
        first_col: ColNum,
        last_row: RowNum,
        last_col: ColNum,
    ) -> Result<()>;

    fn add_chart(&mut self, chart: &ChartPlan) -> Result<()>;
}

/// Applies a complete grid to a surface.
///
/// Order: styles, cells, merges, column metadata, conditional formats,
/// validations, outline groups (outer to inner), notes, panes, filter.
pub fn apply<S: SheetSurface + ?Sized>(grid: &TableGrid, surface: &mut S) -> Result<()> {
    let tags = grid
        .styles
        .iter()
        .map(|style| surface.register_style(style))
        .collect::<Result<Vec<_>>>()?;
    let tag = |id: StyleId| tags.get(id.0).copied();

    for cell in &grid.cells {
        surface.write_cell(cell.row, cell.col, &cell.content, cell.style.and_then(tag))?;
    }
    for merge in &grid.merges {
        surface.merge_cells(
            merge.rows,
            merge.first_col,
            merge.last_col,
            &merge.text,
            merge.style.and_then(tag),
        )?;
    }
    for col in &grid.hidden_columns {
        surface.set_column_hidden(*col)?;
    }
    for (col, width) in &grid.column_widths {
        surface.set_column_width(*col, *width)?;
    }
    for cf in &grid.conditional_formats {
        if let Some(style) = tag(cf.style) {
            surface.add_conditional_format(cf.rows, cf.col, &cf.condition, style, cf.stop_if_true)?;
        }
    }
    for validation in &grid.validations {
        surface.add_data_validation(validation.rows, validation.col, &validation.allowed)?;
    }
    if !grid.groups.is_empty() {
        surface.set_outline_summary_above(grid.summary_above)?;
    }
    for group in &grid.groups {
        surface.group_rows(group.rows, group.depth, group.collapsed)?;
    }
    for note in &grid.notes {
        surface.add_note(note.row, note.col, &note.text)?;
    }
    if let Some((row, col)) = grid.freeze {
        surface.freeze_panes(row, col)?;
    }
    if let Some((first_row, first_col, last_row, last_col)) = grid.autofilter {
        surface.autofilter(first_row, first_col, last_row, last_col)?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Recording Surface
// ─────────────────────────────────────────────────────────────────────────────

/// One call received by a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SurfaceCall {
    RegisterStyle { tag: StyleTag, style: StyleDescriptor },
    WriteCell { row: RowNum, col: ColNum, content: CellContent, style: Option<StyleTag> },
    MergeCells { rows: RowSpan, first_col: ColNum, last_col: ColNum, text: String },
    HideColumn { col: ColNum },
    ColumnWidth { col: ColNum, width: f64 },
    ConditionalFormat { rows: RowSpan, col: ColNum, condition: GuardedCondition, style: StyleTag },
    OutlineSummaryAbove { above: bool },
    GroupRows { rows: RowSpan, depth: usize, collapsed: bool },
    DataValidation { rows: RowSpan, col: ColNum, allowed: Vec<String> },
    Note { row: RowNum, col: ColNum, text: String },
    FreezePanes { row: RowNum, col: ColNum },
    Autofilter { first_row: RowNum, first_col: ColNum, last_row: RowNum, last_col: ColNum },
    Chart { title: String, series: usize },
}

impl fmt::Display for SurfaceCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegisterStyle { tag, .. } => write!(f, "style #{}", tag.0),
            Self::WriteCell { row, col, content, style } => {
                write!(f, "{:<8}", cell_ref(*row, *col))?;
                match content {
                    CellContent::Formula(text) => f.write_str(text)?,
                    CellContent::Value(value) => write!(f, "{value:?}")?,
                }
                if let Some(tag) = style {
                    write!(f, "  [style #{}]", tag.0)?;
                }
                Ok(())
            }
            Self::MergeCells { rows, first_col, last_col, text } => write!(
                f,
                "merge   {}:{} \"{text}\"",
                cell_ref(rows.first, *first_col),
                cell_ref(rows.last, *last_col)
            ),
            Self::HideColumn { col } => write!(f, "hide    column {}", column_name(*col)),
            Self::ColumnWidth { col, width } => {
                write!(f, "width   column {} = {width}", column_name(*col))
            }
            Self::ConditionalFormat { rows, col, condition, style } => write!(
                f,
                "format  {} when {condition} [style #{}]",
                rows.a1(*col),
                style.0
            ),
            Self::OutlineSummaryAbove { above } => {
                write!(f, "outline summary {}", if *above { "above" } else { "below" })
            }
            Self::GroupRows { rows, depth, collapsed } => write!(
                f,
                "group   rows {}-{} depth {depth}{}",
                rows.first + 1,
                rows.last + 1,
                if *collapsed { " (collapsed)" } else { "" }
            ),
            Self::DataValidation { rows, col, allowed } => {
                write!(f, "list    {} [{}]", rows.a1(*col), allowed.join(", "))
            }
            Self::Note { row, col, text } => write!(f, "note    {} \"{text}\"", cell_ref(*row, *col)),
            Self::FreezePanes { row, col } => write!(f, "freeze  {}", cell_ref(*row, *col)),
            Self::Autofilter { first_row, first_col, last_row, last_col } => write!(
                f,
                "filter  {}:{}",
                cell_ref(*first_row, *first_col),
                cell_ref(*last_row, *last_col)
            ),
            Self::Chart { title, series } => write!(f, "chart   \"{title}\" ({series} series)"),
        }
    }
}

/// A surface that records every call.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub calls: Vec<SurfaceCall>,
    tags: HashMap<StyleDescriptor, StyleTag>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell writes only.
    pub fn writes(&self) -> impl Iterator<Item = &SurfaceCall> {
        self.calls
            .iter()
            .filter(|c| matches!(c, SurfaceCall::WriteCell { .. }))
    }
}

impl SheetSurface for RecordingSurface {
    fn register_style(&mut self, style: &StyleDescriptor) -> Result<StyleTag> {
        if let Some(tag) = self.tags.get(style) {
            return Ok(*tag);
        }
        let tag = StyleTag(self.tags.len());
        self.tags.insert(style.clone(), tag);
        self.calls.push(SurfaceCall::RegisterStyle {
            tag,
            style: style.clone(),
        });
        Ok(tag)
    }

    fn write_cell(
        &mut self,
        row: RowNum,
        col: ColNum,
        content: &CellContent,
        style: Option<StyleTag>,
    ) -> Result<()> {
        self.calls.push(SurfaceCall::WriteCell {
            row,
            col,
            content: content.clone(),
            style,
        });
        Ok(())
    }

    fn merge_cells(
        &mut self,
        rows: RowSpan,
        first_col: ColNum,
        last_col: ColNum,
        text: &str,
        _style: Option<StyleTag>,
    ) -> Result<()> {
        self.calls.push(SurfaceCall::MergeCells {
            rows,
            first_col,
            last_col,
            text: text.to_string(),
        });
        Ok(())
    }

    fn set_column_hidden(&mut self, col: ColNum) -> Result<()> {
        self.calls.push(SurfaceCall::HideColumn { col });
        Ok(())
    }

    fn set_column_width(&mut self, col: ColNum, width: f64) -> Result<()> {
        self.calls.push(SurfaceCall::ColumnWidth { col, width });
        Ok(())
    }

    fn add_conditional_format(
        &mut self,
        rows: RowSpan,
        col: ColNum,
        condition: &GuardedCondition,
        style: StyleTag,
        _stop_if_true: bool,
    ) -> Result<()> {
        self.calls.push(SurfaceCall::ConditionalFormat {
            rows,
            col,
            condition: condition.clone(),
            style,
        });
        Ok(())
    }

    fn set_outline_summary_above(&mut self, above: bool) -> Result<()> {
        self.calls.push(SurfaceCall::OutlineSummaryAbove { above });
        Ok(())
    }

    fn group_rows(&mut self, rows: RowSpan, depth: usize, collapsed: bool) -> Result<()> {
        self.calls.push(SurfaceCall::GroupRows {
            rows,
            depth,
            collapsed,
        });
        Ok(())
    }

    fn add_data_validation(&mut self, rows: RowSpan, col: ColNum, allowed: &[String]) -> Result<()> {
        self.calls.push(SurfaceCall::DataValidation {
            rows,
            col,
            allowed: allowed.to_vec(),
        });
        Ok(())
    }

    fn add_note(&mut self, row: RowNum, col: ColNum, text: &str) -> Result<()> {
        self.calls.push(SurfaceCall::Note {
            row,
            col,
            text: text.to_string(),
        });
        Ok(())
    }

    fn freeze_panes(&mut self, row: RowNum, col: ColNum) -> Result<()> {
        self.calls.push(SurfaceCall::FreezePanes { row, col });
        Ok(())
    }

    fn autofilter(
        &mut self,
        first_row: RowNum,
        first_col: ColNum,
        last_row: RowNum,
        last_col: ColNum,
    ) -> Result<()> {
        self.calls.push(SurfaceCall::Autofilter {
            first_row,
            first_col,
            last_row,
            last_col,
        });
        Ok(())
    }

    fn add_chart(&mut self, chart: &ChartPlan) -> Result<()> {
        self.calls.push(SurfaceCall::Chart {
            title: chart.title.clone(),
            series: chart.series.len(),
        });
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
