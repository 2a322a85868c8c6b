//! Flat table layout and the options shared with collapsible tables.
//!
//! A flat table is laid out top to bottom as:
//!
//! ```text
//! [title]          merged across every column (optional)
//! [total]          when the total row is at the top
//! header
//! data rows...     one per dataset row, in order
//! [total]          when the total row is at the bottom
//! ```
//!
//! The builder only produces a [`TableGrid`]; nothing touches a sheet until
//! the complete grid exists.

use log::debug;

use crate::aggregate::{self, ColumnRefs};
use crate::error::{ReportError, Result};
use crate::format::FormatRegistry;
use crate::grid::{
    to_col, to_row, CellContent, ColNum, ConditionalFormatInstruction, GridBuilder, RowNum,
    RowSpan, TableGrid, TableLayout, ValidationInstruction,
};
use crate::rules::{
    aggregate_for, check_rule_columns, hyperlink_formula, AggregateOp, AggregateRule,
    AggregateTarget, ColumnRule, ColumnStyle, LinkRule, RowKind, TotalPosition, ValidationRule,
};
use crate::types::{CellValue, Dataset, Row};

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

/// A merged title row above a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title {
    pub text: String,
    /// `MergeCenter`, `MergeLeft`, `MergeRight` or any registered format.
    pub format: String,
}

/// Rules and presentation settings common to flat and collapsible tables.
#[derive(Debug, Clone)]
pub struct TableOptions {
    /// Top-left cell of the table.
    pub origin: (RowNum, ColNum),
    pub title: Option<Title>,
    pub header_format: String,
    pub column_rules: Vec<ColumnRule>,
    pub aggregates: Vec<AggregateRule>,
    pub total_row: Option<TotalPosition>,
    /// Literal values written into the total row.
    pub total_values: Vec<(String, CellValue)>,
    pub links: Vec<LinkRule>,
    pub validations: Vec<ValidationRule>,
    pub hidden_columns: Vec<String>,
    pub column_widths: Vec<(String, f64)>,
    pub header_notes: Vec<(String, String)>,
    pub freeze_header: bool,
    pub autofilter: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            origin: (0, 0),
            title: None,
            header_format: "BoldWrapped".to_string(),
            column_rules: Vec::new(),
            aggregates: Vec::new(),
            total_row: None,
            total_values: Vec::new(),
            links: Vec::new(),
            validations: Vec::new(),
            hidden_columns: Vec::new(),
            column_widths: Vec::new(),
            header_notes: Vec::new(),
            freeze_header: false,
            autofilter: false,
        }
    }
}

impl TableOptions {
    /// Fails with `ColumnNotFound` if any rule names a column not in `header`.
    pub(crate) fn check_columns(&self, header: &[String], context: &str) -> Result<()> {
        let exists = |name: &str| header.iter().any(|h| h == name);
        let rules = self
            .column_rules
            .iter()
            .flat_map(|r| r.columns.iter().map(String::as_str));
        check_rule_columns(rules, exists, context)?;
        for rule in &self.aggregates {
            check_rule_columns(rule.referenced_columns()?, exists, context)?;
        }
        let singles = self
            .links
            .iter()
            .map(|l| l.column.as_str())
            .chain(self.validations.iter().map(|v| v.column.as_str()))
            .chain(self.hidden_columns.iter().map(String::as_str))
            .chain(self.column_widths.iter().map(|(c, _)| c.as_str()))
            .chain(self.header_notes.iter().map(|(c, _)| c.as_str()))
            .chain(self.total_values.iter().map(|(c, _)| c.as_str()));
        check_rule_columns(singles, exists, context)?;

        if let Some(rule) = self.validations.iter().find(|v| v.allowed.is_empty()) {
            return Err(ReportError::invalid_rule(
                &rule.column,
                "validation needs at least one allowed value",
            ));
        }
        let has_total_rules = self
            .aggregates
            .iter()
            .any(|a| a.target == AggregateTarget::Total)
            || !self.total_values.is_empty();
        if has_total_rules && self.total_row.is_none() {
            return Err(ReportError::invalid_rule(
                context,
                "total row rules given but the table has no total row",
            ));
        }
        Ok(())
    }
}

/// Chainable setters shared by every table kind.
pub trait ConfigureTable: Sized {
    fn options_mut(&mut self) -> &mut TableOptions;

    #[must_use]
    fn at(mut self, row: RowNum, col: ColNum) -> Self {
        self.options_mut().origin = (row, col);
        self
    }

    /// Adds a title row merged across the table, centred.
    #[must_use]
    fn title(self, text: impl Into<String>) -> Self {
        self.title_with(text, "MergeCenter")
    }

    #[must_use]
    fn title_with(mut self, text: impl Into<String>, format: impl Into<String>) -> Self {
        self.options_mut().title = Some(Title {
            text: text.into(),
            format: format.into(),
        });
        self
    }

    #[must_use]
    fn header_format(mut self, format: impl Into<String>) -> Self {
        self.options_mut().header_format = format.into();
        self
    }

    #[must_use]
    fn format(mut self, rule: ColumnRule) -> Self {
        self.options_mut().column_rules.push(rule);
        self
    }

    #[must_use]
    fn aggregate(mut self, rule: AggregateRule) -> Self {
        self.options_mut().aggregates.push(rule);
        self
    }

    #[must_use]
    fn total_row(mut self, position: TotalPosition) -> Self {
        self.options_mut().total_row = Some(position);
        self
    }

    #[must_use]
    fn total_value(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.options_mut()
            .total_values
            .push((column.into(), value.into()));
        self
    }

    #[must_use]
    fn link(mut self, rule: LinkRule) -> Self {
        self.options_mut().links.push(rule);
        self
    }

    #[must_use]
    fn validate(mut self, rule: ValidationRule) -> Self {
        self.options_mut().validations.push(rule);
        self
    }

    #[must_use]
    fn hide(mut self, column: impl Into<String>) -> Self {
        self.options_mut().hidden_columns.push(column.into());
        self
    }

    #[must_use]
    fn width(mut self, column: impl Into<String>, width: f64) -> Self {
        self.options_mut().column_widths.push((column.into(), width));
        self
    }

    #[must_use]
    fn note(mut self, column: impl Into<String>, text: impl Into<String>) -> Self {
        self.options_mut()
            .header_notes
            .push((column.into(), text.into()));
        self
    }

    #[must_use]
    fn freeze_header(mut self) -> Self {
        self.options_mut().freeze_header = true;
        self
    }

    #[must_use]
    fn autofilter(mut self) -> Self {
        self.options_mut().autofilter = true;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame (title, header, total row)
// ─────────────────────────────────────────────────────────────────────────────

/// Row positions of a table's fixed parts.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    pub header_row: RowNum,
    pub first_col: ColNum,
    pub last_col: ColNum,
    pub body_start: RowNum,
    pub body_rows: RowNum,
    pub total_row: Option<RowNum>,
}

impl Frame {
    /// Lays out the fixed rows around a body of `body_rows` rows.
    pub(crate) fn plan(options: &TableOptions, columns: usize, body_rows: usize) -> Result<Self> {
        let (mut row, first_col) = options.origin;
        let last_col = to_col(usize::from(first_col) + columns.saturating_sub(1))?;
        if options.title.is_some() {
            row += 1;
        }
        let mut total_row = None;
        if options.total_row == Some(TotalPosition::Top) {
            total_row = Some(row);
            row += 1;
        }
        let header_row = row;
        let body_start = header_row + 1;
        let body_rows = to_row(body_rows)?;
        if options.total_row == Some(TotalPosition::Bottom) {
            total_row = Some(body_start + body_rows);
        }
        Ok(Self {
            header_row,
            first_col,
            last_col,
            body_start,
            body_rows,
            total_row,
        })
    }

    pub(crate) fn col(&self, index: usize) -> Result<ColNum> {
        to_col(usize::from(self.first_col) + index)
    }

    pub(crate) fn body(&self) -> Option<RowSpan> {
        (self.body_rows > 0).then(|| RowSpan::new(self.body_start, self.body_start + self.body_rows - 1))
    }

    /// Writes title, header, notes and column metadata.
    pub(crate) fn write_chrome(
        &self,
        builder: &mut GridBuilder,
        registry: &FormatRegistry,
        options: &TableOptions,
        header: &[String],
    ) -> Result<()> {
        if let Some(title) = &options.title {
            let style = builder.intern(registry.resolve(&title.format)?);
            builder.merge(
                RowSpan::single(options.origin.0),
                self.first_col,
                self.last_col,
                &title.text,
                Some(style),
            )?;
        }

        let header_style = builder.intern(registry.resolve(&options.header_format)?);
        for (i, name) in header.iter().enumerate() {
            let col = self.col(i)?;
            builder.write(
                self.header_row,
                col,
                CellValue::from(name.as_str()).into(),
                Some(header_style),
            )?;
        }

        let position = |name: &str| -> Result<ColNum> {
            let index = header.iter().position(|h| h == name).unwrap_or_default();
            self.col(index)
        };
        for (column, text) in &options.header_notes {
            builder.note(self.header_row, position(column)?, text);
        }
        for column in &options.hidden_columns {
            builder.hide_column(position(column)?);
        }
        for (column, width) in &options.column_widths {
            builder.column_width(position(column)?, *width);
        }
        if options.freeze_header {
            builder.freeze(self.header_row + 1, 0);
        }
        if options.autofilter {
            let last = self.body().map_or(self.header_row, |b| b.last);
            builder.autofilter(RowSpan::new(self.header_row, last), self.first_col, self.last_col);
        }
        Ok(())
    }

    /// Writes the total row: aggregates, literal values, blanks elsewhere.
    ///
    /// `refs` maps a column index to the cells its total aggregates over.
    pub(crate) fn write_totals<F>(
        &self,
        builder: &mut GridBuilder,
        registry: &FormatRegistry,
        options: &TableOptions,
        header: &[String],
        mut refs: F,
    ) -> Result<()>
    where
        F: FnMut(usize, ColNum) -> ColumnRefs,
    {
        let Some(row) = self.total_row else {
            return Ok(());
        };
        let index_of = |name: &str| {
            header
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| ReportError::column_not_found(name, "table header"))
        };

        for (i, name) in header.iter().enumerate() {
            let col = self.col(i)?;
            let total_style =
                ColumnStyle::select(&options.column_rules, registry, name, None, RowKind::Total)?;
            let style_source = if total_style.is_unset() {
                ColumnStyle::select(&options.column_rules, registry, name, None, RowKind::Data)?
            } else {
                total_style
            };

            let (content, style) =
                if let Some(rule) = aggregate_for(&options.aggregates, name, &AggregateTarget::Total) {
                    let formula = match &rule.op {
                        AggregateOp::Function(function) => {
                            aggregate::compute(*function, &refs(i, col), rule.ignore_hidden)?
                        }
                        AggregateOp::Custom { template, functions } => {
                            aggregate::compute_custom(template, functions, rule.ignore_hidden, |c| {
                                let index = index_of(c)?;
                                Ok(refs(index, self.col(index)?))
                            })?
                        }
                    };
                    (CellContent::Formula(formula), style_source.fallback(registry)?)
                } else {
                    let value = options
                        .total_values
                        .iter()
                        .rev()
                        .find(|(c, _)| c == name)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default();
                    let style = style_source.resolve(registry, &value)?;
                    (CellContent::Value(value), style)
                };
            let style = style.map(|s| builder.intern(s));
            builder.write(row, col, content, style)?;
        }
        Ok(())
    }
}

/// Content of one data cell: the value itself, or a `HYPERLINK` formula.
pub(crate) fn data_content(
    value: &CellValue,
    link: Option<&LinkRule>,
    row: Row<'_>,
) -> (CellContent, bool) {
    match link.and_then(|rule| rule.source.target(value, row)) {
        Some(target) if !value.is_empty() => (
            CellContent::Formula(hyperlink_formula(&target, &value.to_string())),
            true,
        ),
        _ => (CellContent::Value(value.clone()), false),
    }
}

/// Writes one data cell with its static style, falling back to `Link` for links.
#[allow(clippy::too_many_arguments)]
pub(crate) fn write_data_cell(
    builder: &mut GridBuilder,
    registry: &FormatRegistry,
    row: RowNum,
    col: ColNum,
    value: &CellValue,
    style: &ColumnStyle,
    link: Option<&LinkRule>,
    source: Row<'_>,
) -> Result<()> {
    let (content, linked) = data_content(value, link, source);
    let mut resolved = style.resolve(registry, value)?;
    if linked && resolved.is_none() {
        resolved = Some(registry.resolve("Link")?);
    }
    let style = resolved.map(|s| builder.intern(s));
    builder.write(row, col, content, style)
}

/// Emits conditional highlight formats for one column block.
pub(crate) fn write_highlights(
    builder: &mut GridBuilder,
    style: &ColumnStyle,
    col: ColNum,
    runs: &[RowSpan],
) {
    for run in runs {
        for highlight in &style.highlights {
            let id = builder.intern(&highlight.style);
            builder.conditional_format(ConditionalFormatInstruction {
                rows: *run,
                col,
                condition: highlight.condition.clone(),
                style: id,
                stop_if_true: true,
            });
        }
    }
}

/// Emits dropdown validations for one column block.
pub(crate) fn write_validation(
    builder: &mut GridBuilder,
    rule: &ValidationRule,
    col: ColNum,
    runs: &[RowSpan],
) {
    for run in runs {
        builder.validation(ValidationInstruction {
            rows: *run,
            col,
            allowed: rule.allowed.clone(),
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Flat Table
// ─────────────────────────────────────────────────────────────────────────────

/// A single-level table over one dataset.
#[derive(Debug, Clone)]
pub struct FlatTable {
    pub name: String,
    pub dataset: Dataset,
    pub options: TableOptions,
    /// Text written in place of data rows when the dataset has none.
    pub empty_placeholder: Option<String>,
}

impl ConfigureTable for FlatTable {
    fn options_mut(&mut self) -> &mut TableOptions {
        &mut self.options
    }
}

impl FlatTable {
    pub fn new(name: impl Into<String>, dataset: Dataset) -> Self {
        Self {
            name: name.into(),
            dataset,
            options: TableOptions::default(),
            empty_placeholder: None,
        }
    }

    /// Writes `text` (e.g. "No Results") when the dataset has no rows.
    #[must_use]
    pub fn placeholder(mut self, text: impl Into<String>) -> Self {
        self.empty_placeholder = Some(text.into());
        self
    }

    /// Lays out the table.
    pub fn build(&self, registry: &FormatRegistry) -> Result<TableGrid> {
        let context = format!("table '{}'", self.name);
        if self.dataset.column_count() == 0 {
            return Err(ReportError::EmptyDataset(context));
        }
        let header: Vec<String> = self.dataset.column_names().map(str::to_string).collect();
        self.options.check_columns(&header, &context)?;
        if let Some(rule) = self
            .options
            .aggregates
            .iter()
            .find(|a| matches!(a.target, AggregateTarget::Level(_)))
        {
            return Err(ReportError::invalid_rule(
                rule.columns.join(", "),
                "flat tables have no levels to aggregate at",
            ));
        }

        let rows = self.dataset.row_count();
        let placeholder_row = rows == 0 && self.empty_placeholder.is_some();
        let frame = Frame::plan(&self.options, header.len(), rows.max(usize::from(placeholder_row)))?;
        let data_rows = (rows > 0).then(|| frame.body()).flatten();

        let mut builder = GridBuilder::new(&self.name);
        frame.write_chrome(&mut builder, registry, &self.options, &header)?;

        for (i, name) in header.iter().enumerate() {
            let col = frame.col(i)?;
            let style = ColumnStyle::select(
                &self.options.column_rules,
                registry,
                name,
                None,
                RowKind::Data,
            )?;
            let link = self.options.links.iter().rev().find(|l| l.applies(name, None));
            for r in 0..rows {
                let row = frame.body_start + to_row(r)?;
                let value = self.dataset.value(r, i);
                write_data_cell(
                    &mut builder,
                    registry,
                    row,
                    col,
                    value,
                    &style,
                    link,
                    self.dataset.row(r),
                )?;
            }
            if let Some(span) = data_rows {
                write_highlights(&mut builder, &style, col, &[span]);
                if let Some(rule) = self.options.validations.iter().rev().find(|v| v.applies(name, None)) {
                    write_validation(&mut builder, rule, col, &[span]);
                }
            }
        }

        if placeholder_row {
            if let Some(text) = &self.empty_placeholder {
                builder.write(
                    frame.body_start,
                    frame.first_col,
                    CellValue::from(text.as_str()).into(),
                    None,
                )?;
            }
        }

        frame.write_totals(&mut builder, registry, &self.options, &header, |_, col| {
            data_rows.map_or(ColumnRefs { col, runs: Vec::new() }, |span| ColumnRefs::span(col, span))
        })?;

        builder.summary_above(true);
        builder.layout(TableLayout {
            header_row: frame.header_row,
            first_col: frame.first_col,
            columns: header,
            data_rows,
            total_row: frame.total_row,
            grouped: false,
        });
        let grid = builder.finish();
        debug!(
            "built table '{}': {} cells over {} rows",
            self.name,
            grid.cells.len(),
            grid.row_count()
        );
        Ok(grid)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
