//! `rust_xlsxwriter` implementation of the sheet surface.
//!
//! Provides:
//! - [`XlsxSurface`]: one worksheet driven through [`SheetSurface`]
//! - [`WorkbookWriter`]: collects finished worksheets and saves the file

use std::collections::HashMap;
use std::path::Path;

use chrono::Datelike;
use log::{debug, warn};
use rust_xlsxwriter::{
    Chart, ChartFont, ChartFormat, ChartLine, ChartMarker, ChartMarkerType, ChartSolidFill,
    ChartType, Color, ConditionalFormatFormula, DataValidation, ExcelDateTime, Format, FormatAlign,
    FormatBorder, FormatUnderline, Note, Workbook, Worksheet,
};

use crate::chart::{CellRange, ChartKind, ChartPlan, MarkerKind};
use crate::error::{ReportError, Result};
use crate::format::{GuardedCondition, HorizontalAlign, NumFormat, StyleDescriptor};
use crate::grid::{cell_ref, CellContent, ColNum, RowNum, RowSpan};
use crate::surface::{SheetSurface, StyleTag};
use crate::types::CellValue;

const DEFAULT_DATE_FORMAT: &str = "yyyy-mm-dd";

// ─────────────────────────────────────────────────────────────────────────────
// Formats
// ─────────────────────────────────────────────────────────────────────────────

/// Converts a style descriptor into an xlsx cell format.
pub fn to_format(style: &StyleDescriptor) -> Format {
    let mut format = Format::new();
    if style.bold {
        format = format.set_bold();
    }
    if style.italic {
        format = format.set_italic();
    }
    if style.underline {
        format = format.set_underline(FormatUnderline::Single);
    }
    if style.text_wrap {
        format = format.set_text_wrap();
    }
    if style.border {
        format = format.set_border(FormatBorder::Thin);
    }
    if let Some(align) = style.align {
        format = format.set_align(match align {
            HorizontalAlign::Left => FormatAlign::Left,
            HorizontalAlign::Center => FormatAlign::Center,
            HorizontalAlign::Right => FormatAlign::Right,
        });
    }
    match &style.num_format {
        Some(NumFormat::Custom(code)) => format = format.set_num_format(code),
        Some(NumFormat::Builtin(index)) => format = format.set_num_format_index(*index),
        None => {}
    }
    if let Some(rgb) = style.font_color {
        format = format.set_font_color(Color::RGB(rgb));
    }
    if let Some(rgb) = style.bg_color {
        format = format.set_background_color(Color::RGB(rgb));
    }
    format
}

fn excel_date(value: chrono::NaiveDate) -> Result<ExcelDateTime> {
    let out_of_range = || ReportError::invalid_rule(value.to_string(), "date outside Excel's range");
    let year = u16::try_from(value.year()).map_err(|_| out_of_range())?;
    let month = u8::try_from(value.month()).map_err(|_| out_of_range())?;
    let day = u8::try_from(value.day()).map_err(|_| out_of_range())?;
    Ok(ExcelDateTime::from_ymd(year, month, day)?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Surface
// ─────────────────────────────────────────────────────────────────────────────

/// A worksheet receiving grid instructions.
pub struct XlsxSurface {
    name: String,
    worksheet: Worksheet,
    styles: Vec<StyleDescriptor>,
    formats: Vec<Format>,
    tags: HashMap<StyleDescriptor, StyleTag>,
}

impl XlsxSurface {
    /// Creates an empty worksheet with the given tab name.
    pub fn new(name: &str) -> Result<Self> {
        let mut worksheet = Worksheet::new();
        worksheet.set_name(name)?;
        // rust_xlsxwriter 0.92 adds the `_xlfn.` prefix to future functions automatically.
        Ok(Self {
            name: name.to_string(),
            worksheet,
            styles: Vec::new(),
            formats: Vec::new(),
            tags: HashMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn into_worksheet(self) -> Worksheet {
        self.worksheet
    }

    fn format(&self, tag: Option<StyleTag>) -> Option<&Format> {
        tag.and_then(|t| self.formats.get(t.0))
    }

    /// Format for a date cell: the cell's style with a date code if it has none.
    fn date_format(&self, tag: Option<StyleTag>) -> Format {
        let style = tag
            .and_then(|t| self.styles.get(t.0))
            .cloned()
            .unwrap_or_default();
        if style.num_format.is_some() {
            to_format(&style)
        } else {
            to_format(&style.num_format(DEFAULT_DATE_FORMAT))
        }
    }

    fn write_value(
        &mut self,
        row: RowNum,
        col: ColNum,
        value: &CellValue,
        style: Option<StyleTag>,
    ) -> Result<()> {
        let format = self.format(style).cloned();
        let ws = &mut self.worksheet;
        match (value, format) {
            (CellValue::Empty, Some(format)) => {
                ws.write_blank(row, col, &format)?;
            }
            (CellValue::Empty, None) => {}
            (CellValue::Bool(b), Some(format)) => {
                ws.write_boolean_with_format(row, col, *b, &format)?;
            }
            (CellValue::Bool(b), None) => {
                ws.write_boolean(row, col, *b)?;
            }
            (CellValue::Number(n), Some(format)) => {
                ws.write_number_with_format(row, col, *n, &format)?;
            }
            (CellValue::Number(n), None) => {
                ws.write_number(row, col, *n)?;
            }
            (CellValue::Text(s), Some(format)) => {
                ws.write_string_with_format(row, col, s, &format)?;
            }
            (CellValue::Text(s), None) => {
                ws.write_string(row, col, s)?;
            }
            (CellValue::Date(d), _) => {
                let date = excel_date(*d)?;
                let format = self.date_format(style);
                self.worksheet
                    .write_datetime_with_format(row, col, &date, &format)?;
            }
        }
        Ok(())
    }
}

fn range_tuple(range: &CellRange) -> (&str, RowNum, ColNum, RowNum, ColNum) {
    (
        range.sheet.as_str(),
        range.first_row,
        range.first_col,
        range.last_row,
        range.last_col,
    )
}

const fn chart_type(kind: ChartKind) -> ChartType {
    match kind {
        ChartKind::Area => ChartType::Area,
        ChartKind::Bar => ChartType::Bar,
        ChartKind::Column => ChartType::Column,
        ChartKind::Line => ChartType::Line,
        ChartKind::Pie => ChartType::Pie,
        ChartKind::Doughnut => ChartType::Doughnut,
        ChartKind::Scatter => ChartType::Scatter,
        ChartKind::Radar => ChartType::Radar,
    }
}

fn build_chart(plan: &ChartPlan) -> Chart {
    let mut chart = Chart::new(chart_type(plan.kind));
    for series in &plan.series {
        let target = chart.add_series();
        target
            .set_name(range_tuple(&series.name))
            .set_categories(range_tuple(&series.categories))
            .set_values(range_tuple(&series.values))
            .set_secondary_axis(series.y2_axis);
        if let Some(rgb) = series.color {
            target.set_format(
                ChartFormat::new()
                    .set_solid_fill(ChartSolidFill::new().set_color(Color::RGB(rgb)))
                    .set_line(ChartLine::new().set_color(Color::RGB(rgb))),
            );
        }
        if series.marker != MarkerKind::None {
            let mut marker = ChartMarker::new();
            match series.marker {
                MarkerKind::None | MarkerKind::Automatic => marker.set_automatic(),
                MarkerKind::Circle => marker.set_type(ChartMarkerType::Circle),
                MarkerKind::Square => marker.set_type(ChartMarkerType::Square),
                MarkerKind::Diamond => marker.set_type(ChartMarkerType::Diamond),
                MarkerKind::Triangle => marker.set_type(ChartMarkerType::Triangle),
                MarkerKind::X => marker.set_type(ChartMarkerType::X),
            };
            if let Some(rgb) = series.color {
                marker.set_format(
                    ChartFormat::new()
                        .set_solid_fill(ChartSolidFill::new().set_color(Color::RGB(rgb)))
                        .set_border(ChartLine::new().set_color(Color::RGB(rgb))),
                );
            }
            target.set_marker(&marker);
        }
    }

    if !plan.title.is_empty() {
        chart
            .title()
            .set_name(plan.title.as_str())
            .set_font(ChartFont::new().set_size(plan.title_size));
    }
    chart
        .x_axis()
        .set_font(&ChartFont::new().set_rotation(plan.x_axis_rotation));
    if !plan.x_axis_name.is_empty() {
        chart.x_axis().set_name(plan.x_axis_name.as_str());
    }
    if !plan.y_axis_name.is_empty() {
        chart.y_axis().set_name(plan.y_axis_name.as_str());
    }
    if plan.uses_y2_axis() && !plan.y2_axis_name.is_empty() {
        chart.y2_axis().set_name(plan.y2_axis_name.as_str());
    }
    chart.set_width(plan.size.0).set_height(plan.size.1);

    if plan.combined.len() > 1 {
        warn!(
            "chart '{}' combines {} charts; only the last is kept",
            plan.title,
            plan.combined.len()
        );
    }
    if let Some(secondary) = plan.combined.last() {
        chart.combine(&build_chart(secondary));
    }
    chart
}

impl SheetSurface for XlsxSurface {
    fn register_style(&mut self, style: &StyleDescriptor) -> Result<StyleTag> {
        if let Some(tag) = self.tags.get(style) {
            return Ok(*tag);
        }
        let tag = StyleTag(self.formats.len());
        self.formats.push(to_format(style));
        self.styles.push(style.clone());
        self.tags.insert(style.clone(), tag);
        Ok(tag)
    }

    fn write_cell(
        &mut self,
        row: RowNum,
        col: ColNum,
        content: &CellContent,
        style: Option<StyleTag>,
    ) -> Result<()> {
        match content {
            CellContent::Value(value) => self.write_value(row, col, value, style),
            CellContent::Formula(formula) => {
                match self.format(style).cloned() {
                    Some(format) => {
                        self.worksheet
                            .write_formula_with_format(row, col, formula.as_str(), &format)?;
                    }
                    None => {
                        self.worksheet.write_formula(row, col, formula.as_str())?;
                    }
                }
                Ok(())
            }
        }
    }

    fn merge_cells(
        &mut self,
        rows: RowSpan,
        first_col: ColNum,
        last_col: ColNum,
        text: &str,
        style: Option<StyleTag>,
    ) -> Result<()> {
        let format = self.format(style).cloned().unwrap_or_default();
        self.worksheet
            .merge_range(rows.first, first_col, rows.last, last_col, text, &format)?;
        Ok(())
    }

    fn set_column_hidden(&mut self, col: ColNum) -> Result<()> {
        self.worksheet.set_column_hidden(col)?;
        Ok(())
    }

    fn set_column_width(&mut self, col: ColNum, width: f64) -> Result<()> {
        self.worksheet.set_column_width(col, width)?;
        Ok(())
    }

    fn add_conditional_format(
        &mut self,
        rows: RowSpan,
        col: ColNum,
        condition: &GuardedCondition,
        style: StyleTag,
        stop_if_true: bool,
    ) -> Result<()> {
        let format = self.format(Some(style)).cloned().unwrap_or_default();
        let rule = format!("={}", condition.to_formula(&cell_ref(rows.first, col)));
        let conditional = ConditionalFormatFormula::new()
            .set_rule(rule.as_str())
            .set_format(format)
            .set_stop_if_true(stop_if_true);
        self.worksheet
            .add_conditional_format(rows.first, col, rows.last, col, &conditional)?;
        Ok(())
    }

    fn set_outline_summary_above(&mut self, above: bool) -> Result<()> {
        self.worksheet.group_symbols_above(above);
        Ok(())
    }

    fn group_rows(&mut self, rows: RowSpan, _depth: usize, collapsed: bool) -> Result<()> {
        if collapsed {
            self.worksheet.group_rows_collapsed(rows.first, rows.last)?;
        } else {
            self.worksheet.group_rows(rows.first, rows.last)?;
        }
        Ok(())
    }

    fn add_data_validation(&mut self, rows: RowSpan, col: ColNum, allowed: &[String]) -> Result<()> {
        let items: Vec<&str> = allowed.iter().map(String::as_str).collect();
        let validation = DataValidation::new().allow_list_strings(&items)?;
        self.worksheet
            .add_data_validation(rows.first, col, rows.last, col, &validation)?;
        Ok(())
    }

    fn add_note(&mut self, row: RowNum, col: ColNum, text: &str) -> Result<()> {
        let note = Note::new(text).add_author_prefix(false);
        self.worksheet.insert_note(row, col, &note)?;
        Ok(())
    }

    fn freeze_panes(&mut self, row: RowNum, col: ColNum) -> Result<()> {
        self.worksheet.set_freeze_panes(row, col)?;
        Ok(())
    }

    fn autofilter(
        &mut self,
        first_row: RowNum,
        first_col: ColNum,
        last_row: RowNum,
        last_col: ColNum,
    ) -> Result<()> {
        self.worksheet
            .autofilter(first_row, first_col, last_row, last_col)?;
        Ok(())
    }

    fn add_chart(&mut self, plan: &ChartPlan) -> Result<()> {
        let chart = build_chart(plan);
        self.worksheet
            .insert_chart(plan.location.0, plan.location.1, &chart)?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Workbook
// ─────────────────────────────────────────────────────────────────────────────

/// Collects finished worksheets into one workbook.
pub struct WorkbookWriter {
    workbook: Workbook,
    sheets: usize,
}

impl Default for WorkbookWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkbookWriter {
    pub fn new() -> Self {
        Self {
            workbook: Workbook::new(),
            sheets: 0,
        }
    }

    pub fn push(&mut self, surface: XlsxSurface) {
        debug!("adding worksheet '{}'", surface.name());
        self.workbook.push_worksheet(surface.into_worksheet());
        self.sheets += 1;
    }

    pub const fn sheet_count(&self) -> usize {
        self.sheets
    }

    pub fn save(mut self, path: &Path) -> Result<()> {
        self.workbook.save(path)?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
