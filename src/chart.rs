//! Declarative charts over flat tables.
//!
//! A [`ChartSpec`] names its series by column; planning resolves those names
//! against a built table's [`TableLayout`] into absolute sheet ranges.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};
use crate::grid::{cell_ref, ColNum, RowNum, TableLayout};

/// Chart families supported by the xlsx surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Area,
    Bar,
    #[default]
    Column,
    Line,
    Pie,
    Doughnut,
    Scatter,
    Radar,
}

/// Series marker shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    #[default]
    None,
    Automatic,
    Circle,
    Square,
    Diamond,
    Triangle,
    X,
}

/// One data series: a category column against a value column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesSpec {
    pub category: String,
    pub values: String,
    #[serde(default)]
    pub y2_axis: bool,
    #[serde(default)]
    pub marker: MarkerKind,
    /// `0xRRGGBB` applied to line, fill and marker.
    #[serde(default)]
    pub color: Option<u32>,
}

impl SeriesSpec {
    pub fn new(category: impl Into<String>, values: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            values: values.into(),
            y2_axis: false,
            marker: MarkerKind::None,
            color: None,
        }
    }
}

fn default_title_size() -> f64 {
    16.0
}

const fn default_size() -> (u32, u32) {
    (480, 288)
}

/// A chart drawn from one table's columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    /// Name of the table the series come from.
    pub table: String,
    #[serde(default, rename = "type")]
    pub kind: ChartKind,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_title_size")]
    pub title_size: f64,
    #[serde(default)]
    pub x_axis_name: String,
    #[serde(default)]
    pub y_axis_name: String,
    #[serde(default)]
    pub y2_axis_name: String,
    /// Top-left anchor cell.
    #[serde(default)]
    pub location: (RowNum, ColNum),
    /// Width and height in pixels.
    #[serde(default = "default_size")]
    pub size: (u32, u32),
    #[serde(default)]
    pub x_axis_rotation: i16,
    #[serde(default)]
    pub series: Vec<SeriesSpec>,
    /// Charts merged into this one (e.g. a line over columns).
    #[serde(default)]
    pub combined: Vec<ChartSpec>,
}

impl ChartSpec {
    pub fn new(table: impl Into<String>, kind: ChartKind) -> Self {
        Self {
            table: table.into(),
            kind,
            title: String::new(),
            title_size: default_title_size(),
            x_axis_name: String::new(),
            y_axis_name: String::new(),
            y2_axis_name: String::new(),
            location: (0, 0),
            size: default_size(),
            x_axis_rotation: 0,
            series: Vec::new(),
            combined: Vec::new(),
        }
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn axes(mut self, x: impl Into<String>, y: impl Into<String>) -> Self {
        self.x_axis_name = x.into();
        self.y_axis_name = y.into();
        self
    }

    #[must_use]
    pub const fn at(mut self, row: RowNum, col: ColNum) -> Self {
        self.location = (row, col);
        self
    }

    #[must_use]
    pub fn series(mut self, series: SeriesSpec) -> Self {
        self.series.push(series);
        self
    }

    #[must_use]
    pub fn combine(mut self, other: Self) -> Self {
        self.combined.push(other);
        self
    }

    /// Resolves every series (and combined chart) against built table layouts.
    pub fn plan(&self, sheet: &str, layouts: &HashMap<String, TableLayout>) -> Result<ChartPlan> {
        let layout = layouts.get(&self.table).ok_or_else(|| {
            ReportError::Definition(format!("chart references unknown table '{}'", self.table))
        })?;
        if layout.grouped {
            return Err(ReportError::invalid_rule(
                &self.table,
                "charts plot flat tables; grouped rows mix subtotals with leaves",
            ));
        }
        let context = format!("table '{}'", self.table);
        let data = layout.data_rows.ok_or_else(|| {
            ReportError::invalid_rule(&self.table, "a chart needs at least one data row")
        })?;
        let column = |name: &str| {
            layout
                .column(name)
                .ok_or_else(|| ReportError::column_not_found(name, context.as_str()))
        };

        let series = self
            .series
            .iter()
            .map(|s| {
                let category = column(&s.category)?;
                let values = column(&s.values)?;
                Ok(SeriesPlan {
                    name: CellRange::cell(sheet, layout.header_row, values),
                    categories: CellRange::new(sheet, data.first, category, data.last, category),
                    values: CellRange::new(sheet, data.first, values, data.last, values),
                    y2_axis: s.y2_axis,
                    marker: s.marker,
                    color: s.color,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let combined = self
            .combined
            .iter()
            .map(|c| c.plan(sheet, layouts))
            .collect::<Result<Vec<_>>>()?;

        Ok(ChartPlan {
            kind: self.kind,
            title: self.title.clone(),
            title_size: self.title_size,
            x_axis_name: self.x_axis_name.clone(),
            y_axis_name: self.y_axis_name.clone(),
            y2_axis_name: self.y2_axis_name.clone(),
            location: self.location,
            size: self.size,
            x_axis_rotation: self.x_axis_rotation,
            series,
            combined,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plans
// ─────────────────────────────────────────────────────────────────────────────

/// An absolute block of cells on a named sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellRange {
    pub sheet: String,
    pub first_row: RowNum,
    pub first_col: ColNum,
    pub last_row: RowNum,
    pub last_col: ColNum,
}

impl CellRange {
    pub fn new(sheet: &str, first_row: RowNum, first_col: ColNum, last_row: RowNum, last_col: ColNum) -> Self {
        Self {
            sheet: sheet.to_string(),
            first_row,
            first_col,
            last_row,
            last_col,
        }
    }

    pub fn cell(sheet: &str, row: RowNum, col: ColNum) -> Self {
        Self::new(sheet, row, col, row, col)
    }
}

impl fmt::Display for CellRange {
    /// `'Sheet'!$B$3:$B$5`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let absolute = |row, col| {
            let a1 = cell_ref(row, col);
            let split = a1.find(|c: char| c.is_ascii_digit()).unwrap_or(a1.len());
            format!("${}${}", &a1[..split], &a1[split..])
        };
        write!(f, "'{}'!{}", self.sheet.replace('\'', "''"), absolute(self.first_row, self.first_col))?;
        if (self.first_row, self.first_col) != (self.last_row, self.last_col) {
            write!(f, ":{}", absolute(self.last_row, self.last_col))?;
        }
        Ok(())
    }
}

/// A series with resolved source ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesPlan {
    pub name: CellRange,
    pub categories: CellRange,
    pub values: CellRange,
    pub y2_axis: bool,
    pub marker: MarkerKind,
    pub color: Option<u32>,
}

/// A chart ready to hand to a sheet surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPlan {
    pub kind: ChartKind,
    pub title: String,
    pub title_size: f64,
    pub x_axis_name: String,
    pub y_axis_name: String,
    pub y2_axis_name: String,
    pub location: (RowNum, ColNum),
    pub size: (u32, u32),
    pub x_axis_rotation: i16,
    pub series: Vec<SeriesPlan>,
    pub combined: Vec<ChartPlan>,
}

impl ChartPlan {
    /// Whether any series (here or in a combined chart) uses the secondary axis.
    pub fn uses_y2_axis(&self) -> bool {
        self.series.iter().any(|s| s.y2_axis) || self.combined.iter().any(Self::uses_y2_axis)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
