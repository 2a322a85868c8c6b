//! forge-report: layout and formula generation for Excel reports.
//!
//! Builders turn datasets and declarative rules into a [`TableGrid`]: every
//! cell write, merge, outline group and conditional format a table needs,
//! with absolute coordinates and live formulas. A grid is applied to a
//! worksheet through the [`SheetSurface`] trait; [`XlsxSurface`] is the
//! `rust_xlsxwriter` implementation.
//!
//! - [`FlatTable`]: title, header, data, optional total row
//! - [`CollapsibleTable`]: hierarchical levels as nested, collapsible row groups
//! - [`ReportRunner`]: YAML/JSON report definitions rendered to a workbook

pub mod aggregate;
pub mod chart;
pub mod collapsible;
pub mod config;
pub mod error;
pub mod format;
pub mod grid;
pub mod grouping;
pub mod logging;
pub mod rules;
pub mod runner;
pub mod surface;
pub mod table;
pub mod types;
pub mod xlsx;

pub use aggregate::AggregateFunction;
pub use chart::{ChartKind, ChartPlan, ChartSpec, MarkerKind, SeriesSpec};
pub use collapsible::CollapsibleTable;
pub use config::ReportDefinition;
pub use error::{ReportError, Result};
pub use format::{Condition, FormatRegistry, GuardedCondition, StyleDescriptor};
pub use grid::{CellContent, GridBuilder, RowSpan, TableGrid, TableLayout};
pub use grouping::{group, GroupTree, Hierarchy, Outline, SummaryPosition};
pub use rules::{AggregateRule, ColumnRule, LinkRule, LinkSource, TotalPosition, ValidationRule};
pub use runner::{ReportRunner, SheetPlan};
pub use surface::{apply, RecordingSurface, SheetSurface, SurfaceCall};
pub use table::{ConfigureTable, FlatTable};
pub use types::{CellValue, Column, Dataset, Level};
pub use xlsx::{WorkbookWriter, XlsxSurface};
