//! Report runner - turns a definition into a workbook.
//!
//! Orchestrates the rendering pipeline:
//! 1. Load the definition and build its format registry
//! 2. Plan every sheet in parallel (tables stacked top to bottom, charts resolved)
//! 3. Apply the plans in order, one surface per sheet
//! 4. Save the workbook only once every sheet has been applied

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use log::{debug, info};
use rayon::prelude::*;

use crate::chart::ChartPlan;
use crate::config::{ReportDefinition, SheetDef};
use crate::error::{ReportError, Result};
use crate::format::FormatRegistry;
use crate::grid::{to_col, ColNum, RowNum, TableGrid};
use crate::surface::{apply, RecordingSurface, SheetSurface};
use crate::xlsx::{WorkbookWriter, XlsxSurface};

// ─────────────────────────────────────────────────────────────────────────────
// Sheet Plans
// ─────────────────────────────────────────────────────────────────────────────

/// Everything one worksheet receives, fully resolved.
#[derive(Debug, Clone)]
pub struct SheetPlan {
    pub name: String,
    pub column_widths: Vec<(ColNum, f64)>,
    pub tables: Vec<TableGrid>,
    pub charts: Vec<ChartPlan>,
}

impl SheetPlan {
    /// Applies sheet widths, then every table, then charts.
    pub fn apply<S: SheetSurface + ?Sized>(&self, surface: &mut S) -> Result<()> {
        for (col, width) in &self.column_widths {
            surface.set_column_width(*col, *width)?;
        }
        for table in &self.tables {
            apply(table, surface)?;
        }
        for chart in &self.charts {
            surface.add_chart(chart)?;
        }
        Ok(())
    }

    pub fn cell_count(&self) -> usize {
        self.tables.iter().map(|t| t.cells.len()).sum()
    }
}

/// Fails if two tables on one sheet write the same cell, merged blocks included.
fn check_overlap(tables: &[TableGrid]) -> Result<()> {
    let mut seen: HashSet<(RowNum, ColNum)> = HashSet::new();
    for table in tables {
        let cells = table.cells.iter().map(|c| (c.row, c.col));
        let merged = table.merges.iter().flat_map(|m| {
            (m.rows.first..=m.rows.last)
                .flat_map(move |row| (m.first_col..=m.last_col).map(move |col| (row, col)))
        });
        for (row, col) in cells.chain(merged) {
            if !seen.insert((row, col)) {
                return Err(ReportError::DuplicateCellWrite { row, col });
            }
        }
    }
    Ok(())
}

/// Outcome of a successful render.
#[derive(Debug, Clone, Copy)]
pub struct RenderSummary {
    pub sheets: usize,
    pub tables: usize,
    pub cells: usize,
    pub elapsed: Duration,
}

// ─────────────────────────────────────────────────────────────────────────────
// Report Runner
// ─────────────────────────────────────────────────────────────────────────────

/// Plans and renders one report definition.
pub struct ReportRunner {
    /// Directory CSV paths are resolved against.
    base_dir: PathBuf,
    definition: ReportDefinition,
    registry: FormatRegistry,
}

impl ReportRunner {
    /// Loads a definition file and prepares its registry.
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        let definition = ReportDefinition::load(path)
            .with_context(|| format!("Failed to load report {}", path.display()))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_definition(definition, base_dir)
    }

    pub fn from_definition(definition: ReportDefinition, base_dir: PathBuf) -> anyhow::Result<Self> {
        let registry = definition
            .registry()
            .context("Failed to build format registry")?;
        Ok(Self {
            base_dir,
            definition,
            registry,
        })
    }

    pub const fn definition(&self) -> &ReportDefinition {
        &self.definition
    }

    pub const fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    /// Plans every sheet; any failing sheet fails the whole report.
    pub fn plan(&self) -> anyhow::Result<Vec<SheetPlan>> {
        let mut names = HashSet::new();
        if let Some(dup) = self
            .definition
            .sheets
            .iter()
            .find(|s| !names.insert(s.name.as_str()))
        {
            anyhow::bail!("Sheet name '{}' is used more than once", dup.name);
        }

        self.definition
            .sheets
            .par_iter()
            .map(|sheet| {
                self.plan_sheet(sheet)
                    .with_context(|| format!("Failed to plan sheet '{}'", sheet.name))
            })
            .collect()
    }

    /// Builds a sheet's tables top to bottom and resolves its charts.
    pub fn plan_sheet(&self, sheet: &SheetDef) -> anyhow::Result<SheetPlan> {
        let mut tables = Vec::with_capacity(sheet.tables.len());
        let mut layouts = HashMap::new();
        let mut next_row: RowNum = 0;

        for def in &sheet.tables {
            let name = def.name();
            if layouts.contains_key(name) {
                anyhow::bail!("Table name '{name}' is used more than once");
            }
            let grid = def
                .build(&self.registry, &self.base_dir, (next_row, 0))
                .with_context(|| format!("Failed to build table '{name}'"))?;
            if let Some(last) = grid.last_row() {
                next_row = next_row.max(last + 1 + sheet.spacing);
            }
            debug!(
                "sheet '{}': table '{name}' has {} cell(s)",
                sheet.name,
                grid.cells.len()
            );
            layouts.insert(name.to_string(), grid.layout.clone());
            tables.push(grid);
        }
        check_overlap(&tables)?;

        let charts = sheet
            .charts
            .iter()
            .map(|chart| chart.plan(&sheet.name, &layouts))
            .collect::<Result<Vec<_>>>()?;

        let column_widths = sheet
            .column_widths
            .iter()
            .enumerate()
            .map(|(i, width)| Ok((to_col(i)?, *width)))
            .collect::<Result<Vec<_>>>()?;

        Ok(SheetPlan {
            name: sheet.name.clone(),
            column_widths,
            tables,
            charts,
        })
    }

    /// Applies every plan to an in-memory surface.
    pub fn record(&self) -> anyhow::Result<Vec<(String, RecordingSurface)>> {
        self.plan()?
            .into_iter()
            .map(|plan| {
                let mut surface = RecordingSurface::new();
                plan.apply(&mut surface)
                    .with_context(|| format!("Failed to apply sheet '{}'", plan.name))?;
                Ok((plan.name, surface))
            })
            .collect()
    }

    /// Renders the workbook to `output`.
    pub fn render(&self, output: &Path) -> anyhow::Result<RenderSummary> {
        let start = Instant::now();
        let plans = self.plan()?;

        let mut writer = WorkbookWriter::new();
        let mut tables = 0;
        let mut cells = 0;
        for plan in &plans {
            let mut surface = XlsxSurface::new(&plan.name)
                .with_context(|| format!("Invalid sheet name '{}'", plan.name))?;
            plan.apply(&mut surface)
                .with_context(|| format!("Failed to write sheet '{}'", plan.name))?;
            info!(
                "sheet '{}': {} table(s), {} chart(s)",
                plan.name,
                plan.tables.len(),
                plan.charts.len()
            );
            tables += plan.tables.len();
            cells += plan.cell_count();
            writer.push(surface);
        }

        let sheets = writer.sheet_count();
        writer
            .save(output)
            .with_context(|| format!("Failed to save {}", output.display()))?;

        Ok(RenderSummary {
            sheets,
            tables,
            cells,
            elapsed: start.elapsed(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
