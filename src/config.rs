//! Report definitions loaded from YAML or JSON.
//!
//! A definition lists sheets; each sheet stacks tables top to bottom and may
//! draw charts over them. Table data comes inline or from CSV files resolved
//! relative to the definition file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use crate::chart::ChartSpec;
use crate::collapsible::CollapsibleTable;
use crate::error::{ReportError, Result};
use crate::format::{FormatRegistry, HorizontalAlign, StyleDescriptor};
use crate::grid::{ColNum, RowNum, TableGrid};
use crate::grouping::{Hierarchy, SummaryPosition};
use crate::rules::{AggregateRule, ColumnRule, LinkRule, LinkSource, TotalPosition, ValidationRule};
use crate::table::{ConfigureTable, FlatTable, TableOptions, Title};
use crate::types::{CellValue, Column, Dataset, Level};

/// Schema version accepted in `_forge_report`.
pub const SCHEMA_VERSION: &str = "1.0";

// ─────────────────────────────────────────────────────────────────────────────
// Definition Types
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level report definition.
#[derive(Debug, Deserialize)]
pub struct ReportDefinition {
    #[serde(rename = "_forge_report")]
    pub version: String,

    /// Formats added to (or replacing) the built-in registry.
    #[serde(default)]
    pub formats: BTreeMap<String, FormatDef>,

    pub sheets: Vec<SheetDef>,
}

/// A named style declared in the definition.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FormatDef {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub wrap: bool,
    pub border: bool,
    pub align: Option<HorizontalAlign>,
    pub num_format: Option<String>,
    pub num_format_index: Option<u8>,
    /// `#RRGGBB`
    pub font_color: Option<String>,
    /// `#RRGGBB`
    pub bg_color: Option<String>,
    /// Conditional uses become spreadsheet conditional formats.
    pub highlight: bool,
}

fn default_spacing() -> RowNum {
    1
}

#[derive(Debug, Deserialize)]
pub struct SheetDef {
    pub name: String,
    /// Widths of the sheet's leading columns, in character units.
    #[serde(default)]
    pub column_widths: Vec<f64>,
    /// Blank rows between stacked tables.
    #[serde(default = "default_spacing")]
    pub spacing: RowNum,
    #[serde(default)]
    pub tables: Vec<TableDef>,
    #[serde(default)]
    pub charts: Vec<ChartSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TableDef {
    Flat(FlatTableDef),
    Collapsible(CollapsibleTableDef),
}

#[derive(Debug, Deserialize)]
pub struct FlatTableDef {
    #[serde(flatten)]
    pub common: CommonDef,
    pub data: DataDef,
    /// Text shown under the header when the dataset has no rows.
    #[serde(default)]
    pub placeholder: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CollapsibleTableDef {
    #[serde(flatten)]
    pub common: CommonDef,
    pub header: Vec<String>,
    pub levels: Vec<LevelDef>,
    #[serde(default)]
    pub summary: SummaryPosition,
    #[serde(default)]
    pub collapsed: Option<bool>,
    #[serde(default)]
    pub collapse_levels: BTreeMap<String, bool>,
}

#[derive(Debug, Deserialize)]
pub struct LevelDef {
    pub name: String,
    /// Key columns; defaults to the names of this and all outer levels.
    #[serde(default)]
    pub keys: Vec<String>,
    pub data: DataDef,
}

/// Where a dataset comes from.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DataDef {
    Csv { csv: PathBuf },
    Columns { columns: Vec<Column> },
}

/// Options shared by both table kinds.
#[derive(Debug, Default, Deserialize)]
pub struct CommonDef {
    pub name: String,
    #[serde(default)]
    pub at: Option<(RowNum, ColNum)>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub title_format: Option<String>,
    #[serde(default)]
    pub header_format: Option<String>,
    #[serde(default)]
    pub formats: Vec<FormatRuleDef>,
    #[serde(default)]
    pub total_row: Option<TotalPosition>,
    #[serde(default)]
    pub totals: Vec<TotalDef>,
    #[serde(default)]
    pub total_values: BTreeMap<String, CellValue>,
    #[serde(default)]
    pub links: Vec<LinkDef>,
    #[serde(default)]
    pub validations: Vec<ValidationDef>,
    #[serde(default)]
    pub hidden: Vec<String>,
    #[serde(default)]
    pub widths: BTreeMap<String, f64>,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
    #[serde(default)]
    pub freeze_header: bool,
    #[serde(default)]
    pub autofilter: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn as_slice(&self) -> &[String] {
        match self {
            Self::One(one) => std::slice::from_ref(one),
            Self::Many(many) => many,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FormatRuleDef {
    pub columns: Vec<String>,
    pub format: OneOrMany,
    #[serde(default)]
    pub condition: Option<OneOrMany>,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub levels: Vec<String>,
    #[serde(default)]
    pub on_total: bool,
}

/// An aggregate: either `function` or `template` + `functions`.
#[derive(Debug, Deserialize)]
pub struct TotalDef {
    pub columns: Vec<String>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub functions: Vec<String>,
    /// Writes into this level's summary rows instead of the total row.
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub ignore_hidden: bool,
}

/// A hyperlink column: either `lookup` or `template`.
#[derive(Debug, Deserialize)]
pub struct LinkDef {
    pub column: String,
    #[serde(default)]
    pub lookup: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ValidationDef {
    pub column: String,
    pub allowed: Vec<String>,
    #[serde(default)]
    pub level: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

impl ReportDefinition {
    /// Reads a definition, choosing JSON or YAML by file extension.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path.extension().is_some_and(|e| e == "json");
        let definition = if is_json {
            Self::from_json(&content)?
        } else {
            Self::from_yaml(&content)?
        };
        debug!(
            "loaded {} with {} sheet(s)",
            path.display(),
            definition.sheets.len()
        );
        Ok(definition)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let definition: Self = serde_yaml_ng::from_str(content)
            .map_err(|e| ReportError::Definition(e.to_string()))?;
        definition.check_version()?;
        Ok(definition)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let definition: Self =
            serde_json::from_str(content).map_err(|e| ReportError::Definition(e.to_string()))?;
        definition.check_version()?;
        Ok(definition)
    }

    fn check_version(&self) -> Result<()> {
        if self.version != SCHEMA_VERSION {
            return Err(ReportError::Definition(format!(
                "unsupported _forge_report version '{}' (expected {SCHEMA_VERSION})",
                self.version
            )));
        }
        if self.sheets.is_empty() {
            return Err(ReportError::Definition("no sheets defined".to_string()));
        }
        Ok(())
    }

    /// The built-in registry extended with this definition's formats.
    pub fn registry(&self) -> Result<FormatRegistry> {
        let mut registry = FormatRegistry::with_builtins();
        for (name, def) in &self.formats {
            let style = def.to_style(name)?;
            if def.highlight {
                registry.register_highlight(name.clone(), style);
            } else {
                registry.register(name.clone(), style);
            }
        }
        Ok(registry)
    }
}

fn parse_color(name: &str, text: &str) -> Result<u32> {
    let hex = text.strip_prefix('#').unwrap_or(text);
    if hex.len() != 6 {
        return Err(ReportError::Definition(format!(
            "format '{name}': color '{text}' is not #RRGGBB"
        )));
    }
    u32::from_str_radix(hex, 16).map_err(|_| {
        ReportError::Definition(format!("format '{name}': color '{text}' is not #RRGGBB"))
    })
}

impl FormatDef {
    fn to_style(&self, name: &str) -> Result<StyleDescriptor> {
        let mut style = StyleDescriptor::new();
        if self.bold {
            style = style.bold();
        }
        if self.italic {
            style = style.italic();
        }
        if self.underline {
            style = style.underline();
        }
        if self.wrap {
            style = style.wrap();
        }
        if self.border {
            style = style.border();
        }
        if let Some(align) = self.align {
            style = style.align(align);
        }
        if let Some(code) = &self.num_format {
            style = style.num_format(code);
        } else if let Some(index) = self.num_format_index {
            style = style.num_format_index(index);
        }
        if let Some(color) = &self.font_color {
            style = style.font_color(parse_color(name, color)?);
        }
        if let Some(color) = &self.bg_color {
            style = style.bg_color(parse_color(name, color)?);
        }
        Ok(style)
    }
}

impl DataDef {
    /// Materializes the dataset; CSV paths are relative to `base_dir`.
    pub fn load(&self, base_dir: &Path) -> Result<Dataset> {
        match self {
            Self::Csv { csv } => load_csv(&base_dir.join(csv)),
            Self::Columns { columns } => Dataset::new(columns.clone()),
        }
    }
}

/// Reads a CSV file with a header row, inferring each cell's type.
pub fn load_csv(path: &Path) -> Result<Dataset> {
    let csv_error = |source| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    let header: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(CellValue::infer).collect::<Vec<_>>())
                .map_err(csv_error)
        })
        .collect::<Result<Vec<_>>>()?;
    debug!("read {} row(s) from {}", rows.len(), path.display());
    let names: Vec<&str> = header.iter().map(String::as_str).collect();
    Dataset::from_rows(&names, rows)
}

// ─────────────────────────────────────────────────────────────────────────────
// Building
// ─────────────────────────────────────────────────────────────────────────────

impl CommonDef {
    fn to_options(&self, origin: (RowNum, ColNum)) -> Result<TableOptions> {
        let mut options = TableOptions {
            origin: self.at.unwrap_or(origin),
            total_row: self.total_row,
            freeze_header: self.freeze_header,
            autofilter: self.autofilter,
            hidden_columns: self.hidden.clone(),
            ..TableOptions::default()
        };
        if let Some(text) = &self.title {
            options.title = Some(Title {
                text: text.clone(),
                format: self
                    .title_format
                    .clone()
                    .unwrap_or_else(|| "MergeCenter".to_string()),
            });
        }
        if let Some(format) = &self.header_format {
            options.header_format.clone_from(format);
        }
        for rule in &self.formats {
            options.column_rules.push(rule.to_rule()?);
        }
        for total in &self.totals {
            options.aggregates.extend(total.to_rules(&self.name)?);
        }
        options.total_values = self
            .total_values
            .iter()
            .map(|(c, v)| (c.clone(), v.clone()))
            .collect();
        for link in &self.links {
            options.links.push(link.to_rule()?);
        }
        options.validations = self
            .validations
            .iter()
            .map(|v| {
                let rule = ValidationRule::new(v.column.clone(), v.allowed.iter().cloned());
                match &v.level {
                    Some(level) => rule.at_level(level.clone()),
                    None => rule,
                }
            })
            .collect();
        options.column_widths = self.widths.iter().map(|(c, w)| (c.clone(), *w)).collect();
        options.header_notes = self
            .notes
            .iter()
            .map(|(c, n)| (c.clone(), n.clone()))
            .collect();
        Ok(options)
    }
}

impl FormatRuleDef {
    fn to_rule(&self) -> Result<ColumnRule> {
        let formats: Vec<&str> = self.format.as_slice().iter().map(String::as_str).collect();
        let mut rule = match &self.condition {
            None if formats.len() == 1 => ColumnRule::new(self.columns.iter().cloned(), formats[0]),
            None => {
                return Err(ReportError::invalid_rule(
                    self.columns.join(", "),
                    "several formats need a condition each",
                ))
            }
            Some(conditions) => {
                let conditions: Vec<&str> = conditions.as_slice().iter().map(String::as_str).collect();
                ColumnRule::conditional(self.columns.iter().cloned(), &formats, &conditions)?
            }
        };
        if let Some(default) = &self.default {
            rule = rule.with_default(default);
        }
        if !self.levels.is_empty() {
            rule = rule.for_levels(self.levels.iter().cloned());
        }
        if self.on_total {
            rule = rule.on_total();
        }
        Ok(rule)
    }
}

impl TotalDef {
    fn to_rules(&self, table: &str) -> Result<Vec<AggregateRule>> {
        let rules = match (&self.function, &self.template) {
            (Some(function), None) => vec![AggregateRule::new(self.columns.iter().cloned(), function)?],
            (None, Some(template)) => {
                let functions: Vec<&str> = self.functions.iter().map(String::as_str).collect();
                self.columns
                    .iter()
                    .map(|column| AggregateRule::custom(column.clone(), template, &functions))
                    .collect::<Result<Vec<_>>>()?
            }
            _ => {
                return Err(ReportError::invalid_rule(
                    table,
                    "a total needs exactly one of 'function' or 'template'",
                ))
            }
        };
        Ok(rules
            .into_iter()
            .map(|rule| {
                let rule = match &self.level {
                    Some(level) => rule.at_level(level.clone()),
                    None => rule,
                };
                if self.ignore_hidden {
                    rule.ignoring_hidden()
                } else {
                    rule
                }
            })
            .collect())
    }
}

impl LinkDef {
    fn to_rule(&self) -> Result<LinkRule> {
        let source = match (&self.lookup, &self.template) {
            (Some(lookup), None) => LinkSource::Lookup(lookup.clone()),
            (None, Some(template)) => LinkSource::Template(template.clone()),
            _ => {
                return Err(ReportError::invalid_rule(
                    &self.column,
                    "a link needs exactly one of 'lookup' or 'template'",
                ))
            }
        };
        let rule = LinkRule::new(self.column.clone(), source);
        Ok(match &self.level {
            Some(level) => rule.at_level(level.clone()),
            None => rule,
        })
    }
}

impl TableDef {
    pub fn name(&self) -> &str {
        match self {
            Self::Flat(def) => &def.common.name,
            Self::Collapsible(def) => &def.common.name,
        }
    }

    /// Builds the table's grid with its origin at `origin` unless it sets `at`.
    pub fn build(
        &self,
        registry: &FormatRegistry,
        base_dir: &Path,
        origin: (RowNum, ColNum),
    ) -> Result<TableGrid> {
        match self {
            Self::Flat(def) => {
                let mut table = FlatTable::new(def.common.name.clone(), def.data.load(base_dir)?);
                *table.options_mut() = def.common.to_options(origin)?;
                if let Some(text) = &def.placeholder {
                    table = table.placeholder(text.clone());
                }
                table.build(registry)
            }
            Self::Collapsible(def) => {
                let mut keys: Vec<String> = Vec::new();
                let levels = def
                    .levels
                    .iter()
                    .map(|level| {
                        keys.push(level.name.clone());
                        let key_columns = if level.keys.is_empty() {
                            keys.clone()
                        } else {
                            level.keys.clone()
                        };
                        Ok(Level::new(level.name.clone(), key_columns, level.data.load(base_dir)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let mut table = CollapsibleTable::new(
                    def.common.name.clone(),
                    def.header.iter().cloned(),
                    Hierarchy::new(levels)?,
                )
                .summary(def.summary);
                if let Some(collapsed) = def.collapsed {
                    table = table.collapsed(collapsed);
                }
                for (level, collapsed) in &def.collapse_levels {
                    table = table.collapse_level(level.clone(), *collapsed);
                }
                *table.options_mut() = def.common.to_options(origin)?;
                table.build(registry)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
