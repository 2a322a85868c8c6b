//! Declarative table rules: column formats, aggregates, links and validation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateFunction;
use crate::error::{ReportError, Result};
use crate::format::{Condition, FormatChoice, FormatRegistry, GuardedCondition, StyleDescriptor};
use crate::types::{CellValue, Row};

/// Which rows a column rule styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowKind {
    #[default]
    Data,
    Total,
}

/// Where the total row of a table goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalPosition {
    /// Above the header row.
    Top,
    /// After the last data row.
    Bottom,
}

// ─────────────────────────────────────────────────────────────────────────────
// Column Rules
// ─────────────────────────────────────────────────────────────────────────────

/// Formats for one or more columns, optionally conditional and level scoped.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRule {
    pub columns: Vec<String>,
    pub choices: Vec<FormatChoice>,
    pub default: Option<String>,
    /// Level names this rule is limited to; empty means every level.
    pub levels: Vec<String>,
    pub target: RowKind,
}

impl ColumnRule {
    /// An unconditional format.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>, format: &str) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            choices: vec![FormatChoice::always(format)],
            default: None,
            levels: Vec::new(),
            target: RowKind::Data,
        }
    }

    /// Parallel format/condition lists; the first true condition wins.
    pub fn conditional<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        formats: &[&str],
        conditions: &[&str],
    ) -> Result<Self> {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if formats.len() != conditions.len() {
            return Err(ReportError::invalid_rule(
                columns.join(", "),
                "format and condition lists must be parallel",
            ));
        }
        let choices = formats
            .iter()
            .zip(conditions)
            .map(|(format, text)| Ok(FormatChoice::when(*format, text.parse::<Condition>()?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            columns,
            choices,
            default: None,
            levels: Vec::new(),
            target: RowKind::Data,
        })
    }

    #[must_use]
    pub fn with_default(mut self, format: &str) -> Self {
        self.default = Some(format.to_string());
        self
    }

    #[must_use]
    pub fn for_levels<S: Into<String>>(mut self, levels: impl IntoIterator<Item = S>) -> Self {
        self.levels = levels.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn on_total(mut self) -> Self {
        self.target = RowKind::Total;
        self
    }

    fn applies(&self, column: &str, level: Option<&str>, target: RowKind) -> bool {
        self.target == target
            && self.columns.iter().any(|c| c == column)
            && (self.levels.is_empty()
                || level.is_some_and(|name| self.levels.iter().any(|l| l == name)))
    }
}

/// A highlight format compiled to a spreadsheet-native conditional format.
#[derive(Debug, Clone)]
pub(crate) struct Highlight {
    pub condition: GuardedCondition,
    pub style: StyleDescriptor,
    /// Static choices declared before this highlight.
    after: usize,
}

/// How one column's cells are styled, resolved against the registry.
#[derive(Debug, Clone, Default)]
pub(crate) struct ColumnStyle {
    /// Choices evaluated per cell at generation time.
    statics: Vec<FormatChoice>,
    default: Option<String>,
    pub highlights: Vec<Highlight>,
}

impl ColumnStyle {
    /// Picks the rule governing `column`: the last declared one that applies.
    ///
    /// A highlight declared after static choices only fires where none of
    /// them holds. One declared after an unconditional choice can never
    /// fire and is dropped.
    pub(crate) fn select(
        rules: &[ColumnRule],
        registry: &FormatRegistry,
        column: &str,
        level: Option<&str>,
        target: RowKind,
    ) -> Result<Self> {
        let Some(rule) = rules.iter().rev().find(|r| r.applies(column, level, target)) else {
            return Ok(Self::default());
        };
        let mut style = Self {
            default: rule.default.clone(),
            ..Self::default()
        };
        if let Some(default) = &rule.default {
            registry.resolve(default)?;
        }
        for choice in &rule.choices {
            let descriptor = registry.resolve(&choice.format)?;
            match &choice.condition {
                Some(condition) if registry.is_highlight(&choice.format)? => {
                    let unless: Option<Vec<Condition>> =
                        style.statics.iter().map(|c| c.condition.clone()).collect();
                    if let Some(unless) = unless {
                        style.highlights.push(Highlight {
                            condition: GuardedCondition {
                                condition: condition.clone(),
                                unless,
                            },
                            style: descriptor.clone(),
                            after: style.statics.len(),
                        });
                    }
                }
                _ => style.statics.push(choice.clone()),
            }
        }
        Ok(style)
    }

    /// Resolves the static style of one cell.
    ///
    /// Choices are tried in declaration order; when a highlight condition
    /// holds before any static choice matches, the highlight wins and the
    /// cell keeps only the default style underneath it.
    pub(crate) fn resolve<'r>(
        &self,
        registry: &'r FormatRegistry,
        value: &CellValue,
    ) -> Result<Option<&'r StyleDescriptor>> {
        let cut = self
            .highlights
            .iter()
            .filter(|h| h.condition.condition.evaluate(value))
            .map(|h| h.after)
            .min()
            .unwrap_or(self.statics.len());
        registry.resolve_conditional(&self.statics[..cut], self.default.as_deref(), value)
    }

    /// Style for a cell whose value is unknown at generation time (formulas):
    /// the first unconditional choice, else the default.
    pub(crate) fn fallback<'r>(
        &self,
        registry: &'r FormatRegistry,
    ) -> Result<Option<&'r StyleDescriptor>> {
        let name = self
            .statics
            .iter()
            .find(|c| c.condition.is_none())
            .map(|c| c.format.as_str())
            .or(self.default.as_deref());
        name.map(|n| registry.resolve(n)).transpose()
    }

    pub(crate) fn is_unset(&self) -> bool {
        self.statics.is_empty() && self.default.is_none() && self.highlights.is_empty()
    }
}

/// Checks that every column named by `rules` exists.
pub(crate) fn check_rule_columns<'a>(
    names: impl IntoIterator<Item = &'a str>,
    exists: impl Fn(&str) -> bool,
    context: &str,
) -> Result<()> {
    for name in names {
        if !exists(name) {
            return Err(ReportError::column_not_found(name, context));
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Rules
// ─────────────────────────────────────────────────────────────────────────────

/// What an aggregate rule computes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateOp {
    /// One function over the target column itself.
    Function(AggregateFunction),
    /// A template over several columns, e.g. `` `Profit` / `Sales` ``.
    Custom {
        template: String,
        functions: Vec<AggregateFunction>,
    },
}

/// Where an aggregate rule's result lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateTarget {
    /// The table's total row.
    Total,
    /// The summary row of every group at the named level.
    Level(String),
}

/// An aggregate written into total or summary rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRule {
    pub columns: Vec<String>,
    pub op: AggregateOp,
    pub target: AggregateTarget,
    pub ignore_hidden: bool,
}

impl AggregateRule {
    /// One named function over each listed column, landing on the total row.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>, function: &str) -> Result<Self> {
        Ok(Self {
            columns: columns.into_iter().map(Into::into).collect(),
            op: AggregateOp::Function(function.parse()?),
            target: AggregateTarget::Total,
            ignore_hidden: false,
        })
    }

    /// A custom operation written into `column`.
    pub fn custom(column: impl Into<String>, template: &str, functions: &[&str]) -> Result<Self> {
        let functions = functions
            .iter()
            .map(|f| f.parse())
            .collect::<Result<Vec<AggregateFunction>>>()?;
        if functions.is_empty() {
            return Err(ReportError::invalid_rule(
                template,
                "a custom operation needs at least one aggregate function",
            ));
        }
        Ok(Self {
            columns: vec![column.into()],
            op: AggregateOp::Custom {
                template: template.to_string(),
                functions,
            },
            target: AggregateTarget::Total,
            ignore_hidden: false,
        })
    }

    /// Sends the result to the summary rows of `level` instead of the total row.
    #[must_use]
    pub fn at_level(mut self, level: impl Into<String>) -> Self {
        self.target = AggregateTarget::Level(level.into());
        self
    }

    /// Skips hidden rows (`AGGREGATE(code,5,...)`).
    #[must_use]
    pub const fn ignoring_hidden(mut self) -> Self {
        self.ignore_hidden = true;
        self
    }

    /// Every column this rule reads or writes.
    pub(crate) fn referenced_columns(&self) -> Result<Vec<&str>> {
        let mut names: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        if let AggregateOp::Custom { template, .. } = &self.op {
            let (_, columns) = crate::aggregate::template_parts(template)?;
            names.extend(columns);
        }
        Ok(names)
    }
}

/// Finds the aggregate governing `column` at `target`: the last declared one.
pub(crate) fn aggregate_for<'a>(
    rules: &'a [AggregateRule],
    column: &str,
    target: &AggregateTarget,
) -> Option<&'a AggregateRule> {
    rules
        .iter()
        .rev()
        .find(|r| &r.target == target && r.columns.iter().any(|c| c == column))
}

// ─────────────────────────────────────────────────────────────────────────────
// Links & Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Caller-supplied link mapping over a row.
pub type LinkFn = Arc<dyn Fn(Row<'_>) -> Option<String> + Send + Sync>;

/// Where a hyperlink target comes from.
#[derive(Clone)]
pub enum LinkSource {
    /// Cell text → URL.
    Lookup(BTreeMap<String, String>),
    /// URL template with `{Column}` placeholders filled from the row.
    Template(String),
    /// Arbitrary mapping over the row.
    Computed(LinkFn),
}

impl fmt::Debug for LinkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lookup(map) => f.debug_tuple("Lookup").field(map).finish(),
            Self::Template(t) => f.debug_tuple("Template").field(t).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl LinkSource {
    /// Resolves the link target for a row, if any.
    pub fn target(&self, value: &CellValue, row: Row<'_>) -> Option<String> {
        match self {
            Self::Lookup(map) => map.get(&value.to_string()).cloned(),
            Self::Template(template) => fill_template(template, row),
            Self::Computed(f) => f(row),
        }
    }
}

/// Fills `{Column}` placeholders; `None` if a placeholder names a missing or empty cell.
fn fill_template(template: &str, row: Row<'_>) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let close = rest[open..].find('}')? + open;
        let value = row.get(&rest[open + 1..close])?;
        if value.is_empty() {
            return None;
        }
        out.push_str(&value.to_string());
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    Some(out)
}

/// Turns a column's cells into `HYPERLINK` formulas.
#[derive(Debug, Clone)]
pub struct LinkRule {
    pub column: String,
    pub source: LinkSource,
    pub level: Option<String>,
}

impl LinkRule {
    pub fn new(column: impl Into<String>, source: LinkSource) -> Self {
        Self {
            column: column.into(),
            source,
            level: None,
        }
    }

    #[must_use]
    pub fn at_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub(crate) fn applies(&self, column: &str, level: Option<&str>) -> bool {
        self.column == column && (self.level.is_none() || self.level.as_deref() == level)
    }
}

/// `=HYPERLINK("target","text")`, with quotes doubled.
pub(crate) fn hyperlink_formula(target: &str, text: &str) -> String {
    format!(
        "=HYPERLINK(\"{}\",\"{}\")",
        target.replace('"', "\"\""),
        text.replace('"', "\"\"")
    )
}

/// A dropdown of allowed values on a column's data cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRule {
    pub column: String,
    pub allowed: Vec<String>,
    pub level: Option<String>,
}

impl ValidationRule {
    pub fn new<S: Into<String>>(column: impl Into<String>, allowed: impl IntoIterator<Item = S>) -> Self {
        Self {
            column: column.into(),
            allowed: allowed.into_iter().map(Into::into).collect(),
            level: None,
        }
    }

    #[must_use]
    pub fn at_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub(crate) fn applies(&self, column: &str, level: Option<&str>) -> bool {
        self.column == column && (self.level.is_none() || self.level.as_deref() == level)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, Dataset};

    #[test]
    fn conditional_rule_requires_parallel_lists() {
        let result = ColumnRule::conditional(["Sales"], &["Bold", "Percent"], &[">1"]);
        assert!(matches!(result, Err(ReportError::InvalidRule { .. })));
    }

    #[test]
    fn later_rule_for_same_column_wins() {
        let registry = FormatRegistry::default();
        let rules = vec![
            ColumnRule::new(["Sales", "Profit"], "Num"),
            ColumnRule::new(["Sales"], "Currency"),
        ];
        let sales = ColumnStyle::select(&rules, &registry, "Sales", None, RowKind::Data).unwrap();
        let profit = ColumnStyle::select(&rules, &registry, "Profit", None, RowKind::Data).unwrap();
        let value = CellValue::Number(1.0);
        assert_eq!(
            sales.resolve(&registry, &value).unwrap(),
            Some(registry.resolve("Currency").unwrap())
        );
        assert_eq!(
            profit.resolve(&registry, &value).unwrap(),
            Some(registry.resolve("Num").unwrap())
        );
    }

    #[test]
    fn level_scoped_rules_only_apply_to_their_level() {
        let registry = FormatRegistry::default();
        let rules = vec![ColumnRule::new(["Salary"], "Bold").for_levels(["Department"])];
        let dept =
            ColumnStyle::select(&rules, &registry, "Salary", Some("Department"), RowKind::Data)
                .unwrap();
        let team =
            ColumnStyle::select(&rules, &registry, "Salary", Some("Team"), RowKind::Data).unwrap();
        let value = CellValue::Number(1.0);
        assert!(dept.resolve(&registry, &value).unwrap().is_some());
        assert!(team.resolve(&registry, &value).unwrap().is_none());
    }

    #[test]
    fn conditional_highlights_split_from_static_choices() {
        let registry = FormatRegistry::default();
        let rules = vec![ColumnRule::conditional(
            ["Sales"],
            &["GreenBackground", "Bold"],
            &[">300", "<100"],
        )
        .unwrap()];
        let style = ColumnStyle::select(&rules, &registry, "Sales", None, RowKind::Data).unwrap();
        assert_eq!(style.highlights.len(), 1);
        // The highlight is never evaluated statically.
        assert_eq!(style.resolve(&registry, &CellValue::Number(500.0)).unwrap(), None);
        assert!(style.resolve(&registry, &CellValue::Number(50.0)).unwrap().is_some());
    }

    #[test]
    fn mixed_choices_keep_declaration_order() {
        let registry = FormatRegistry::default();
        let bold = registry.resolve("Bold").unwrap();
        let select = |formats: &[&str], conditions: &[&str]| {
            let rules = vec![ColumnRule::conditional(["Sales"], formats, conditions)
                .unwrap()
                .with_default("Num")];
            ColumnStyle::select(&rules, &registry, "Sales", None, RowKind::Data).unwrap()
        };

        // Highlight first: it wins where it holds, the static choice elsewhere.
        let highlight_first = select(&["GreenBackground", "Bold"], &[">300", ">0"]);
        assert_eq!(
            highlight_first.resolve(&registry, &CellValue::Number(500.0)).unwrap(),
            Some(registry.resolve("Num").unwrap())
        );
        assert_eq!(highlight_first.resolve(&registry, &CellValue::Number(100.0)).unwrap(), Some(bold));
        assert!(highlight_first.highlights[0].condition.unless.is_empty());

        // Static first: the highlight is guarded by the earlier condition.
        let static_first = select(&["Bold", "GreenBackground"], &[">0", ">300"]);
        assert_eq!(static_first.resolve(&registry, &CellValue::Number(500.0)).unwrap(), Some(bold));
        let guard = &static_first.highlights[0].condition;
        assert_eq!(guard.to_formula("B2"), "AND(NOT(B2>0),B2>300)");
        assert!(!guard.evaluate(&CellValue::Number(500.0)));
    }

    #[test]
    fn highlight_after_unconditional_choice_is_dropped() {
        let registry = FormatRegistry::default();
        let rules = vec![ColumnRule {
            columns: vec!["Sales".to_string()],
            choices: vec![
                FormatChoice::always("Bold"),
                FormatChoice::when("GreenBackground", ">300".parse().unwrap()),
            ],
            default: None,
            levels: Vec::new(),
            target: RowKind::Data,
        }];
        let style = ColumnStyle::select(&rules, &registry, "Sales", None, RowKind::Data).unwrap();
        assert!(style.highlights.is_empty());
        assert_eq!(
            style.resolve(&registry, &CellValue::Number(500.0)).unwrap(),
            Some(registry.resolve("Bold").unwrap())
        );
    }

    #[test]
    fn aggregate_rule_rejects_unknown_functions() {
        assert!(matches!(
            AggregateRule::new(["Sales"], "GEOMEAN"),
            Err(ReportError::UnsupportedAggregate(_))
        ));
        assert!(matches!(
            AggregateRule::custom("Margin", "`Profit`/`Sales`", &["SUM", "BOGUS"]),
            Err(ReportError::UnsupportedAggregate(_))
        ));
    }

    #[test]
    fn custom_rule_lists_template_columns() {
        let rule = AggregateRule::custom("Margin", "`Profit` / `Sales`", &["SUM"]).unwrap();
        assert_eq!(rule.referenced_columns().unwrap(), vec!["Margin", "Profit", "Sales"]);
    }

    #[test]
    fn link_sources_resolve_targets() {
        let ds = Dataset::new(vec![
            Column::new("Ticket", ["T-1"]),
            Column::new("Owner", [""]),
        ])
        .unwrap();
        let row = ds.row(0);
        let value = CellValue::from("T-1");

        let lookup = LinkSource::Lookup(BTreeMap::from([(
            "T-1".to_string(),
            "https://tracker/T-1".to_string(),
        )]));
        assert_eq!(lookup.target(&value, row).as_deref(), Some("https://tracker/T-1"));

        let template = LinkSource::Template("https://tracker/{Ticket}".to_string());
        assert_eq!(template.target(&value, row).as_deref(), Some("https://tracker/T-1"));

        let missing = LinkSource::Template("https://people/{Owner}".to_string());
        assert_eq!(missing.target(&value, row), None);

        let computed: LinkSource =
            LinkSource::Computed(Arc::new(|row| row.get("Ticket").map(|v| format!("#{v}"))));
        assert_eq!(computed.target(&value, row).as_deref(), Some("#T-1"));
    }

    #[test]
    fn hyperlink_formula_escapes_quotes() {
        assert_eq!(
            hyperlink_formula("https://x/?q=\"a\"", "say \"hi\""),
            "=HYPERLINK(\"https://x/?q=\"\"a\"\"\",\"say \"\"hi\"\"\")"
        );
    }
}
