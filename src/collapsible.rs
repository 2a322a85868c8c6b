//! Collapsible hierarchical tables.
//!
//! The group tree is walked in preorder and each group writes one row. Level
//! aggregates on a summary row reference only the group's direct children,
//! so nested subtotals are never counted twice.

use std::collections::HashMap;

use log::debug;

use crate::aggregate::{self, ColumnRefs};
use crate::error::{ReportError, Result};
use crate::format::FormatRegistry;
use crate::grid::{CellContent, ColNum, GridBuilder, RowNum, RowSpan, TableGrid, TableLayout};
use crate::grouping::{self, Group, GroupTree, Hierarchy, Outline, SummaryPosition};
use crate::rules::{
    aggregate_for, AggregateOp, AggregateRule, AggregateTarget, ColumnStyle, LinkRule, RowKind,
};
use crate::table::{
    write_data_cell, write_highlights, write_validation, ConfigureTable, Frame, TableOptions,
};
use crate::types::CellValue;

/// A table of nested, collapsible groups over a [`Hierarchy`].
#[derive(Debug, Clone)]
pub struct CollapsibleTable {
    pub name: String,
    /// Column order of the output; every level's columns must appear here.
    pub header: Vec<String>,
    pub hierarchy: Hierarchy,
    pub options: TableOptions,
    pub position: SummaryPosition,
    pub default_collapsed: bool,
    pub collapsed_levels: HashMap<String, bool>,
}

impl ConfigureTable for CollapsibleTable {
    fn options_mut(&mut self) -> &mut TableOptions {
        &mut self.options
    }
}

/// How one column is written at one level.
struct ColumnPlan<'t> {
    style: ColumnStyle,
    link: Option<&'t LinkRule>,
    source: Option<usize>,
    aggregate: Option<&'t AggregateRule>,
}

impl CollapsibleTable {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        header: impl IntoIterator<Item = S>,
        hierarchy: Hierarchy,
    ) -> Self {
        Self {
            name: name.into(),
            header: header.into_iter().map(Into::into).collect(),
            hierarchy,
            options: TableOptions::default(),
            position: SummaryPosition::Above,
            default_collapsed: true,
            collapsed_levels: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn summary(mut self, position: SummaryPosition) -> Self {
        self.position = position;
        self
    }

    /// Sets whether groups start collapsed when no level override exists.
    #[must_use]
    pub const fn collapsed(mut self, collapsed: bool) -> Self {
        self.default_collapsed = collapsed;
        self
    }

    #[must_use]
    pub fn collapse_level(mut self, level: impl Into<String>, collapsed: bool) -> Self {
        self.collapsed_levels.insert(level.into(), collapsed);
        self
    }

    /// Lays out the table.
    pub fn build(&self, registry: &FormatRegistry) -> Result<TableGrid> {
        let context = format!("table '{}'", self.name);
        self.check(&context)?;

        let body_rows = self
            .hierarchy
            .levels()
            .iter()
            .map(|l| l.dataset.row_count())
            .sum();
        let frame = Frame::plan(&self.options, self.header.len(), body_rows)?;
        let outline = Outline {
            position: self.position,
            first_row: frame.body_start,
            default_collapsed: self.default_collapsed,
            collapsed_levels: self.collapsed_levels.clone(),
        };
        let tree = grouping::group(&self.hierarchy, &outline)?;

        let mut builder = GridBuilder::new(&self.name);
        frame.write_chrome(&mut builder, registry, &self.options, &self.header)?;

        let plans = self.plan_columns(registry)?;
        for (_, group) in tree.iter() {
            self.write_group(&mut builder, registry, &frame, &tree, group, &plans[group.level])?;
        }
        self.write_level_ranges(&mut builder, &frame, &tree, &plans)?;

        for instruction in tree.grouping_instructions() {
            builder.group(instruction);
        }

        let total_rows = self.total_sources(&tree, &plans);
        frame.write_totals(&mut builder, registry, &self.options, &self.header, |i, col| {
            ColumnRefs::rows(col, total_rows[i].iter().copied())
        })?;

        builder.summary_above(self.position == SummaryPosition::Above);
        builder.layout(TableLayout {
            header_row: frame.header_row,
            first_col: frame.first_col,
            columns: self.header.clone(),
            data_rows: tree.span(),
            total_row: frame.total_row,
            grouped: true,
        });
        let grid = builder.finish();
        debug!(
            "built collapsible table '{}': {} groups, {} outline ranges",
            self.name,
            tree.len(),
            grid.groups.len()
        );
        Ok(grid)
    }

    fn check(&self, context: &str) -> Result<()> {
        if self.header.is_empty() {
            return Err(ReportError::EmptyDataset(context.to_string()));
        }
        for (i, name) in self.header.iter().enumerate() {
            if self.header[..i].contains(name) {
                return Err(ReportError::DuplicateColumn(name.clone()));
            }
        }
        self.options.check_columns(&self.header, context)?;

        let header_context = format!("header of {context}");
        for level in self.hierarchy.levels() {
            let mut columns = level.dataset.column_names();
            if let Some(missing) = columns.find(|c| !self.header.iter().any(|h| h == *c)) {
                return Err(ReportError::column_not_found(missing, header_context));
            }
        }

        let known = |level: &str| self.hierarchy.level_index(level).is_some();
        let scopes = self
            .options
            .column_rules
            .iter()
            .flat_map(|r| r.levels.iter().map(String::as_str))
            .chain(self.options.links.iter().filter_map(|l| l.level.as_deref()))
            .chain(self.options.validations.iter().filter_map(|v| v.level.as_deref()))
            .chain(self.collapsed_levels.keys().map(String::as_str));
        for scope in scopes {
            if !known(scope) {
                return Err(ReportError::invalid_rule(scope, format!("no such level in {context}")));
            }
        }

        let leaf = self.hierarchy.len() - 1;
        for rule in &self.options.aggregates {
            if let AggregateTarget::Level(level) = &rule.target {
                match self.hierarchy.level_index(level) {
                    None => {
                        return Err(ReportError::invalid_rule(level, format!("no such level in {context}")))
                    }
                    Some(index) if index == leaf => {
                        return Err(ReportError::invalid_rule(
                            level,
                            "leaf rows have no children to aggregate",
                        ))
                    }
                    Some(_) => {}
                }
                // Children of a collapsed group are hidden rows.
                if rule.ignore_hidden {
                    return Err(ReportError::invalid_rule(
                        level,
                        "level subtotals cannot skip hidden rows",
                    ));
                }
            }
        }
        Ok(())
    }

    fn plan_columns(&self, registry: &FormatRegistry) -> Result<Vec<Vec<ColumnPlan<'_>>>> {
        self.hierarchy
            .levels()
            .iter()
            .map(|level| {
                let target = AggregateTarget::Level(level.name.clone());
                self.header
                    .iter()
                    .map(|column| {
                        Ok(ColumnPlan {
                            style: ColumnStyle::select(
                                &self.options.column_rules,
                                registry,
                                column,
                                Some(&level.name),
                                RowKind::Data,
                            )?,
                            link: self
                                .options
                                .links
                                .iter()
                                .rev()
                                .find(|l| l.applies(column, Some(&level.name))),
                            source: level.dataset.column_index(column),
                            aggregate: aggregate_for(&self.options.aggregates, column, &target),
                        })
                    })
                    .collect()
            })
            .collect()
    }

    fn write_group(
        &self,
        builder: &mut GridBuilder,
        registry: &FormatRegistry,
        frame: &Frame,
        tree: &GroupTree,
        group: &Group,
        plans: &[ColumnPlan<'_>],
    ) -> Result<()> {
        let dataset = &self.hierarchy.levels()[group.level].dataset;
        let child_rows: Vec<RowNum> = group.children.iter().map(|c| tree.get(*c).row).collect();

        for (i, plan) in plans.iter().enumerate() {
            let col = frame.col(i)?;
            if let Some(rule) = plan.aggregate {
                let formula = match &rule.op {
                    AggregateOp::Function(function) => aggregate::compute(
                        *function,
                        &ColumnRefs::rows(col, child_rows.iter().copied()),
                        rule.ignore_hidden,
                    )?,
                    AggregateOp::Custom { template, functions } => {
                        aggregate::compute_custom(template, functions, rule.ignore_hidden, |name| {
                            let index = self
                                .header
                                .iter()
                                .position(|h| h == name)
                                .ok_or_else(|| ReportError::column_not_found(name, "table header"))?;
                            Ok(ColumnRefs::rows(frame.col(index)?, child_rows.iter().copied()))
                        })?
                    }
                };
                let style = plan.style.fallback(registry)?.map(|s| builder.intern(s));
                builder.write(group.row, col, CellContent::Formula(formula), style)?;
                continue;
            }

            let empty = CellValue::Empty;
            let value = plan
                .source
                .map_or(&empty, |source| dataset.value(group.source_row, source));
            write_data_cell(
                builder,
                registry,
                group.row,
                col,
                value,
                &plan.style,
                plan.link,
                dataset.row(group.source_row),
            )?;
        }
        Ok(())
    }

    /// Rows a total-row aggregate reads, per header column: every row of the
    /// shallowest level that holds the column or subtotals it, else the leaves.
    fn total_sources(&self, tree: &GroupTree, plans: &[Vec<ColumnPlan<'_>>]) -> Vec<Vec<RowNum>> {
        let leaf = self.hierarchy.len() - 1;
        (0..self.header.len())
            .map(|i| {
                let level = plans
                    .iter()
                    .position(|level| level[i].aggregate.is_some() || level[i].source.is_some())
                    .unwrap_or(leaf);
                tree.iter()
                    .filter(|(_, g)| g.level == level)
                    .map(|(_, g)| g.row)
                    .collect()
            })
            .collect()
    }

    /// Conditional highlights and validations over each level's rows.
    fn write_level_ranges(
        &self,
        builder: &mut GridBuilder,
        frame: &Frame,
        tree: &GroupTree,
        plans: &[Vec<ColumnPlan<'_>>],
    ) -> Result<()> {
        for (index, level) in self.hierarchy.levels().iter().enumerate() {
            let runs: Vec<RowSpan> =
                RowSpan::runs(tree.iter().filter(|(_, g)| g.level == index).map(|(_, g)| g.row));
            for (i, column) in self.header.iter().enumerate() {
                let col: ColNum = frame.col(i)?;
                write_highlights(builder, &plans[index][i].style, col, &runs);
                let validation = self
                    .options
                    .validations
                    .iter()
                    .rev()
                    .find(|v| v.applies(column, Some(&level.name)));
                if let Some(rule) = validation {
                    write_validation(builder, rule, col, &runs);
                }
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GroupingInstruction;
    use crate::rules::{ColumnRule, LinkSource, TotalPosition, ValidationRule};
    use crate::types::{Column, Dataset};
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeMap, HashSet};

    const HEADER: [&str; 4] = ["Department", "Team", "Employee", "Salary"];

    fn company() -> Hierarchy {
        Hierarchy::from_named_levels([
            (
                "Department",
                Dataset::new(vec![Column::new("Department", ["Engineering", "Sales"])]).unwrap(),
            ),
            (
                "Team",
                Dataset::new(vec![
                    Column::new("Department", ["Engineering", "Engineering", "Sales"]),
                    Column::new("Team", ["Backend", "Frontend", "Field"]),
                ])
                .unwrap(),
            ),
            (
                "Employee",
                Dataset::new(vec![
                    Column::new("Department", ["Engineering", "Engineering", "Sales"]),
                    Column::new("Team", ["Backend", "Frontend", "Field"]),
                    Column::new("Employee", ["Ada", "Grace", "Linus"]),
                    Column::new("Salary", [150.0, 140.0, 90.0]),
                ])
                .unwrap(),
            ),
        ])
        .unwrap()
    }

    fn with_subtotals() -> CollapsibleTable {
        CollapsibleTable::new("org", HEADER, company())
            .aggregate(AggregateRule::new(["Salary"], "SUM").unwrap().at_level("Team"))
            .aggregate(AggregateRule::new(["Salary"], "SUM").unwrap().at_level("Department"))
            .aggregate(AggregateRule::new(["Salary"], "SUM").unwrap())
            .total_row(TotalPosition::Bottom)
            .total_value("Department", "Total")
    }

    fn formula(grid: &TableGrid, row: RowNum, col: ColNum) -> &str {
        grid.cell(row, col)
            .and_then(|c| c.content.formula())
            .unwrap_or_default()
    }

    #[test]
    fn one_row_per_group_in_preorder() {
        let registry = FormatRegistry::default();
        let grid = with_subtotals().build(&registry).unwrap();

        let names: Vec<String> = (1..=8)
            .map(|row| {
                (0..3)
                    .filter_map(|col| grid.cell(row, col))
                    .filter_map(|c| c.content.value())
                    .filter(|v| !v.is_empty())
                    .map(ToString::to_string)
                    .last()
                    .unwrap_or_default()
            })
            .collect();
        assert_eq!(
            names,
            vec!["Engineering", "Backend", "Ada", "Frontend", "Grace", "Sales", "Field", "Linus"]
        );

        let positions: HashSet<_> = grid.cells.iter().map(|c| (c.row, c.col)).collect();
        assert_eq!(positions.len(), grid.cells.len());
    }

    #[test]
    fn subtotals_reference_direct_children_only() {
        let registry = FormatRegistry::default();
        let grid = with_subtotals().build(&registry).unwrap();
        assert_eq!(formula(&grid, 1, 3), "=SUM(D3,D5)");
        assert_eq!(formula(&grid, 2, 3), "=SUM(D4)");
        assert_eq!(formula(&grid, 6, 3), "=SUM(D8)");
        assert_eq!(formula(&grid, 9, 3), "=SUM(D2,D7)");
        assert_eq!(
            grid.cell(3, 3).unwrap().content,
            CellContent::Value(CellValue::Number(150.0))
        );
        assert_eq!(
            grid.cell(9, 0).unwrap().content,
            CellContent::Value(CellValue::from("Total"))
        );
    }

    #[test]
    fn total_without_subtotals_reads_the_rows_holding_data() {
        let registry = FormatRegistry::default();
        let hierarchy = Hierarchy::from_named_levels([
            (
                "Department",
                Dataset::new(vec![Column::new("Department", ["Engineering", "Sales"])]).unwrap(),
            ),
            (
                "Employee",
                Dataset::new(vec![
                    Column::new("Department", ["Engineering", "Engineering", "Sales"]),
                    Column::new("Employee", ["Ada", "Grace", "Linus"]),
                    Column::new("Salary", [150.0, 140.0, 90.0]),
                ])
                .unwrap(),
            ),
        ])
        .unwrap();
        let grid = CollapsibleTable::new("org", ["Department", "Employee", "Salary"], hierarchy)
            .aggregate(AggregateRule::new(["Salary", "Employee"], "COUNTA").unwrap())
            .aggregate(AggregateRule::new(["Salary"], "SUM").unwrap())
            .total_row(TotalPosition::Bottom)
            .build(&registry)
            .unwrap();

        // header 0 | Engineering 1 | Ada 2 | Grace 3 | Sales 4 | Linus 5 | total 6
        assert_eq!(grid.cell(1, 2).unwrap().content, CellContent::Value(CellValue::Empty));
        assert_eq!(formula(&grid, 6, 2), "=SUM(C3:C4,C6)");
        assert_eq!(formula(&grid, 6, 1), "=COUNTA(B3:B4,B6)");
    }

    #[test]
    fn total_reads_the_shallowest_level_with_the_column() {
        let registry = FormatRegistry::default();
        let grid = CollapsibleTable::new("org", HEADER, company())
            .aggregate(AggregateRule::new(["Salary"], "SUM").unwrap().at_level("Team"))
            .aggregate(AggregateRule::new(["Salary", "Team"], "COUNTA").unwrap())
            .aggregate(AggregateRule::new(["Salary"], "SUM").unwrap())
            .total_row(TotalPosition::Bottom)
            .build(&registry)
            .unwrap();

        // Team rows 2, 4, 7 hold the subtotals; Team names live on the same rows.
        assert_eq!(formula(&grid, 9, 3), "=SUM(D3,D5,D8)");
        assert_eq!(formula(&grid, 9, 1), "=COUNTA(B3,B5,B8)");
    }

    #[test]
    fn level_subtotals_cannot_skip_hidden_rows() {
        let registry = FormatRegistry::default();
        let hidden_level = CollapsibleTable::new("org", HEADER, company())
            .aggregate(
                AggregateRule::new(["Salary"], "SUM")
                    .unwrap()
                    .at_level("Team")
                    .ignoring_hidden(),
            )
            .build(&registry);
        assert!(matches!(hidden_level, Err(ReportError::InvalidRule { .. })));

        let hidden_total = CollapsibleTable::new("org", HEADER, company())
            .aggregate(AggregateRule::new(["Salary"], "SUM").unwrap().ignoring_hidden())
            .total_row(TotalPosition::Bottom)
            .build(&registry)
            .unwrap();
        assert_eq!(formula(&hidden_total, 9, 3), "=AGGREGATE(9,5,D4,D6,D9)");
    }

    #[test]
    fn outline_groups_skip_summary_rows() {
        let registry = FormatRegistry::default();
        let grid = with_subtotals()
            .collapse_level("Team", false)
            .build(&registry)
            .unwrap();
        assert_eq!(
            grid.groups,
            vec![
                GroupingInstruction { rows: RowSpan::new(2, 5), depth: 0, collapsed: true },
                GroupingInstruction { rows: RowSpan::single(3), depth: 1, collapsed: false },
                GroupingInstruction { rows: RowSpan::single(5), depth: 1, collapsed: false },
                GroupingInstruction { rows: RowSpan::new(7, 8), depth: 0, collapsed: true },
                GroupingInstruction { rows: RowSpan::single(8), depth: 1, collapsed: false },
            ]
        );
        assert!(grid.summary_above);
        assert_eq!(grid.layout.data_rows, Some(RowSpan::new(1, 8)));
    }

    #[test]
    fn summary_below_writes_children_first() {
        let registry = FormatRegistry::default();
        let grid = with_subtotals()
            .summary(SummaryPosition::Below)
            .build(&registry)
            .unwrap();
        // Ada 1, Backend 2, Grace 3, Frontend 4, Engineering 5, Linus 6, Field 7, Sales 8
        assert_eq!(formula(&grid, 5, 3), "=SUM(D3,D5)");
        assert_eq!(formula(&grid, 2, 3), "=SUM(D2)");
        assert_eq!(formula(&grid, 9, 3), "=SUM(D6,D9)");
        assert_eq!(grid.groups[0].rows, RowSpan::new(1, 4));
        assert!(!grid.summary_above);
    }

    #[test]
    fn level_scoped_formats_links_and_validation() {
        let registry = FormatRegistry::default();
        let table = CollapsibleTable::new("org", HEADER, company())
            .format(ColumnRule::new(["Department"], "Bold").for_levels(["Department"]))
            .format(ColumnRule::conditional(["Salary"], &["RedBackground"], &["<100"]).unwrap())
            .link(
                LinkRule::new(
                    "Employee",
                    LinkSource::Lookup(BTreeMap::from([(
                        "Ada".to_string(),
                        "https://people/ada".to_string(),
                    )])),
                )
                .at_level("Employee"),
            )
            .validate(ValidationRule::new("Team", ["Backend", "Frontend", "Field"]).at_level("Team"));
        let grid = table.build(&registry).unwrap();

        let summary = grid.cell(1, 0).unwrap();
        assert_eq!(grid.style(summary.style.unwrap()), Some(registry.resolve("Bold").unwrap()));
        assert_eq!(grid.cell(3, 0).unwrap().style, None);

        assert_eq!(
            grid.cell(3, 2).unwrap().content.formula(),
            Some("=HYPERLINK(\"https://people/ada\",\"Ada\")")
        );
        assert!(grid.cell(5, 2).unwrap().content.value().is_some());

        let team_rows: Vec<RowSpan> = grid.validations.iter().map(|v| v.rows).collect();
        assert_eq!(team_rows, vec![RowSpan::single(2), RowSpan::single(4), RowSpan::single(7)]);

        // Unscoped highlight covers every level's Salary rows.
        let covered: u32 = grid.conditional_formats.iter().map(|c| c.rows.len()).sum();
        assert_eq!(covered, 8);
    }

    #[test]
    fn orphan_key_produces_no_grid() {
        let hierarchy = Hierarchy::from_named_levels([
            ("Department", Dataset::new(vec![Column::new("Department", ["Engineering"])]).unwrap()),
            (
                "Team",
                Dataset::new(vec![
                    Column::new("Department", ["Engineering", "Marketing"]),
                    Column::new("Team", ["Backend", "Brand"]),
                ])
                .unwrap(),
            ),
        ])
        .unwrap();
        let result = CollapsibleTable::new("org", ["Department", "Team"], hierarchy)
            .build(&FormatRegistry::default());
        assert!(matches!(result, Err(ReportError::OrphanKey { .. })));
    }

    #[test]
    fn rule_and_level_mismatches_fail() {
        let registry = FormatRegistry::default();

        let missing_header = CollapsibleTable::new("org", ["Department", "Team", "Employee"], company())
            .build(&registry);
        assert!(matches!(
            missing_header,
            Err(ReportError::ColumnNotFound { column, .. }) if column == "Salary"
        ));

        let leaf_aggregate = CollapsibleTable::new("org", HEADER, company())
            .aggregate(AggregateRule::new(["Salary"], "SUM").unwrap().at_level("Employee"))
            .build(&registry);
        assert!(matches!(leaf_aggregate, Err(ReportError::InvalidRule { .. })));

        let unknown_level = CollapsibleTable::new("org", HEADER, company())
            .format(ColumnRule::new(["Salary"], "Num").for_levels(["Division"]))
            .build(&registry);
        assert!(matches!(unknown_level, Err(ReportError::InvalidRule { .. })));
    }
}
