//! Engine-level properties checked through the public API.

use std::collections::HashSet;

use forge_report::error::ReportError;
use forge_report::format::FormatChoice;
use forge_report::grid::RowSpan;
use forge_report::grouping::GroupId;
use forge_report::{
    apply, group, AggregateRule, CellContent, CellValue, CollapsibleTable, Column, ConfigureTable,
    Dataset, FlatTable, FormatRegistry, Hierarchy, Outline, RecordingSurface, SummaryPosition,
    TableGrid, TotalPosition,
};
use pretty_assertions::assert_eq;

// ─────────────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────────────

fn dataset(rows: usize, cols: usize) -> Dataset {
    let columns = (0..cols)
        .map(|c| {
            let values: Vec<CellValue> = (0..rows)
                .map(|r| CellValue::Number(f64::from(u32::try_from(r * 10 + c).unwrap())))
                .collect();
            Column::new(format!("C{c}"), values)
        })
        .collect();
    Dataset::new(columns).unwrap()
}

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
                Column::new("Salary", [120.0, 110.0, 90.0]),
            ])
            .unwrap(),
        ),
    ])
    .unwrap()
}

fn distinct_positions(grid: &TableGrid) -> (usize, usize, usize) {
    let cells: HashSet<_> = grid.cells.iter().map(|c| (c.row, c.col)).collect();
    (grid.row_count(), grid.column_count(), cells.len())
}

fn formula(grid: &TableGrid, row: u32, col: u16) -> Option<&str> {
    grid.cell(row, col).and_then(|c| c.content.formula())
}

// ─────────────────────────────────────────────────────────────────────────────
// Flat Tables
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn flat_table_covers_rows_and_columns_exactly_once() {
    let registry = FormatRegistry::default();
    for rows in 1..6 {
        for cols in 1..4 {
            for total in [false, true] {
                let mut table = FlatTable::new("t", dataset(rows, cols));
                if total {
                    table = table
                        .total_row(TotalPosition::Bottom)
                        .aggregate(AggregateRule::new(["C0"], "SUM").unwrap());
                }
                let grid = table.build(&registry).unwrap();
                let (row_count, col_count, unique) = distinct_positions(&grid);
                assert_eq!(row_count, rows + 1 + usize::from(total), "{rows}x{cols}");
                assert_eq!(col_count, cols);
                assert_eq!(unique, grid.cells.len(), "duplicate write in {rows}x{cols}");
            }
        }
    }
}

#[test]
fn total_formula_references_data_rows_wherever_the_total_lands() {
    let registry = FormatRegistry::default();
    let data = Dataset::new(vec![
        Column::new("Region", ["East", "West", "North"]),
        Column::new("Sales", [500.0, 50.0, 200.0]),
        Column::new("Profit", [50.0, 5.0, 20.0]),
    ])
    .unwrap();
    let sum = || AggregateRule::new(["Sales", "Profit"], "SUM").unwrap();

    let plain = FlatTable::new("t", data.clone())
        .total_row(TotalPosition::Bottom)
        .aggregate(sum())
        .build(&registry)
        .unwrap();
    assert_eq!(formula(&plain, 4, 1), Some("=SUM(B2:B4)"));
    assert_eq!(formula(&plain, 4, 2), Some("=SUM(C2:C4)"));

    let shifted = FlatTable::new("t", data)
        .at(10, 0)
        .title("Regions")
        .total_row(TotalPosition::Bottom)
        .aggregate(sum())
        .build(&registry)
        .unwrap();
    // title 10, header 11, data 12-14, total 15
    assert_eq!(formula(&shifted, 15, 1), Some("=SUM(B13:B15)"));
    assert_eq!(formula(&shifted, 15, 2), Some("=SUM(C13:C15)"));
}

#[test]
fn first_true_condition_wins_over_default() {
    let registry = FormatRegistry::default();
    let choices = [
        FormatChoice::when("GreenBackground", ">300".parse().unwrap()),
        FormatChoice::when("RedBackground", "<100".parse().unwrap()),
    ];
    let red = registry.resolve("RedBackground").unwrap();
    let selected = registry
        .resolve_conditional(&choices, Some("Num"), &CellValue::Number(50.0))
        .unwrap();
    assert_eq!(selected, Some(red));

    let neither = registry
        .resolve_conditional(&choices, Some("Num"), &CellValue::Number(200.0))
        .unwrap();
    assert_eq!(neither, Some(registry.resolve("Num").unwrap()));
    let bare = registry
        .resolve_conditional(&choices, None, &CellValue::Number(200.0))
        .unwrap();
    assert_eq!(bare, None);
}

// ─────────────────────────────────────────────────────────────────────────────
// Grouping
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn tree_depth_and_leaf_rows_match_hierarchy() {
    let hierarchy = company();
    let tree = group(&hierarchy, &Outline::default()).unwrap();
    assert_eq!(tree.depth(), hierarchy.len());
    assert!(tree.roots().iter().all(|id| tree.get(*id).depth == 0));

    let leaf_rows: u32 = tree
        .iter()
        .filter(|(_, g)| g.is_leaf())
        .map(|(_, g)| g.rows.len())
        .sum();
    let leaf_level_rows = hierarchy.levels().last().unwrap().dataset.row_count();
    assert_eq!(leaf_rows as usize, leaf_level_rows);
}

#[test]
fn parent_range_is_union_of_children() {
    let tree = group(&company(), &Outline::default()).unwrap();
    let children_union = |id: GroupId| {
        let g = tree.get(id);
        let first = tree.get(g.children[0]).rows.first;
        let last = tree.get(*g.children.last().unwrap()).rows.last;
        let size: u32 = g.children.iter().map(|c| tree.get(*c).rows.len()).sum();
        (RowSpan::new(first, last), size)
    };

    let engineering = tree.roots()[0];
    let sales = tree.roots()[1];
    assert_eq!(tree.get(engineering).children.len(), 2);
    assert_eq!(tree.get(sales).children.len(), 1);

    for id in [engineering, sales] {
        let g = tree.get(id);
        let (union, size) = children_union(id);
        assert_eq!(Some(union), g.rows.without_first());
        assert_eq!(size + 1, g.rows.len());
    }
    assert_eq!(tree.get(engineering).rows, RowSpan::new(0, 4));
    assert_eq!(tree.get(sales).rows, RowSpan::new(5, 7));
}

#[test]
fn collapse_range_excludes_summary_row() {
    let hierarchy = Hierarchy::from_named_levels([
        ("Region", Dataset::new(vec![Column::new("Region", ["East"])]).unwrap()),
        (
            "Store",
            Dataset::new(vec![
                Column::new("Region", ["East", "East", "East", "East"]),
                Column::new("Store", ["a", "b", "c", "d"]),
            ])
            .unwrap(),
        ),
    ])
    .unwrap();
    let outline = Outline {
        first_row: 5,
        ..Outline::default()
    };
    let tree = group(&hierarchy, &outline).unwrap();
    assert_eq!(tree.get(tree.roots()[0]).rows, RowSpan::new(5, 9));
    let instructions = tree.grouping_instructions();
    assert_eq!(instructions.len(), 1);
    assert_eq!(instructions[0].rows, RowSpan::new(6, 9));
}

#[test]
fn summary_below_mirrors_summary_above() {
    let registry = FormatRegistry::default();
    let build = |position| {
        CollapsibleTable::new("org", ["Department", "Team", "Employee", "Salary"], company())
            .summary(position)
            .build(&registry)
            .unwrap()
    };
    let above = build(SummaryPosition::Above);
    let below = build(SummaryPosition::Below);

    assert_eq!(above.cells.len(), below.cells.len());
    assert_eq!(above.groups.len(), below.groups.len());
    for (a, b) in above.groups.iter().zip(&below.groups) {
        assert_eq!(a.rows.len(), b.rows.len());
        assert_eq!(a.depth, b.depth);
    }
    assert!(above.summary_above);
    assert!(!below.summary_above);
}

#[test]
fn orphan_key_fails_before_any_write() {
    let registry = FormatRegistry::default();
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

    let mut surface = RecordingSurface::new();
    let result = CollapsibleTable::new("org", ["Department", "Team"], hierarchy)
        .build(&registry)
        .and_then(|grid| apply(&grid, &mut surface));

    assert!(matches!(result, Err(ReportError::OrphanKey { ref level, .. }) if level == "Team"));
    assert_eq!(surface.writes().count(), 0);
    assert!(surface.calls.is_empty());
}

#[test]
fn level_totals_sum_direct_children() {
    let registry = FormatRegistry::default();
    let grid = CollapsibleTable::new("org", ["Department", "Team", "Employee", "Salary"], company())
        .aggregate(AggregateRule::new(["Salary"], "SUM").unwrap().at_level("Department"))
        .aggregate(AggregateRule::new(["Salary"], "SUM").unwrap().at_level("Team"))
        .build(&registry)
        .unwrap();

    // header 0 | Engineering 1 | Backend 2 | Ada 3 | Frontend 4 | Grace 5 | Sales 6 | Field 7 | Linus 8
    assert_eq!(formula(&grid, 1, 3), Some("=SUM(D3,D5)"));
    assert_eq!(formula(&grid, 2, 3), Some("=SUM(D4)"));
    assert_eq!(formula(&grid, 6, 3), Some("=SUM(D8)"));
    assert_eq!(
        grid.cell(3, 3).map(|c| &c.content),
        Some(&CellContent::Value(CellValue::Number(120.0)))
    );
}
