//! Hierarchical grouping: turns ordered levels into an arena of groups with
//! physical row spans and outline depths.
//!
//! Every group owns exactly one output row (its summary row, or for leaf
//! groups the data row itself). A non-leaf group's span is its summary row
//! plus the spans of its children, which tile the rest of the span without
//! gaps. The engine never sorts: children appear in the order their rows
//! appear in the next level's dataset.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{OrphanReason, ReportError, Result};
use crate::grid::{GroupingInstruction, RowNum, RowSpan};
use crate::types::{Dataset, KeyTuple, Level};

/// Excel supports seven nested outline groups below the visible root rows.
pub const MAX_LEVELS: usize = 8;

/// Where a non-leaf group's summary row sits within its span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryPosition {
    /// First row of the span; collapsing hides the rows below it.
    #[default]
    Above,
    /// Last row of the span, after all children.
    Below,
}

// ─────────────────────────────────────────────────────────────────────────────
// Hierarchy
// ─────────────────────────────────────────────────────────────────────────────

/// Validated levels, root first.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    levels: Vec<Level>,
    key_indices: Vec<Vec<usize>>,
}

impl Hierarchy {
    /// Checks level count, key columns and the key prefix rule.
    pub fn new(levels: Vec<Level>) -> Result<Self> {
        if levels.is_empty() {
            return Err(ReportError::InvalidHierarchy("no levels given".to_string()));
        }
        if levels.len() > MAX_LEVELS {
            return Err(ReportError::InvalidHierarchy(format!(
                "{} levels exceed the outline limit of {MAX_LEVELS}",
                levels.len()
            )));
        }

        let mut key_indices = Vec::with_capacity(levels.len());
        for (i, level) in levels.iter().enumerate() {
            if level.key_columns.is_empty() {
                return Err(ReportError::InvalidHierarchy(format!(
                    "level '{}' has no key columns",
                    level.name
                )));
            }
            if let Some(parent) = i.checked_sub(1).map(|p| &levels[p]) {
                let extends = level.key_columns.len() > parent.key_columns.len()
                    && level.key_columns.starts_with(&parent.key_columns);
                if !extends {
                    return Err(ReportError::InvalidHierarchy(format!(
                        "key of level '{}' ({}) does not extend the key of level '{}' ({})",
                        level.name,
                        level.key_columns.join(", "),
                        parent.name,
                        parent.key_columns.join(", ")
                    )));
                }
            }
            let indices = level
                .key_columns
                .iter()
                .map(|name| {
                    level.dataset.column_index(name).ok_or_else(|| {
                        ReportError::column_not_found(name, format!("level '{}'", level.name))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            key_indices.push(indices);
        }
        Ok(Self {
            levels,
            key_indices,
        })
    }

    /// Builds levels whose names double as their key column.
    ///
    /// Level `i` is keyed on the names of levels `0..=i`.
    pub fn from_named_levels<S: Into<String>>(
        levels: impl IntoIterator<Item = (S, Dataset)>,
    ) -> Result<Self> {
        let mut keys: Vec<String> = Vec::new();
        let levels = levels
            .into_iter()
            .map(|(name, dataset)| {
                let name = name.into();
                keys.push(name.clone());
                Level::new(name, keys.clone(), dataset)
            })
            .collect();
        Self::new(levels)
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Index of the level with the given name.
    pub fn level_index(&self, name: &str) -> Option<usize> {
        self.levels.iter().position(|l| l.name == name)
    }

    fn key(&self, level: usize, row: usize) -> KeyTuple {
        self.levels[level].dataset.key(row, &self.key_indices[level])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Group Tree
// ─────────────────────────────────────────────────────────────────────────────

/// Index of a group in its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct GroupId(pub usize);

/// One node of the group tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub key: KeyTuple,
    pub level: usize,
    /// Outline depth; equals the level index.
    pub depth: usize,
    /// Row of the level's dataset this group was taken from.
    pub source_row: usize,
    /// Physical rows covered, summary row included.
    pub rows: RowSpan,
    /// The row this group writes.
    pub row: RowNum,
    /// Leaf rows below (or at) this group.
    pub leaf_count: usize,
    pub collapsed: bool,
    pub parent: Option<GroupId>,
    pub children: Vec<GroupId>,
}

impl Group {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The rows a collapse hides: the span without the summary row.
    pub fn collapsible_rows(&self, position: SummaryPosition) -> Option<RowSpan> {
        if self.is_leaf() {
            return None;
        }
        match position {
            SummaryPosition::Above => self.rows.without_first(),
            SummaryPosition::Below => self.rows.without_last(),
        }
    }
}

/// Layout settings for [`group`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outline {
    pub position: SummaryPosition,
    /// Physical row of the first group.
    pub first_row: RowNum,
    pub default_collapsed: bool,
    /// Per-level collapse overrides, by level name.
    pub collapsed_levels: HashMap<String, bool>,
}

impl Default for Outline {
    fn default() -> Self {
        Self {
            position: SummaryPosition::Above,
            first_row: 0,
            default_collapsed: true,
            collapsed_levels: HashMap::new(),
        }
    }
}

/// Groups stored in preorder, with index links.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTree {
    nodes: Vec<Group>,
    roots: Vec<GroupId>,
    levels: usize,
    position: SummaryPosition,
}

impl GroupTree {
    pub fn roots(&self) -> &[GroupId] {
        &self.roots
    }

    pub fn get(&self, id: GroupId) -> &Group {
        &self.nodes[id.0]
    }

    /// All groups in preorder (parents before children, siblings in order).
    pub fn iter(&self) -> impl Iterator<Item = (GroupId, &Group)> {
        self.nodes.iter().enumerate().map(|(i, g)| (GroupId(i), g))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of levels below and including the roots.
    pub const fn depth(&self) -> usize {
        self.levels
    }

    pub const fn position(&self) -> SummaryPosition {
        self.position
    }

    /// Rows covered by the whole tree.
    pub fn span(&self) -> Option<RowSpan> {
        let first = self.roots.first().map(|id| self.get(*id).rows.first)?;
        let last = self.roots.last().map(|id| self.get(*id).rows.last)?;
        Some(RowSpan::new(first, last))
    }

    /// Outline instructions for every non-leaf group, outer to inner.
    pub fn grouping_instructions(&self) -> Vec<GroupingInstruction> {
        self.nodes
            .iter()
            .filter_map(|g| {
                g.collapsible_rows(self.position).map(|rows| GroupingInstruction {
                    rows,
                    depth: g.depth,
                    collapsed: g.collapsed,
                })
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Grouping
// ─────────────────────────────────────────────────────────────────────────────

/// Groups a hierarchy and assigns physical rows in one left-to-right pass.
pub fn group(hierarchy: &Hierarchy, outline: &Outline) -> Result<GroupTree> {
    let children = link_levels(hierarchy)?;

    let mut placer = Placer {
        hierarchy,
        outline,
        children: &children,
        nodes: Vec::new(),
        next_row: outline.first_row,
    };
    let root_count = hierarchy.levels[0].dataset.row_count();
    let mut roots = Vec::with_capacity(root_count);
    for row in 0..root_count {
        roots.push(placer.place(0, row, None));
    }

    debug!(
        "grouped {} levels into {} groups ({} roots)",
        hierarchy.len(),
        placer.nodes.len(),
        roots.len()
    );
    Ok(GroupTree {
        nodes: placer.nodes,
        roots,
        levels: hierarchy.len(),
        position: outline.position,
    })
}

/// For each non-leaf level, the child rows of every parent row, in dataset order.
fn link_levels(hierarchy: &Hierarchy) -> Result<Vec<Vec<Vec<usize>>>> {
    let mut links = Vec::with_capacity(hierarchy.len().saturating_sub(1));
    for parent_level in 0..hierarchy.len() - 1 {
        let parent = &hierarchy.levels[parent_level];
        let child = &hierarchy.levels[parent_level + 1];
        let prefix_len = parent.key_columns.len();

        let mut index: HashMap<KeyTuple, Vec<usize>> = HashMap::new();
        for row in 0..parent.dataset.row_count() {
            index
                .entry(hierarchy.key(parent_level, row))
                .or_default()
                .push(row);
        }

        let mut children = vec![Vec::new(); parent.dataset.row_count()];
        for row in 0..child.dataset.row_count() {
            let key = hierarchy.key(parent_level + 1, row);
            match index.get(&key.prefix(prefix_len)).map(Vec::as_slice) {
                None | Some([]) => {
                    return Err(ReportError::OrphanKey {
                        level: child.name.clone(),
                        key,
                        reason: OrphanReason::NoParent,
                    })
                }
                Some([parent_row]) => children[*parent_row].push(row),
                Some(matches) => {
                    return Err(ReportError::UnmatchedChild {
                        level: child.name.clone(),
                        key,
                        matches: matches.len(),
                    })
                }
            }
        }

        if let Some(orphan) = children.iter().position(Vec::is_empty) {
            return Err(ReportError::OrphanKey {
                level: parent.name.clone(),
                key: hierarchy.key(parent_level, orphan),
                reason: OrphanReason::NoChildren,
            });
        }
        links.push(children);
    }
    Ok(links)
}

struct Placer<'a> {
    hierarchy: &'a Hierarchy,
    outline: &'a Outline,
    children: &'a [Vec<Vec<usize>>],
    nodes: Vec<Group>,
    next_row: RowNum,
}

impl Placer<'_> {
    fn take_row(&mut self) -> RowNum {
        let row = self.next_row;
        self.next_row += 1;
        row
    }

    fn place(&mut self, level: usize, source_row: usize, parent: Option<GroupId>) -> GroupId {
        let (hierarchy, outline, links) = (self.hierarchy, self.outline, self.children);
        let id = GroupId(self.nodes.len());
        let collapsed = outline
            .collapsed_levels
            .get(&hierarchy.levels[level].name)
            .copied()
            .unwrap_or(outline.default_collapsed);
        let start = self.next_row;
        self.nodes.push(Group {
            key: hierarchy.key(level, source_row),
            level,
            depth: level,
            source_row,
            rows: RowSpan::single(start),
            row: start,
            leaf_count: 1,
            collapsed,
            parent,
            children: Vec::new(),
        });

        let Some(child_rows) = links.get(level).map(|c| &c[source_row]) else {
            self.take_row();
            return id;
        };

        let summary_above = outline.position == SummaryPosition::Above;
        let mut row = if summary_above { self.take_row() } else { 0 };
        let mut children = Vec::with_capacity(child_rows.len());
        for &child in child_rows {
            children.push(self.place(level + 1, child, Some(id)));
        }
        if !summary_above {
            row = self.take_row();
        }

        let leaf_count = children.iter().map(|c| self.nodes[c.0].leaf_count).sum();
        let node = &mut self.nodes[id.0];
        node.row = row;
        node.rows = RowSpan::new(start, self.next_row - 1);
        node.leaf_count = leaf_count;
        node.children = children;
        id
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CellValue, Column};
    use pretty_assertions::assert_eq;

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
                ])
                .unwrap(),
            ),
        ])
        .unwrap()
    }

    fn child_union(tree: &GroupTree, id: GroupId) -> RowSpan {
        let group = tree.get(id);
        let first = tree.get(group.children[0]).rows.first;
        let last = tree.get(*group.children.last().unwrap()).rows.last;
        RowSpan::new(first, last)
    }

    #[test]
    fn three_level_tree_has_expected_shape() {
        let tree = group(&company(), &Outline::default()).unwrap();
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.roots().len(), 2);
        assert!(tree.iter().all(|(_, g)| g.depth == g.level));
        assert_eq!(tree.get(tree.roots()[0]).depth, 0);

        let leaves: usize = tree.iter().filter(|(_, g)| g.is_leaf()).count();
        assert_eq!(leaves, 3);
        let leaf_total: usize = tree.roots().iter().map(|id| tree.get(*id).leaf_count).sum();
        assert_eq!(leaf_total, 3);
    }

    #[test]
    fn parent_span_is_summary_plus_children() {
        let tree = group(&company(), &Outline::default()).unwrap();
        let engineering = tree.roots()[0];
        let sales = tree.roots()[1];

        assert_eq!(tree.get(engineering).children.len(), 2);
        assert_eq!(tree.get(engineering).rows, RowSpan::new(0, 4));
        assert_eq!(child_union(&tree, engineering), RowSpan::new(1, 4));
        assert_eq!(tree.get(engineering).leaf_count, 2);

        assert_eq!(tree.get(sales).children.len(), 1);
        assert_eq!(tree.get(sales).rows, RowSpan::new(5, 7));
        assert_eq!(child_union(&tree, sales), RowSpan::new(6, 7));
        assert_eq!(tree.get(sales).leaf_count, 1);

        for (id, g) in tree.iter().filter(|(_, g)| !g.is_leaf()) {
            let total: u32 = g.children.iter().map(|c| tree.get(*c).rows.len()).sum();
            assert_eq!(total + 1, g.rows.len(), "group {id:?}");
        }
    }

    #[test]
    fn instructions_exclude_summary_row() {
        let hierarchy = Hierarchy::from_named_levels([
            ("Region", Dataset::new(vec![Column::new("Region", ["West"])]).unwrap()),
            (
                "Store",
                Dataset::new(vec![
                    Column::new("Region", ["West"; 4]),
                    Column::new("Store", ["A", "B", "C", "D"]),
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
        assert_eq!(
            tree.grouping_instructions(),
            vec![GroupingInstruction {
                rows: RowSpan::new(6, 9),
                depth: 0,
                collapsed: true
            }]
        );
    }

    #[test]
    fn instructions_run_outer_to_inner() {
        let tree = group(&company(), &Outline::default()).unwrap();
        let spans: Vec<(RowSpan, usize)> = tree
            .grouping_instructions()
            .iter()
            .map(|g| (g.rows, g.depth))
            .collect();
        assert_eq!(
            spans,
            vec![
                (RowSpan::new(1, 4), 0),
                (RowSpan::single(2), 1),
                (RowSpan::single(4), 1),
                (RowSpan::new(6, 7), 0),
                (RowSpan::single(7), 1),
            ]
        );
    }

    #[test]
    fn summary_below_mirrors_above() {
        let outline = Outline {
            position: SummaryPosition::Below,
            ..Outline::default()
        };
        let tree = group(&company(), &outline).unwrap();
        let engineering = tree.get(tree.roots()[0]);
        assert_eq!(engineering.rows, RowSpan::new(0, 4));
        assert_eq!(engineering.row, 4);
        assert_eq!(tree.get(engineering.children[0]).row, 1);
        assert_eq!(tree.grouping_instructions()[0].rows, RowSpan::new(0, 3));
    }

    #[test]
    fn collapse_overrides_apply_per_level() {
        let outline = Outline {
            collapsed_levels: HashMap::from([("Team".to_string(), false)]),
            ..Outline::default()
        };
        let tree = group(&company(), &outline).unwrap();
        let flags: Vec<bool> = tree.grouping_instructions().iter().map(|g| g.collapsed).collect();
        assert_eq!(flags, vec![true, false, false, true, false]);
    }

    #[test]
    fn child_without_parent_is_an_orphan() {
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
        let err = group(&hierarchy, &Outline::default()).unwrap_err();
        match err {
            ReportError::OrphanKey { level, key, reason } => {
                assert_eq!(level, "Team");
                assert_eq!(key, KeyTuple(vec!["Marketing".into(), "Brand".into()]));
                assert_eq!(reason, OrphanReason::NoParent);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parent_without_children_is_an_orphan() {
        let hierarchy = Hierarchy::from_named_levels([
            (
                "Department",
                Dataset::new(vec![Column::new("Department", ["Engineering", "Legal"])]).unwrap(),
            ),
            (
                "Team",
                Dataset::new(vec![
                    Column::new("Department", ["Engineering"]),
                    Column::new("Team", ["Backend"]),
                ])
                .unwrap(),
            ),
        ])
        .unwrap();
        assert!(matches!(
            group(&hierarchy, &Outline::default()),
            Err(ReportError::OrphanKey { reason: OrphanReason::NoChildren, .. })
        ));
    }

    #[test]
    fn duplicate_parent_rows_are_ambiguous() {
        let hierarchy = Hierarchy::from_named_levels([
            (
                "Department",
                Dataset::new(vec![Column::new("Department", ["Engineering", "Engineering"])]).unwrap(),
            ),
            (
                "Team",
                Dataset::new(vec![
                    Column::new("Department", ["Engineering"]),
                    Column::new("Team", ["Backend"]),
                ])
                .unwrap(),
            ),
        ])
        .unwrap();
        assert!(matches!(
            group(&hierarchy, &Outline::default()),
            Err(ReportError::UnmatchedChild { matches: 2, .. })
        ));
    }

    #[test]
    fn hierarchy_validation() {
        let ds = || Dataset::new(vec![Column::new("A", [CellValue::Empty])]).unwrap();
        let not_prefix = Hierarchy::new(vec![
            Level::new("one", vec!["A".to_string()], ds()),
            Level::new("two", vec!["A".to_string()], ds()),
        ]);
        assert!(matches!(not_prefix, Err(ReportError::InvalidHierarchy(_))));

        let missing_key = Hierarchy::new(vec![Level::new("one", vec!["B".to_string()], ds())]);
        assert!(matches!(missing_key, Err(ReportError::ColumnNotFound { .. })));

        let too_deep = Hierarchy::new(
            (0..=MAX_LEVELS)
                .map(|i| Level::new(format!("l{i}"), vec!["A".to_string(); i + 1], ds()))
                .collect(),
        );
        assert!(matches!(too_deep, Err(ReportError::InvalidHierarchy(_))));
    }
}
