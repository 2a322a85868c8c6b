//! Aggregate formula synthesis.
//!
//! Produces formula text such as `=SUM(B3:B5)` or
//! `=(SUM(D3:D5)/SUM(C3:C5))`. Nothing here evaluates a formula.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{ReportError, Result};
use crate::grid::{ColNum, RowNum, RowSpan};

/// Excel's cap on arguments to a single function call.
pub const MAX_REFERENCES: usize = 255;

// ─────────────────────────────────────────────────────────────────────────────
// Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Aggregate functions available to total and summary rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AggregateFunction {
    Sum,
    Average,
    Count,
    CountA,
    Max,
    Min,
    Product,
    StdevS,
    StdevP,
    VarS,
    VarP,
    Median,
}

impl AggregateFunction {
    pub const ALL: [Self; 12] = [
        Self::Sum,
        Self::Average,
        Self::Count,
        Self::CountA,
        Self::Max,
        Self::Min,
        Self::Product,
        Self::StdevS,
        Self::StdevP,
        Self::VarS,
        Self::VarP,
        Self::Median,
    ];

    /// The spreadsheet function name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Average => "AVERAGE",
            Self::Count => "COUNT",
            Self::CountA => "COUNTA",
            Self::Max => "MAX",
            Self::Min => "MIN",
            Self::Product => "PRODUCT",
            Self::StdevS => "STDEV.S",
            Self::StdevP => "STDEV.P",
            Self::VarS => "VAR.S",
            Self::VarP => "VAR.P",
            Self::Median => "MEDIAN",
        }
    }

    /// Function number accepted by `AGGREGATE`.
    pub const fn aggregate_code(self) -> u8 {
        match self {
            Self::Average => 1,
            Self::Count => 2,
            Self::CountA => 3,
            Self::Max => 4,
            Self::Min => 5,
            Self::Product => 6,
            Self::StdevS => 7,
            Self::StdevP => 8,
            Self::Sum => 9,
            Self::VarS => 10,
            Self::VarP => 11,
            Self::Median => 12,
        }
    }
}

impl FromStr for AggregateFunction {
    type Err = ReportError;

    fn from_str(name: &str) -> Result<Self> {
        let wanted = name.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ReportError::UnsupportedAggregate(name.to_string()))
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Column References
// ─────────────────────────────────────────────────────────────────────────────

/// The cells of one column that an aggregate reads, as contiguous runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRefs {
    pub col: ColNum,
    pub runs: Vec<RowSpan>,
}

impl ColumnRefs {
    /// One contiguous span.
    pub fn span(col: ColNum, rows: RowSpan) -> Self {
        Self {
            col,
            runs: vec![rows],
        }
    }

    /// Arbitrary rows, compressed into runs.
    pub fn rows(col: ColNum, rows: impl IntoIterator<Item = RowNum>) -> Self {
        Self {
            col,
            runs: RowSpan::runs(rows),
        }
    }

    /// Comma-separated A1 references (`B3:B5` or `B6,B8:B9`).
    fn a1(&self) -> String {
        self.runs
            .iter()
            .map(|run| run.a1(self.col))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Builds the aggregate expression without the leading `=`.
///
/// With `ignore_hidden` the expression uses `AGGREGATE(code,5,...)`, which
/// skips rows hidden by filters or collapsed groups. An empty reference set
/// yields `0`.
pub fn expression(
    function: AggregateFunction,
    refs: &ColumnRefs,
    ignore_hidden: bool,
) -> Result<String> {
    if refs.runs.is_empty() {
        return Ok("0".to_string());
    }
    if refs.runs.len() > MAX_REFERENCES {
        return Err(ReportError::invalid_rule(
            function.name(),
            format!(
                "{} disjoint references exceed the limit of {MAX_REFERENCES}",
                refs.runs.len()
            ),
        ));
    }
    let args = refs.a1();
    Ok(if ignore_hidden {
        format!("AGGREGATE({},5,{args})", function.aggregate_code())
    } else {
        format!("{}({args})", function.name())
    })
}

/// Formula text for one aggregate over one column.
pub fn compute(function: AggregateFunction, refs: &ColumnRefs, ignore_hidden: bool) -> Result<String> {
    Ok(format!("={}", expression(function, refs, ignore_hidden)?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Custom Operations
// ─────────────────────────────────────────────────────────────────────────────

/// Splits a template into literal text and backtick-quoted column names.
///
/// Returns `(literals, columns)` with `literals.len() == columns.len() + 1`.
pub fn template_parts(template: &str) -> Result<(Vec<&str>, Vec<&str>)> {
    let pieces: Vec<&str> = template.split('`').collect();
    if pieces.len() % 2 == 0 {
        return Err(ReportError::invalid_rule(
            template,
            "unbalanced backticks in operation template",
        ));
    }
    let literals = pieces.iter().step_by(2).copied().collect();
    let columns: Vec<&str> = pieces.iter().skip(1).step_by(2).copied().collect();
    if let Some(empty) = columns.iter().find(|c| c.trim().is_empty()) {
        return Err(ReportError::invalid_rule(
            template,
            format!("empty column placeholder '`{empty}`'"),
        ));
    }
    Ok((literals, columns))
}

/// Expands a custom operation template into a formula.
///
/// Each `` `Column` `` placeholder becomes an aggregate over that column's
/// references. `functions` holds either one function applied to every
/// placeholder, or one function per placeholder in order.
pub fn compute_custom<F>(
    template: &str,
    functions: &[AggregateFunction],
    ignore_hidden: bool,
    mut resolve: F,
) -> Result<String>
where
    F: FnMut(&str) -> Result<ColumnRefs>,
{
    let (literals, columns) = template_parts(template)?;
    if columns.is_empty() {
        return Err(ReportError::invalid_rule(
            template,
            "operation template references no columns",
        ));
    }
    if functions.len() != 1 && functions.len() != columns.len() {
        return Err(ReportError::invalid_rule(
            template,
            format!(
                "{} placeholders but {} aggregate functions",
                columns.len(),
                functions.len()
            ),
        ));
    }

    let mut formula = String::from("=(");
    for (i, column) in columns.iter().enumerate() {
        formula.push_str(literals[i]);
        let function = functions.get(i).copied().unwrap_or(functions[0]);
        let refs = resolve(column)?;
        formula.push_str(&expression(function, &refs, ignore_hidden)?);
    }
    formula.push_str(literals[columns.len()]);
    formula.push(')');
    Ok(formula)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_function_names_case_insensitively() {
        assert_eq!("sum".parse::<AggregateFunction>().unwrap(), AggregateFunction::Sum);
        assert_eq!(
            "stdev.s".parse::<AggregateFunction>().unwrap(),
            AggregateFunction::StdevS
        );
        assert!(matches!(
            "MODE".parse::<AggregateFunction>(),
            Err(ReportError::UnsupportedAggregate(name)) if name == "MODE"
        ));
    }

    #[test]
    fn computes_contiguous_ranges() {
        let refs = ColumnRefs::span(1, RowSpan::new(2, 4));
        assert_eq!(compute(AggregateFunction::Sum, &refs, false).unwrap(), "=SUM(B3:B5)");
        assert_eq!(
            compute(AggregateFunction::Average, &refs, true).unwrap(),
            "=AGGREGATE(1,5,B3:B5)"
        );
    }

    #[test]
    fn computes_disjoint_references() {
        let refs = ColumnRefs::rows(3, [5, 7, 8]);
        assert_eq!(compute(AggregateFunction::Max, &refs, false).unwrap(), "=MAX(D6,D8:D9)");
    }

    #[test]
    fn empty_references_yield_zero() {
        let refs = ColumnRefs::rows(0, Vec::new());
        assert_eq!(compute(AggregateFunction::Sum, &refs, false).unwrap(), "=0");
    }

    #[test]
    fn too_many_references_fail() {
        let refs = ColumnRefs::rows(0, (0..600).step_by(2));
        assert!(matches!(
            compute(AggregateFunction::Sum, &refs, false),
            Err(ReportError::InvalidRule { .. })
        ));
    }

    #[test]
    fn custom_operation_expands_each_placeholder() {
        let formula = compute_custom(
            "`Profit` / `Sales`",
            &[AggregateFunction::Sum],
            false,
            |column| {
                let col = if column == "Sales" { 1 } else { 2 };
                Ok(ColumnRefs::span(col, RowSpan::new(2, 4)))
            },
        )
        .unwrap();
        assert_eq!(formula, "=(SUM(C3:C5) / SUM(B3:B5))");
    }

    #[test]
    fn custom_operation_uses_parallel_functions() {
        let formula = compute_custom(
            "`Sales` - `Sales`",
            &[AggregateFunction::Max, AggregateFunction::Min],
            false,
            |_| Ok(ColumnRefs::span(0, RowSpan::new(1, 2))),
        )
        .unwrap();
        assert_eq!(formula, "=(MAX(A2:A3) - MIN(A2:A3))");
    }

    #[test]
    fn custom_operation_checks_function_count() {
        let result = compute_custom(
            "`A` + `B` + `C`",
            &[AggregateFunction::Sum, AggregateFunction::Max],
            false,
            |_| Ok(ColumnRefs::span(0, RowSpan::single(1))),
        );
        assert!(matches!(result, Err(ReportError::InvalidRule { .. })));
        assert!(template_parts("`A` + `B").is_err());
    }
}
