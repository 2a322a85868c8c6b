//! Format registry and the first-match condition evaluator.
//!
//! Formats are referenced by symbolic name (`"Percent"`, `"GreenBackground"`)
//! and resolved to a [`StyleDescriptor`]. Conditions are evaluated at
//! generation time against a cell's own value, except for background
//! highlight formats, which the builders turn into spreadsheet-native
//! conditional formats so they stay live after the file is edited.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};
use crate::types::CellValue;

// ─────────────────────────────────────────────────────────────────────────────
// Style Descriptors
// ─────────────────────────────────────────────────────────────────────────────

/// Horizontal alignment of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizontalAlign {
    Left,
    Center,
    Right,
}

/// Number format: a format string or one of Excel's built-in indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum NumFormat {
    Custom(String),
    Builtin(u8),
}

/// Backend-neutral description of a cell style.
///
/// Colours are `0xRRGGBB`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub struct StyleDescriptor {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub text_wrap: bool,
    pub border: bool,
    pub align: Option<HorizontalAlign>,
    pub num_format: Option<NumFormat>,
    pub font_color: Option<u32>,
    pub bg_color: Option<u32>,
}

impl StyleDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    #[must_use]
    pub const fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    #[must_use]
    pub const fn underline(mut self) -> Self {
        self.underline = true;
        self
    }

    #[must_use]
    pub const fn wrap(mut self) -> Self {
        self.text_wrap = true;
        self
    }

    #[must_use]
    pub const fn border(mut self) -> Self {
        self.border = true;
        self
    }

    #[must_use]
    pub const fn align(mut self, align: HorizontalAlign) -> Self {
        self.align = Some(align);
        self
    }

    #[must_use]
    pub fn num_format(mut self, format: &str) -> Self {
        self.num_format = Some(NumFormat::Custom(format.to_string()));
        self
    }

    #[must_use]
    pub fn num_format_index(mut self, index: u8) -> Self {
        self.num_format = Some(NumFormat::Builtin(index));
        self
    }

    #[must_use]
    pub const fn font_color(mut self, rgb: u32) -> Self {
        self.font_color = Some(rgb);
        self
    }

    #[must_use]
    pub const fn bg_color(mut self, rgb: u32) -> Self {
        self.bg_color = Some(rgb);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conditions
// ─────────────────────────────────────────────────────────────────────────────

/// Placeholder standing for the cell's own value in condition text.
pub const COLUMN_PLACEHOLDER: &str = "_column_";

/// Comparison operator of a [`Condition::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

/// A scalar test against a cell's own value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Condition {
    Compare { op: CompareOp, operand: CellValue },
    InSet(Vec<CellValue>),
}

impl Condition {
    /// Evaluates the condition with `value` bound to the placeholder.
    ///
    /// Values of different types never compare, so an ordering test against
    /// text or an empty cell is simply false.
    pub fn evaluate(&self, value: &CellValue) -> bool {
        match self {
            Self::Compare { op, operand } => {
                let Some(ordering) = compare(value, operand) else {
                    return *op == CompareOp::Ne;
                };
                match op {
                    CompareOp::Eq => ordering == Ordering::Equal,
                    CompareOp::Ne => ordering != Ordering::Equal,
                    CompareOp::Gt => ordering == Ordering::Greater,
                    CompareOp::Ge => ordering != Ordering::Less,
                    CompareOp::Lt => ordering == Ordering::Less,
                    CompareOp::Le => ordering != Ordering::Greater,
                }
            }
            Self::InSet(values) => values
                .iter()
                .any(|candidate| compare(value, candidate) == Some(Ordering::Equal)),
        }
    }

    /// Spreadsheet formula (without `=`) testing `cell`, e.g. `B3>300`.
    pub fn to_formula(&self, cell: &str) -> String {
        match self {
            Self::Compare { op, operand } => {
                let symbol = match op {
                    CompareOp::Eq => "=",
                    CompareOp::Ne => "<>",
                    other => other.symbol(),
                };
                format!("{cell}{symbol}{}", formula_literal(operand))
            }
            Self::InSet(values) if values.is_empty() => "FALSE".to_string(),
            Self::InSet(values) => {
                let tests: Vec<String> = values
                    .iter()
                    .map(|v| format!("{cell}={}", formula_literal(v)))
                    .collect();
                format!("OR({})", tests.join(","))
            }
        }
    }
}

fn formula_literal(value: &CellValue) -> String {
    match value {
        CellValue::Empty => "\"\"".to_string(),
        CellValue::Bool(b) => String::from(if *b { "TRUE" } else { "FALSE" }),
        CellValue::Number(n) => n.to_string(),
        CellValue::Date(d) => d.format("DATE(%Y,%-m,%-d)").to_string(),
        CellValue::Text(s) => format!("\"{}\"", s.replace('"', "\"\"")),
    }
}

fn compare(left: &CellValue, right: &CellValue) -> Option<Ordering> {
    match (left, right) {
        (CellValue::Number(a), CellValue::Number(b)) => a.partial_cmp(b),
        (CellValue::Text(a), CellValue::Text(b)) => Some(a.cmp(b)),
        (CellValue::Date(a), CellValue::Date(b)) => Some(a.cmp(b)),
        (CellValue::Bool(a), CellValue::Bool(b)) => Some(a.cmp(b)),
        (CellValue::Empty, CellValue::Empty) => Some(Ordering::Equal),
        _ => None,
    }
}

impl FromStr for Condition {
    type Err = ReportError;

    fn from_str(text: &str) -> Result<Self> {
        let invalid = |reason: &str| ReportError::InvalidCondition {
            text: text.to_string(),
            reason: reason.to_string(),
        };

        let mut rest = text.trim();
        if let Some(stripped) = rest.strip_prefix(COLUMN_PLACEHOLDER) {
            rest = stripped.trim_start();
        }
        if rest.is_empty() {
            return Err(invalid("missing operator"));
        }

        if let Some(list) = strip_keyword(rest, "in") {
            let inner = list
                .strip_prefix('[')
                .and_then(|l| l.strip_suffix(']'))
                .ok_or_else(|| invalid("expected a [..] list after 'in'"))?;
            let values = split_list(inner)
                .into_iter()
                .map(|item| parse_literal(item).ok_or_else(|| invalid("unterminated string")))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Self::InSet(values));
        }

        const OPERATORS: [(&str, CompareOp); 7] = [
            (">=", CompareOp::Ge),
            ("<=", CompareOp::Le),
            ("!=", CompareOp::Ne),
            ("==", CompareOp::Eq),
            ("=", CompareOp::Eq),
            (">", CompareOp::Gt),
            ("<", CompareOp::Lt),
        ];
        let (op, operand) = OPERATORS
            .iter()
            .find_map(|(symbol, op)| rest.strip_prefix(symbol).map(|r| (*op, r.trim())))
            .ok_or_else(|| invalid("expected one of ==, !=, >, >=, <, <=, in"))?;
        if operand.is_empty() {
            return Err(invalid("missing operand"));
        }
        let operand = parse_literal(operand).ok_or_else(|| invalid("unterminated string"))?;
        Ok(Self::Compare { op, operand })
    }
}

impl TryFrom<String> for Condition {
    type Error = ReportError;

    fn try_from(text: String) -> Result<Self> {
        text.parse()
    }
}

impl From<Condition> for String {
    fn from(condition: Condition) -> Self {
        condition.to_string()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { op, operand } => {
                write!(f, "{COLUMN_PLACEHOLDER} {} {}", op.symbol(), literal(operand))
            }
            Self::InSet(values) => {
                write!(f, "{COLUMN_PLACEHOLDER} in [")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&literal(value))?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A condition that holds only while none of `unless` does.
///
/// Used for highlight formats declared after static choices of the same
/// rule, so the first true choice still wins inside the spreadsheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardedCondition {
    pub condition: Condition,
    pub unless: Vec<Condition>,
}

impl GuardedCondition {
    pub fn evaluate(&self, value: &CellValue) -> bool {
        self.condition.evaluate(value) && !self.unless.iter().any(|c| c.evaluate(value))
    }

    /// Spreadsheet formula (without `=`), e.g. `AND(NOT(B3>0),B3>300)`.
    pub fn to_formula(&self, cell: &str) -> String {
        if self.unless.is_empty() {
            return self.condition.to_formula(cell);
        }
        let guards: Vec<String> = self
            .unless
            .iter()
            .map(|c| format!("NOT({})", c.to_formula(cell)))
            .collect();
        format!("AND({},{})", guards.join(","), self.condition.to_formula(cell))
    }
}

impl From<Condition> for GuardedCondition {
    fn from(condition: Condition) -> Self {
        Self {
            condition,
            unless: Vec::new(),
        }
    }
}

impl fmt::Display for GuardedCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.condition)?;
        for (i, guard) in self.unless.iter().enumerate() {
            f.write_str(if i == 0 { " unless " } else { " or " })?;
            write!(f, "{guard}")?;
        }
        Ok(())
    }
}

fn literal(value: &CellValue) -> String {
    match value {
        CellValue::Text(s) => format!("'{}'", s.replace('\'', "\\'")),
        CellValue::Empty => "''".to_string(),
        other => other.to_string(),
    }
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &text[keyword.len()..];
    (rest.starts_with(char::is_whitespace) || rest.starts_with('[')).then(|| rest.trim_start())
}

/// Splits a list body on commas that sit outside quotes.
fn split_list(inner: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in inner.char_indices() {
        match (quote, ch) {
            (None, '\'' | '"') => quote = Some(ch),
            (Some(q), c) if c == q => quote = None,
            (None, ',') => {
                items.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = inner[start..].trim();
    if !last.is_empty() || !items.is_empty() {
        items.push(last);
    }
    items
}

/// Parses a literal operand; `None` means an unterminated quoted string.
fn parse_literal(text: &str) -> Option<CellValue> {
    let text = text.trim();
    for quote in ['\'', '"'] {
        if let Some(body) = text.strip_prefix(quote) {
            return body
                .strip_suffix(quote)
                .map(|s| CellValue::Text(s.replace(&format!("\\{quote}"), &quote.to_string())));
        }
    }
    if text.eq_ignore_ascii_case("true") {
        return Some(CellValue::Bool(true));
    }
    if text.eq_ignore_ascii_case("false") {
        return Some(CellValue::Bool(false));
    }
    if let Ok(n) = text.parse::<f64>() {
        return Some(CellValue::Number(n));
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(CellValue::Date(d));
    }
    Some(CellValue::Text(text.to_string()))
}

/// One (condition, format) pair of a column rule.
///
/// A choice without a condition always matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatChoice {
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl FormatChoice {
    pub fn always(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            condition: None,
        }
    }

    pub fn when(format: impl Into<String>, condition: Condition) -> Self {
        Self {
            format: format.into(),
            condition: Some(condition),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct FormatEntry {
    style: StyleDescriptor,
    highlight: bool,
}

/// Maps format names to styles.
///
/// Built once (usually via [`FormatRegistry::default`]) and then shared by
/// reference with every builder.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    entries: HashMap<String, FormatEntry>,
}

const RED_FILL: u32 = 0x00F2_5757;
const GREEN_FILL: u32 = 0x0057_F257;
const YELLOW_FILL: u32 = 0x00F2_F257;
const ORANGE: u32 = 0x00FF_A500;
const RED: u32 = 0x00FF_0000;
const BLUE: u32 = 0x0000_00FF;

const DATETIME: &str = "m/d/yyyy h:mm:ss AM/PM";
const DATE: &str = "m/d/yyyy";
const TIME: &str = "h:mm:ss AM/PM";

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FormatRegistry {
    /// Creates a registry with no formats.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Creates a registry holding the built-in report formats.
    pub fn with_builtins() -> Self {
        let s = StyleDescriptor::new;
        let mut registry = Self::empty();

        registry.register("Blank", s());
        registry.register("Bold", s().bold());
        registry.register("BoldWrapped", s().bold().wrap());
        registry.register("MergeCenter", s().bold().border().align(HorizontalAlign::Center));
        registry.register("MergeLeft", s().bold().border().align(HorizontalAlign::Left));
        registry.register("MergeRight", s().bold().border().align(HorizontalAlign::Right));
        registry.register("Num", s().num_format("#,##0"));
        registry.register("BoldNum", s().bold().num_format("#,##0"));
        registry.register("TwoDecimalNum", s().num_format("#,##0.00"));
        registry.register("TwoDecimalNumBold", s().bold().num_format("#,##0.00"));
        registry.register("Currency", s().num_format("$#,##0.00"));
        registry.register("Link", s().underline().font_color(BLUE));
        registry.register("Percent", s().num_format("0%"));
        registry.register("PercentBold", s().bold().num_format("0%"));
        registry.register("OrangePercent", s().font_color(ORANGE).num_format("0%"));
        registry.register("RedPercent", s().font_color(RED).num_format("0%"));
        registry.register("DateFormat", s().num_format("mm/dd/yyyy"));
        registry.register("Date", s().num_format(DATE));
        registry.register("DateBold", s().bold().num_format(DATE));
        registry.register("Datetime", s().num_format(DATETIME));
        registry.register("DatetimeBold", s().bold().num_format(DATETIME));
        registry.register("Time", s().num_format(TIME));
        registry.register("TimeBold", s().bold().num_format(TIME));
        registry.register("AccountingNoSign", s().num_format_index(43));
        registry.register("AccountingNoSignBold", s().bold().num_format_index(43));
        registry.register("AccountingNoSignGreen", s().num_format_index(43).bg_color(GREEN_FILL));
        registry.register("AccountingNoSignRed", s().num_format_index(43).bg_color(RED_FILL));
        registry.register("Accounting", s().num_format_index(44));
        registry.register("AccountingBold", s().bold().num_format_index(44));
        registry.register("AccountingGreen", s().num_format_index(44).bg_color(GREEN_FILL));
        registry.register("AccountingRed", s().num_format_index(44).bg_color(RED_FILL));

        let highlight = s().num_format("#,##0.00");
        registry.register_highlight("RedBackground", highlight.clone().bg_color(RED_FILL));
        registry.register_highlight("GreenBackground", highlight.clone().bg_color(GREEN_FILL));
        registry.register_highlight("YellowBackground", highlight.bg_color(YELLOW_FILL));

        registry
    }

    /// Registers (or replaces) a static format.
    pub fn register(&mut self, name: impl Into<String>, style: StyleDescriptor) -> &mut Self {
        self.entries.insert(
            name.into(),
            FormatEntry {
                style,
                highlight: false,
            },
        );
        self
    }

    /// Registers (or replaces) a background-highlight format.
    ///
    /// Conditional uses of a highlight format become spreadsheet-native
    /// conditional formats instead of being evaluated at generation time.
    pub fn register_highlight(
        &mut self,
        name: impl Into<String>,
        style: StyleDescriptor,
    ) -> &mut Self {
        self.entries.insert(
            name.into(),
            FormatEntry {
                style,
                highlight: true,
            },
        );
        self
    }

    /// Resolves a format name.
    pub fn resolve(&self, name: &str) -> Result<&StyleDescriptor> {
        self.entry(name).map(|e| &e.style)
    }

    /// Reports whether `name` is a background-highlight format.
    pub fn is_highlight(&self, name: &str) -> Result<bool> {
        self.entry(name).map(|e| e.highlight)
    }

    /// Returns the style of the first choice whose condition holds for `value`.
    ///
    /// Choices are tried in declaration order. When none matches, the default
    /// format applies if one was given; otherwise the cell keeps no style.
    /// Every referenced name is checked, so an unknown format fails even when
    /// an earlier choice already matched.
    pub fn resolve_conditional(
        &self,
        choices: &[FormatChoice],
        default: Option<&str>,
        value: &CellValue,
    ) -> Result<Option<&StyleDescriptor>> {
        let mut selected = None;
        for choice in choices {
            let style = self.resolve(&choice.format)?;
            if selected.is_none() && choice.condition.as_ref().is_none_or(|c| c.evaluate(value)) {
                selected = Some(style);
            }
        }
        let default = default.map(|name| self.resolve(name)).transpose()?;
        Ok(selected.or(default))
    }

    /// Returns all registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn entry(&self, name: &str) -> Result<&FormatEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| ReportError::UnknownFormat(name.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(text: &str) -> Condition {
        text.parse().unwrap()
    }

    #[test]
    fn parses_comparisons_with_and_without_placeholder() {
        assert_eq!(
            cond(">300"),
            Condition::Compare {
                op: CompareOp::Gt,
                operand: CellValue::Number(300.0)
            }
        );
        assert_eq!(cond("_column_ >= 10"), cond(">=10"));
        assert_eq!(
            cond("_column_ == 'Open'"),
            Condition::Compare {
                op: CompareOp::Eq,
                operand: CellValue::from("Open")
            }
        );
    }

    #[test]
    fn parses_membership_lists() {
        assert_eq!(
            cond("_column_ in ['Open', \"Closed, pending\", 3]"),
            Condition::InSet(vec![
                CellValue::from("Open"),
                CellValue::from("Closed, pending"),
                CellValue::Number(3.0),
            ])
        );
    }

    #[test]
    fn rejects_malformed_conditions() {
        assert!("_column_".parse::<Condition>().is_err());
        assert!("~ 4".parse::<Condition>().is_err());
        assert!("> 'open".parse::<Condition>().is_err());
        assert!("in 'a'".parse::<Condition>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for text in ["_column_ > 300", "_column_ != 'x'", "_column_ in ['a', 'b']"] {
            assert_eq!(cond(text).to_string(), text);
        }
    }

    #[test]
    fn evaluates_typed_comparisons() {
        assert!(cond(">300").evaluate(&CellValue::Number(301.0)));
        assert!(!cond(">300").evaluate(&CellValue::from("abc")));
        assert!(cond("!= 5").evaluate(&CellValue::from("abc")));
        assert!(cond("<= 2024-01-31").evaluate(&CellValue::infer("2024-01-01")));
        assert!(cond("in ['East', 'West']").evaluate(&CellValue::from("West")));
        assert!(!cond("in ['East', 'West']").evaluate(&CellValue::Empty));
    }

    #[test]
    fn compiles_to_spreadsheet_formulas() {
        assert_eq!(cond(">300").to_formula("B3"), "B3>300");
        assert_eq!(cond("!= 'Closed'").to_formula("C2"), "C2<>\"Closed\"");
        assert_eq!(cond("== 2024-01-05").to_formula("A2"), "A2=DATE(2024,1,5)");
        assert_eq!(
            cond("in ['East', 'West']").to_formula("A2"),
            "OR(A2=\"East\",A2=\"West\")"
        );
    }

    #[test]
    fn guarded_condition_yields_to_earlier_tests() {
        let plain = GuardedCondition::from(cond(">300"));
        assert_eq!(plain.to_formula("B3"), "B3>300");
        assert_eq!(plain.to_string(), "_column_ > 300");

        let guarded = GuardedCondition {
            condition: cond(">300"),
            unless: vec![cond(">1000"), cond("< 0")],
        };
        assert_eq!(guarded.to_formula("B3"), "AND(NOT(B3>1000),NOT(B3<0),B3>300)");
        assert_eq!(guarded.to_string(), "_column_ > 300 unless _column_ > 1000 or _column_ < 0");
        assert!(guarded.evaluate(&CellValue::Number(500.0)));
        assert!(!guarded.evaluate(&CellValue::Number(5000.0)));
    }

    #[test]
    fn first_true_condition_wins_over_default() {
        let registry = FormatRegistry::default();
        let choices = vec![
            FormatChoice::when("GreenBackground", cond(">300")),
            FormatChoice::when("RedBackground", cond("<100")),
        ];

        let low = registry
            .resolve_conditional(&choices, Some("Num"), &CellValue::Number(50.0))
            .unwrap();
        assert_eq!(low, Some(registry.resolve("RedBackground").unwrap()));

        let mid = registry
            .resolve_conditional(&choices, Some("Num"), &CellValue::Number(200.0))
            .unwrap();
        assert_eq!(mid, Some(registry.resolve("Num").unwrap()));

        let plain = registry
            .resolve_conditional(&choices, None, &CellValue::Number(200.0))
            .unwrap();
        assert_eq!(plain, None);
    }

    #[test]
    fn declaration_order_decides_overlapping_conditions() {
        let registry = FormatRegistry::default();
        let choices = vec![
            FormatChoice::when("Bold", cond("<100")),
            FormatChoice::when("Percent", cond("<1")),
        ];
        let style = registry
            .resolve_conditional(&choices, None, &CellValue::Number(0.5))
            .unwrap();
        assert_eq!(style, Some(registry.resolve("Bold").unwrap()));
    }

    #[test]
    fn unknown_formats_fail() {
        let registry = FormatRegistry::default();
        assert!(matches!(
            registry.resolve("Sparkly"),
            Err(ReportError::UnknownFormat(name)) if name == "Sparkly"
        ));
        let choices = vec![FormatChoice::always("Bold"), FormatChoice::always("Sparkly")];
        assert!(registry
            .resolve_conditional(&choices, None, &CellValue::Empty)
            .is_err());
    }

    #[test]
    fn highlight_flag_and_custom_registration() {
        let mut registry = FormatRegistry::default();
        assert!(registry.is_highlight("GreenBackground").unwrap());
        assert!(!registry.is_highlight("Bold").unwrap());

        registry.register("Headline", StyleDescriptor::new().bold().italic());
        assert!(registry.resolve("Headline").unwrap().italic);
        assert!(registry.names().contains(&"Headline"));
    }
}
