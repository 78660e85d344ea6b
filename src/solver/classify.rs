// src/solver/classify.rs
// Decides whether a solver line is arithmetic, a currency question, or neither

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

static RE_CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s+([a-z]{3})\s+(?:in|to)\s+([a-z]{3})\b").expect("valid regex")
});
static RE_MATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d\s*[+\-*/]|[+\-*/]\s*\d|%|(?i:\b(?:sqrt|squared|cubed)\b)").expect("valid regex")
});

/// Amount and ISO codes pulled out of `<number> <CODE> in|to <CODE>`
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyQuery {
    pub amount: f64,
    pub from: String,
    pub to: String,
}

/// What kind of solve a line asks for
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Math,
    Currency(CurrencyQuery),
    None,
}

impl Classification {
    pub fn is_none(&self) -> bool {
        matches!(self, Classification::None)
    }
}

/// A line that ends in `=`, with the expression before it
#[derive(Debug, Clone, PartialEq)]
pub struct SolverLine<'a> {
    pub expression: &'a str,
    /// Character columns of `expression` within the original line
    pub span: Range<usize>,
}

/// Split a line ending in `=` (trailing whitespace allowed) into its expression.
///
/// Returns `None` for lines without the trailing `=`.
pub fn parse_solver_line(line: &str) -> Option<SolverLine<'_>> {
    let body = line.trim_end().strip_suffix('=')?;
    let expression = body.trim();
    let leading = body.len() - body.trim_start().len();
    let start = line[..leading].chars().count();
    let end = start + expression.chars().count();
    Some(SolverLine {
        expression,
        span: start..end,
    })
}

/// Classify an expression (the line without its trailing `=`).
///
/// Currency wins over math so `5 EUR to USD` is never read as arithmetic.
pub fn classify(expression: &str) -> Classification {
    if let Some(query) = currency_query(expression) {
        return Classification::Currency(query);
    }
    if RE_MATH.is_match(expression) {
        return Classification::Math;
    }
    Classification::None
}

fn currency_query(expression: &str) -> Option<CurrencyQuery> {
    let caps = RE_CURRENCY.captures(expression)?;
    let amount = caps.get(1)?.as_str().parse::<f64>().ok()?;
    Some(CurrencyQuery {
        amount,
        from: caps.get(2)?.as_str().to_ascii_uppercase(),
        to: caps.get(3)?.as_str().to_ascii_uppercase(),
    })
}
