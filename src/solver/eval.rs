// src/solver/eval.rs
// Restricted arithmetic evaluator: + - * / parentheses, percent idioms, named ops

use regex::{Captures, Regex};
use std::sync::LazyLock;
use thiserror::Error;

use super::bindings::Bindings;
use crate::utils::{format_number, round_cents};

/// Maximum parenthesis/unary nesting accepted by the parser
const MAX_DEPTH: usize = 256;

/// Named operations, matched in any letter case
const NAMED_OPS: &[&str] = &["sqrt", "squared", "cubed"];

static RE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\b").expect("valid regex"));
static RE_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("valid regex"));

static RE_SQRT_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bsqrt\s*\(([^()]*)\)").expect("valid regex"));
static RE_SQRT_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bsqrt\s*(\d+(?:\.\d+)?)").expect("valid regex"));
static RE_POWER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?|\([^()]*\))\s*\b(squared|cubed)\b").expect("valid regex")
});

/// A plain number, or a parenthesized negative one as left by substitution
const PERCENT_OPERAND: &str = r"(\d+\.?\d*|\(-\d+\.?\d*\))";

static RE_PERCENT_ADD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{}\s*\+\s*(\d+\.?\d*)%", PERCENT_OPERAND)).expect("valid regex")
});
static RE_PERCENT_SUB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{}\s*-\s*(\d+\.?\d*)%", PERCENT_OPERAND)).expect("valid regex")
});
static RE_PERCENT_OF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)(\d+\.?\d*)%\s*of\s*{}", PERCENT_OPERAND)).expect("valid regex")
});

/// Why an expression could not be evaluated
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unknown variable: {0}")]
    UnboundVariable(String),

    #[error("empty expression")]
    Empty,

    #[error("unbalanced parentheses")]
    UnbalancedParentheses,

    #[error("malformed expression: {0}")]
    Malformed(String),

    #[error("result is not a finite number")]
    NonFinite,
}

/// Evaluate `expression` after substituting `bindings`.
///
/// The result is rounded to two decimals unless it is a whole number.
/// Identifiers without a binding are an error, never a silent zero.
pub fn evaluate(expression: &str, bindings: &Bindings) -> Result<f64, EvalError> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(EvalError::Empty);
    }

    let substituted = substitute(expression, bindings);
    check_unbound(&substituted)?;
    let rewritten = rewrite_named_ops(&substituted)?;
    let value = compute(&rewritten)?;
    Ok(round_cents(value))
}

/// Replace every bound identifier occurring as a whole word with its value
fn substitute(expression: &str, bindings: &Bindings) -> String {
    if bindings.is_empty() {
        return expression.to_string();
    }
    RE_WORD
        .replace_all(expression, |caps: &Captures| {
            let word = &caps[0];
            match bindings.get(word) {
                Some(value) if *value < 0.0 => format!("({})", format_number(*value)),
                Some(value) => format_number(*value),
                None => word.to_string(),
            }
        })
        .into_owned()
}

/// Every identifier left after substitution must be a named operation or `of`
fn check_unbound(expression: &str) -> Result<(), EvalError> {
    for m in RE_IDENT.find_iter(expression) {
        let word = m.as_str();
        let keyword = word.eq_ignore_ascii_case("of")
            || NAMED_OPS.iter().any(|op| op.eq_ignore_ascii_case(word));
        if !keyword {
            return Err(EvalError::UnboundVariable(word.to_string()));
        }
    }
    Ok(())
}

/// Resolve `sqrt(..)`, `sqrt N`, `N squared` and `N cubed` to plain arithmetic
fn rewrite_named_ops(expression: &str) -> Result<String, EvalError> {
    let mut current = expression.to_string();

    loop {
        let before = current.clone();

        if let Some((range, inner)) = first_match(&RE_SQRT_GROUP, &current) {
            let root = checked_sqrt(compute(&inner)?)?;
            current.replace_range(range, &format_number(root));
        } else if let Some((range, literal)) = first_match(&RE_SQRT_NUMBER, &current) {
            let n = literal
                .parse::<f64>()
                .map_err(|_| EvalError::Malformed(format!("bad number '{}'", literal)))?;
            current.replace_range(range, &format_number(checked_sqrt(n)?));
        } else {
            current = RE_POWER
                .replace_all(&current, |caps: &Captures| {
                    let base = &caps[1];
                    if caps[2].eq_ignore_ascii_case("squared") {
                        format!("({b} * {b})", b = base)
                    } else {
                        format!("({b} * {b} * {b})", b = base)
                    }
                })
                .into_owned();
        }

        if current == before {
            break;
        }
    }

    for word in RE_IDENT.find_iter(&current) {
        if let Some(op) = NAMED_OPS.iter().find(|op| op.eq_ignore_ascii_case(word.as_str())) {
            return Err(EvalError::Malformed(format!(
                "'{}' needs a number or a parenthesized expression",
                op
            )));
        }
    }

    Ok(current)
}

/// Byte range of the first match and its first capture group
fn first_match(re: &Regex, text: &str) -> Option<(std::ops::Range<usize>, String)> {
    let caps = re.captures(text)?;
    Some((caps.get(0)?.range(), caps.get(1)?.as_str().to_string()))
}

fn checked_sqrt(value: f64) -> Result<f64, EvalError> {
    if value < 0.0 {
        return Err(EvalError::NonFinite);
    }
    Ok(value.sqrt())
}

/// Percent idioms, sanitization and arithmetic, without final rounding
fn compute(expression: &str) -> Result<f64, EvalError> {
    let expanded = expand_percentages(expression);
    // sanitizing must never be what removes a word
    if let Some(word) = RE_IDENT.find(&expanded) {
        return Err(EvalError::Malformed(format!("unexpected word '{}'", word.as_str())));
    }
    let sanitized = sanitize(&expanded);
    if sanitized.trim().is_empty() {
        return Err(EvalError::Empty);
    }
    check_balanced(&sanitized)?;

    let tokens = tokenize(&sanitized)?;
    let mut parser = Parser::new(&tokens);
    let value = parser.parse()?;

    if !value.is_finite() {
        return Err(EvalError::NonFinite);
    }
    Ok(value)
}

/// `A + B%`, then `A - B%`, then `B% of A`
fn expand_percentages(expression: &str) -> String {
    let step = RE_PERCENT_ADD.replace_all(expression, |caps: &Captures| {
        format!("{a} + ({a} * {b} / 100)", a = &caps[1], b = &caps[2])
    });
    let step = RE_PERCENT_SUB.replace_all(&step, |caps: &Captures| {
        format!("{a} - ({a} * {b} / 100)", a = &caps[1], b = &caps[2])
    });
    let step = RE_PERCENT_OF.replace_all(&step, |caps: &Captures| {
        format!("({a} * {b} / 100)", a = &caps[2], b = &caps[1])
    });
    step.into_owned()
}

/// Drop everything outside `0-9 + - * / ( ) .` and whitespace
fn sanitize(expression: &str) -> String {
    expression
        .chars()
        .filter(|c| c.is_ascii_digit() || "+-*/().".contains(*c) || c.is_whitespace())
        .collect()
}

fn check_balanced(expression: &str) -> Result<(), EvalError> {
    let mut depth: i64 = 0;
    for c in expression.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(EvalError::UnbalancedParentheses);
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(EvalError::UnbalancedParentheses);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '0'..='9' | '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = &src[start..end];
                let n = literal
                    .parse::<f64>()
                    .map_err(|_| EvalError::Malformed(format!("bad number '{}'", literal)))?;
                tokens.push(Token::Num(n));
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            other => {
                return Err(EvalError::Malformed(format!(
                    "unexpected character '{}'",
                    other
                )));
            }
        };
        tokens.push(token);
        chars.next();
    }

    Ok(tokens)
}

/// Recursive descent: expr := term (('+'|'-') term)*, term := factor (('*'|'/') factor)*
struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn parse(&mut self) -> Result<f64, EvalError> {
        let value = self.expr()?;
        if self.pos < self.tokens.len() {
            return Err(EvalError::Malformed("unexpected trailing input".into()));
        }
        Ok(value)
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expr(&mut self) -> Result<f64, EvalError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, EvalError> {
        let mut value = self.factor()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.factor()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    value /= self.factor()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self) -> Result<f64, EvalError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EvalError::Malformed("expression nested too deeply".into()));
        }

        let result = match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::Plus) => self.factor(),
            Some(Token::Minus) => self.factor().map(|v| -v),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(EvalError::UnbalancedParentheses),
                }
            }
            Some(Token::RParen) => Err(EvalError::Malformed("unexpected ')'".into())),
            Some(_) => Err(EvalError::Malformed("operator without operand".into())),
            None => Err(EvalError::Malformed("unexpected end of expression".into())),
        };

        self.depth -= 1;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &str) -> Result<f64, EvalError> {
        evaluate(expr, &Bindings::new())
    }

    fn bindings(pairs: &[(&str, f64)]) -> Bindings {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    // ========================================================================
    // Arithmetic
    // ========================================================================

    #[test]
    fn test_operator_precedence() {
        assert_eq!(eval("2 + 3 * 4"), Ok(14.0));
        assert_eq!(eval("(2 + 3) * 4"), Ok(20.0));
        assert_eq!(eval("10 - 4 - 3"), Ok(3.0));
        assert_eq!(eval("8 / 4 / 2"), Ok(1.0));
    }

    #[test]
    fn test_unary_minus() {
        assert_eq!(eval("-3 + 5"), Ok(2.0));
        assert_eq!(eval("2 * -3"), Ok(-6.0));
        assert_eq!(eval("-(2 + 3)"), Ok(-5.0));
    }

    #[test]
    fn test_rounds_to_two_decimals() {
        assert_eq!(eval("10 / 3"), Ok(3.33));
        assert_eq!(eval("0.1 + 0.2"), Ok(0.3));
        assert_eq!(eval("2.5 * 2"), Ok(5.0));
    }

    // ========================================================================
    // Percent idioms
    // ========================================================================

    #[test]
    fn test_percent_idioms() {
        assert_eq!(eval("100 - 20%"), Ok(80.0));
        assert_eq!(eval("200 + 10%"), Ok(220.0));
        assert_eq!(eval("20% of 50"), Ok(10.0));
        assert_eq!(eval("15% OF 200"), Ok(30.0));
    }

    #[test]
    fn test_percent_with_variables() {
        let b = bindings(&[("price", 80.0)]);
        assert_eq!(evaluate("price + 25%", &b), Ok(100.0));
    }

    #[test]
    fn test_percent_with_negative_binding() {
        let b = bindings(&[("debt", -5.0)]);
        assert_eq!(evaluate("debt + 10%", &b), Ok(-5.5));
        assert_eq!(evaluate("debt - 10%", &b), Ok(-4.5));
        assert_eq!(evaluate("10% of debt", &b), Ok(-0.5));
    }

    // ========================================================================
    // Named operations
    // ========================================================================

    #[test]
    fn test_named_operations() {
        assert_eq!(eval("sqrt(16)"), Ok(4.0));
        assert_eq!(eval("sqrt 81 + 1"), Ok(10.0));
        assert_eq!(eval("sqrt(sqrt(16))"), Ok(2.0));
        assert_eq!(eval("4 squared"), Ok(16.0));
        assert_eq!(eval("3 cubed - 7"), Ok(20.0));
        assert_eq!(eval("(1 + 2) squared"), Ok(9.0));
        assert_eq!(eval("sqrt(2)"), Ok(1.41));
    }

    #[test]
    fn test_named_operation_errors() {
        assert_eq!(eval("sqrt(-4)"), Err(EvalError::NonFinite));
        assert!(matches!(eval("sqrt"), Err(EvalError::Malformed(_))));
        assert!(matches!(eval("squared"), Err(EvalError::Malformed(_))));
    }

    #[test]
    fn test_named_operations_ignore_case() {
        assert_eq!(eval("SQRT(16) + 1"), Ok(5.0));
        assert_eq!(eval("Sqrt 9 + 1"), Ok(4.0));
        assert_eq!(eval("4 SQUARED + 1"), Ok(17.0));
        assert_eq!(eval("2 Cubed"), Ok(8.0));
        assert!(matches!(eval("SQRT + 1"), Err(EvalError::Malformed(_))));
    }

    #[test]
    fn test_stray_keyword_is_not_dropped() {
        assert!(matches!(eval("2 + of 3"), Err(EvalError::Malformed(_))));
        assert!(matches!(eval("5 OF 3 + 1"), Err(EvalError::Malformed(_))));
    }

    // ========================================================================
    // Variables
    // ========================================================================

    #[test]
    fn test_substitutes_whole_words_only() {
        let b = bindings(&[("a", 2.0), ("ab", 10.0)]);
        assert_eq!(evaluate("ab + a", &b), Ok(12.0));
    }

    #[test]
    fn test_negative_binding_is_parenthesized() {
        let b = bindings(&[("debt", -5.0)]);
        assert_eq!(evaluate("2 * debt", &b), Ok(-10.0));
        assert_eq!(evaluate("10 - debt", &b), Ok(15.0));
    }

    #[test]
    fn test_unbound_variable_is_an_error() {
        assert_eq!(
            eval("price * 2"),
            Err(EvalError::UnboundVariable("price".into()))
        );
        let b = bindings(&[("a", 1.0)]);
        assert_eq!(
            evaluate("a + b", &b),
            Err(EvalError::UnboundVariable("b".into()))
        );
    }

    #[test]
    fn test_identifiers_are_case_sensitive() {
        let b = bindings(&[("price", 5.0)]);
        assert_eq!(
            evaluate("Price * 2", &b),
            Err(EvalError::UnboundVariable("Price".into()))
        );
        assert_eq!(
            eval("PRICE + 1"),
            Err(EvalError::UnboundVariable("PRICE".into()))
        );
    }

    #[test]
    fn test_keyword_lookalikes_are_unbound() {
        assert_eq!(
            eval("sqrtx 4 + 1"),
            Err(EvalError::UnboundVariable("sqrtx".into()))
        );
        assert_eq!(
            eval("4 squares + 1"),
            Err(EvalError::UnboundVariable("squares".into()))
        );
        assert_eq!(
            eval("10% off 50"),
            Err(EvalError::UnboundVariable("off".into()))
        );
    }

    #[test]
    fn test_glued_identifier_is_unbound() {
        let b = bindings(&[("a", 1.0)]);
        assert_eq!(
            evaluate("2a + 1", &b),
            Err(EvalError::UnboundVariable("a".into()))
        );
    }

    // ========================================================================
    // Failure modes
    // ========================================================================

    #[test]
    fn test_empty_expression() {
        assert_eq!(eval(""), Err(EvalError::Empty));
        assert_eq!(eval("   "), Err(EvalError::Empty));
        assert_eq!(eval("$#!"), Err(EvalError::Empty));
    }

    #[test]
    fn test_unbalanced_parentheses() {
        assert_eq!(eval("(2 + 3"), Err(EvalError::UnbalancedParentheses));
        assert_eq!(eval("2 + 3)"), Err(EvalError::UnbalancedParentheses));
        assert_eq!(eval(")2 + 3("), Err(EvalError::UnbalancedParentheses));
    }

    #[test]
    fn test_division_by_zero_is_not_finite() {
        assert_eq!(eval("1 / 0"), Err(EvalError::NonFinite));
        assert_eq!(eval("0 / 0"), Err(EvalError::NonFinite));
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(eval("2 +"), Err(EvalError::Malformed(_))));
        assert!(matches!(eval("2 3"), Err(EvalError::Malformed(_))));
        assert!(matches!(eval("1.2.3 + 1"), Err(EvalError::Malformed(_))));
        assert!(matches!(eval("* 4"), Err(EvalError::Malformed(_))));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let deep = format!("{}1{}", "(".repeat(400), ")".repeat(400));
        assert!(matches!(eval(&deep), Err(EvalError::Malformed(_))));
    }

    #[test]
    fn test_sanitization_strips_foreign_characters() {
        // currency symbols and stray punctuation never reach the parser
        assert_eq!(eval("$5 + €3"), Ok(8.0));
        assert_eq!(eval("2 + 2; "), Ok(4.0));
    }
}
