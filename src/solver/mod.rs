// src/solver/mod.rs
// Inline solving of lines that end in `=`

pub mod ai;
pub mod bindings;
pub mod classify;
pub mod eval;

pub use ai::AiStrategy;
pub use bindings::{Bindings, extract_bindings};
pub use classify::{Classification, CurrencyQuery, SolverLine, classify, parse_solver_line};
pub use eval::{EvalError, evaluate};

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::currency::{CurrencyAdapter, CurrencyError};
use crate::surface::LineId;
use crate::utils::{format_number, truncate};

/// `name = ` at the start of a solver expression
static RE_ASSIGNMENT_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*\s*=\s*").expect("valid regex"));

/// Which side of a conversion named the unknown code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrencySide {
    Source,
    Target,
}

impl fmt::Display for CurrencySide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

/// Why a solver line produced no answer
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    #[error("unknown variable: {0}")]
    UnboundVariable(String),

    #[error("{0}")]
    Evaluation(EvalError),

    #[error("unknown {side} currency: {code}")]
    UnknownCurrency { code: String, side: CurrencySide },

    #[error("network error: {0}")]
    Transport(String),

    #[error("no answer: {0}")]
    Unanswered(String),
}

impl From<EvalError> for SolveError {
    fn from(err: EvalError) -> Self {
        match err {
            EvalError::UnboundVariable(name) => Self::UnboundVariable(name),
            other => Self::Evaluation(other),
        }
    }
}

impl From<CurrencyError> for SolveError {
    fn from(err: CurrencyError) -> Self {
        match err {
            CurrencyError::UnknownSource(code) => Self::UnknownCurrency {
                code,
                side: CurrencySide::Source,
            },
            CurrencyError::UnknownTarget(code) => Self::UnknownCurrency {
                code,
                side: CurrencySide::Target,
            },
            CurrencyError::Transport(detail) => Self::Transport(detail),
        }
    }
}

/// Either the answer text to insert or the reason there is none
pub type SolveResult = Result<String, SolveError>;

/// Everything a strategy needs to answer one line
#[derive(Debug, Clone)]
pub struct SolveRequest {
    /// Line content without the trailing `=`
    pub expression: String,
    pub classification: Classification,
    /// Lines above the one being solved, top to bottom
    pub prior_lines: Vec<String>,
}

impl SolveRequest {
    pub fn new(expression: impl Into<String>, prior_lines: Vec<String>) -> Self {
        let expression = expression.into();
        Self {
            classification: classify(&expression),
            expression,
            prior_lines,
        }
    }

    /// The expression with a leading `name =` assignment target removed
    pub fn value_expression(&self) -> &str {
        match RE_ASSIGNMENT_TARGET.find(&self.expression) {
            Some(m) => &self.expression[m.end()..],
            None => &self.expression,
        }
    }
}

/// Interchangeable ways of turning a classified expression into an answer
#[async_trait]
pub trait SolveStrategy: Send + Sync {
    async fn solve(&self, request: &SolveRequest) -> SolveResult;

    fn name(&self) -> &'static str;
}

/// Deterministic solving: local evaluator for math, rate lookup for currency
pub struct LocalStrategy {
    currency: CurrencyAdapter,
}

impl LocalStrategy {
    pub fn new(currency: CurrencyAdapter) -> Self {
        Self { currency }
    }
}

#[async_trait]
impl SolveStrategy for LocalStrategy {
    async fn solve(&self, request: &SolveRequest) -> SolveResult {
        match &request.classification {
            Classification::Math => {
                let bindings = extract_bindings(&request.prior_lines);
                let value = evaluate(request.value_expression(), &bindings)?;
                Ok(format_number(value))
            }
            Classification::Currency(query) => {
                convert_amount(&self.currency, query.amount, &query.from, &query.to).await
            }
            Classification::None => Err(SolveError::Unanswered("not a solvable expression".into())),
        }
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Convert and format, refusing amounts that overflowed to infinity
pub(crate) async fn convert_amount(
    currency: &CurrencyAdapter,
    amount: f64,
    from: &str,
    to: &str,
) -> SolveResult {
    if !amount.is_finite() {
        return Err(EvalError::NonFinite.into());
    }
    let conversion = currency.convert(amount, from, to).await?;
    if !conversion.amount.is_finite() {
        return Err(EvalError::NonFinite.into());
    }
    Ok(format_number(conversion.amount))
}

/// What happened to one line-changed event
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    /// Line does not end in `=`
    NotSolverLine,
    /// Ends in `=` but is neither math nor currency
    Unclassified,
    /// Same line is already being solved; request dropped
    Busy,
    Solved {
        answer: String,
    },
    Failed {
        error: SolveError,
        /// Character columns of the offending expression
        span: Range<usize>,
    },
}

/// Runs a strategy over solver lines, one solve per line at a time
pub struct InlineSolver {
    strategy: Arc<dyn SolveStrategy>,
    in_flight: Mutex<HashSet<LineId>>,
}

/// Releases the line when the solve finishes or is dropped
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<LineId>>,
    line: LineId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.line);
    }
}

impl InlineSolver {
    pub fn new(strategy: Arc<dyn SolveStrategy>) -> Self {
        Self {
            strategy,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    fn acquire(&self, line: LineId) -> Option<InFlightGuard<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(line) {
            return None;
        }
        Some(InFlightGuard {
            set: &self.in_flight,
            line,
        })
    }

    pub fn is_in_flight(&self, line: LineId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&line)
    }

    /// Solve `text` (the content of `line`) against the lines above it in `document`
    #[instrument(skip(self, text, document), fields(strategy = self.strategy.name()))]
    pub async fn solve_line(&self, line: LineId, text: &str, document: &str) -> SolveOutcome {
        let Some(solver_line) = parse_solver_line(text) else {
            return SolveOutcome::NotSolverLine;
        };

        let classification = classify(solver_line.expression);
        if classification.is_none() {
            debug!(expression = %truncate(solver_line.expression, 60), "Not a solvable expression");
            return SolveOutcome::Unclassified;
        }

        let Some(_guard) = self.acquire(line) else {
            debug!("Line already being solved, dropping request");
            return SolveOutcome::Busy;
        };

        let request = SolveRequest {
            expression: solver_line.expression.to_string(),
            classification,
            prior_lines: document
                .lines()
                .take(line.index())
                .map(str::to_string)
                .collect(),
        };

        match self.strategy.solve(&request).await {
            Ok(answer) => {
                info!(answer = %answer, "Solved line");
                SolveOutcome::Solved { answer }
            }
            Err(error) => {
                debug!(error = %error, "Solve failed");
                SolveOutcome::Failed {
                    error,
                    span: solver_line.span,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::{RateLookup, RateQuote};
    use tokio::sync::{Notify, Semaphore};

    struct OneRate;

    #[async_trait]
    impl RateLookup for OneRate {
        async fn rate(&self, from: &str, to: &str) -> Result<RateQuote, CurrencyError> {
            match (from, to) {
                ("USD", "EUR") => Ok(RateQuote {
                    rate: 0.5,
                    date: None,
                }),
                ("USD", _) => Err(CurrencyError::UnknownTarget(to.into())),
                _ => Err(CurrencyError::UnknownSource(from.into())),
            }
        }
    }

    fn local_solver() -> InlineSolver {
        let strategy = LocalStrategy::new(CurrencyAdapter::new(Arc::new(OneRate)));
        InlineSolver::new(Arc::new(strategy))
    }

    // ========================================================================
    // Error mapping
    // ========================================================================

    #[test]
    fn test_eval_error_mapping() {
        assert_eq!(
            SolveError::from(EvalError::UnboundVariable("x".into())),
            SolveError::UnboundVariable("x".into())
        );
        assert_eq!(
            SolveError::from(EvalError::UnbalancedParentheses),
            SolveError::Evaluation(EvalError::UnbalancedParentheses)
        );
    }

    #[test]
    fn test_currency_error_mapping() {
        let err = SolveError::from(CurrencyError::UnknownTarget("QQQ".into()));
        assert_eq!(err.to_string(), "unknown target currency: QQQ");
        let err = SolveError::from(CurrencyError::Transport("timeout".into()));
        assert!(matches!(err, SolveError::Transport(_)));
    }

    #[test]
    fn test_value_expression_strips_assignment() {
        let req = SolveRequest::new("total = price * 2", vec![]);
        assert_eq!(req.value_expression(), "price * 2");
        let req = SolveRequest::new("2 * 3", vec![]);
        assert_eq!(req.value_expression(), "2 * 3");
    }

    // ========================================================================
    // Line pipeline with the local strategy
    // ========================================================================

    #[tokio::test]
    async fn test_line_without_equals_is_ignored() {
        let solver = local_solver();
        assert_eq!(
            solver.solve_line(LineId(0), "2 + 2", "2 + 2").await,
            SolveOutcome::NotSolverLine
        );
    }

    #[tokio::test]
    async fn test_oversized_amount_is_not_finite() {
        let solver = local_solver();
        let line = format!("{} USD in EUR =", "9".repeat(400));
        match solver.solve_line(LineId(0), &line, &line).await {
            SolveOutcome::Failed { error, .. } => {
                assert_eq!(error, SolveError::Evaluation(EvalError::NonFinite));
            }
            other => panic!("expected failure, got {:?}", other),
        }

        let strategy = LocalStrategy::new(CurrencyAdapter::new(Arc::new(OneRate)));
        let request = SolveRequest::new("1 USD in EUR", vec![]);
        assert_eq!(strategy.solve(&request).await, Ok("0.5".into()));
        assert_eq!(
            convert_amount(&strategy.currency, f64::INFINITY, "USD", "EUR").await,
            Err(SolveError::Evaluation(EvalError::NonFinite))
        );
    }

    #[tokio::test]
    async fn test_prose_is_unclassified() {
        let solver = local_solver();
        assert_eq!(
            solver.solve_line(LineId(0), "hello there =", "").await,
            SolveOutcome::Unclassified
        );
    }

    #[tokio::test]
    async fn test_math_with_prior_bindings() {
        let solver = local_solver();
        let doc = "price = 20\nqty = 3\ntotal = price * qty =";
        let outcome = solver.solve_line(LineId(2), "total = price * qty =", doc).await;
        assert_eq!(
            outcome,
            SolveOutcome::Solved {
                answer: "60".into()
            }
        );
    }

    #[tokio::test]
    async fn test_bindings_below_the_line_are_ignored() {
        let solver = local_solver();
        let doc = "x * 2 =\nx = 5";
        let outcome = solver.solve_line(LineId(0), "x * 2 =", doc).await;
        assert!(matches!(
            outcome,
            SolveOutcome::Failed {
                error: SolveError::UnboundVariable(ref name),
                ..
            } if name == "x"
        ));
    }

    #[tokio::test]
    async fn test_failure_carries_expression_span() {
        let solver = local_solver();
        let outcome = solver.solve_line(LineId(0), "  (2 + 3 =", "").await;
        assert_eq!(
            outcome,
            SolveOutcome::Failed {
                error: SolveError::Evaluation(EvalError::UnbalancedParentheses),
                span: 2..8,
            }
        );
    }

    #[tokio::test]
    async fn test_currency_line() {
        let solver = local_solver();
        let outcome = solver.solve_line(LineId(0), "100 usd to eur =", "").await;
        assert_eq!(
            outcome,
            SolveOutcome::Solved {
                answer: "50".into()
            }
        );
    }

    #[tokio::test]
    async fn test_currency_unknown_code_is_distinct() {
        let solver = local_solver();
        let outcome = solver.solve_line(LineId(0), "5 usd in xyz =", "").await;
        assert!(matches!(
            outcome,
            SolveOutcome::Failed {
                error: SolveError::UnknownCurrency {
                    side: CurrencySide::Target,
                    ..
                },
                ..
            }
        ));
    }

    // ========================================================================
    // In-flight guard
    // ========================================================================

    /// Blocks every solve until released
    struct Gate {
        entered: Notify,
        release: Semaphore,
    }

    #[async_trait]
    impl SolveStrategy for Gate {
        async fn solve(&self, _request: &SolveRequest) -> SolveResult {
            self.entered.notify_one();
            if let Ok(permit) = self.release.acquire().await {
                permit.forget();
            }
            Ok("1".into())
        }

        fn name(&self) -> &'static str {
            "gate"
        }
    }

    #[tokio::test]
    async fn test_same_line_is_deduplicated() {
        let gate = Arc::new(Gate {
            entered: Notify::new(),
            release: Semaphore::new(0),
        });
        let solver = Arc::new(InlineSolver::new(gate.clone()));

        let first = {
            let solver = solver.clone();
            tokio::spawn(async move { solver.solve_line(LineId(3), "1 + 0 =", "").await })
        };
        gate.entered.notified().await;
        assert!(solver.is_in_flight(LineId(3)));

        assert_eq!(
            solver.solve_line(LineId(3), "1 + 0 =", "").await,
            SolveOutcome::Busy
        );

        gate.release.add_permits(1);
        assert_eq!(
            first.await.unwrap(),
            SolveOutcome::Solved { answer: "1".into() }
        );
        assert!(!solver.is_in_flight(LineId(3)));
    }

    #[tokio::test]
    async fn test_other_lines_are_not_blocked() {
        let gate = Arc::new(Gate {
            entered: Notify::new(),
            release: Semaphore::new(0),
        });
        let solver = Arc::new(InlineSolver::new(gate.clone()));

        let first = {
            let solver = solver.clone();
            tokio::spawn(async move { solver.solve_line(LineId(0), "1 + 0 =", "").await })
        };
        gate.entered.notified().await;

        let second = {
            let solver = solver.clone();
            tokio::spawn(async move { solver.solve_line(LineId(1), "1 + 0 =", "").await })
        };
        gate.entered.notified().await;
        assert!(solver.is_in_flight(LineId(1)));

        gate.release.add_permits(2);
        assert!(matches!(first.await.unwrap(), SolveOutcome::Solved { .. }));
        assert!(matches!(second.await.unwrap(), SolveOutcome::Solved { .. }));
    }
}
