// src/solver/ai.rs
// Tool-calling strategy: the model picks math or currency, the tools run locally

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use super::bindings::extract_bindings;
use super::eval::evaluate;
use super::{SolveError, SolveRequest, SolveResult, SolveStrategy, convert_amount};
use crate::currency::CurrencyAdapter;
use crate::llm::{LlmClient, Message, Tool, ToolCall};
use crate::utils::{format_number, truncate};

const SYSTEM_PROMPT: &str = "You are a calculator assistant. Parse natural language math problems and call the appropriate function. Convert text numbers to digits (e.g., \"two million\" -> 2000000).";

/// Temperature for tool selection
const SOLVER_TEMPERATURE: f32 = 0.0;

static RE_FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\d,]+\.?\d*").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct MathArgs {
    expression: String,
}

#[derive(Debug, Deserialize)]
struct CurrencyArgs {
    amount: f64,
    from_currency: String,
    to_currency: String,
}

/// Asks a chat model which tool to use and executes that tool deterministically
pub struct AiStrategy {
    llm: Option<Arc<dyn LlmClient>>,
    currency: CurrencyAdapter,
}

impl AiStrategy {
    /// `llm` is `None` when no API key is configured; every solve then fails
    pub fn new(llm: Option<Arc<dyn LlmClient>>, currency: CurrencyAdapter) -> Self {
        Self { llm, currency }
    }

    pub fn tools() -> Vec<Tool> {
        vec![
            Tool::function(
                "calculate_math",
                "Calculate mathematical expressions. Handles percentages, basic arithmetic, and variables from context.",
                json!({
                    "type": "object",
                    "properties": {
                        "expression": {
                            "type": "string",
                            "description": "The mathematical expression to evaluate (e.g., '5 + 3', '100 * 0.05', 'x + 20')"
                        }
                    },
                    "required": ["expression"]
                }),
            ),
            Tool::function(
                "convert_currency",
                "Convert currency amounts between different currencies using real-time exchange rates.",
                json!({
                    "type": "object",
                    "properties": {
                        "amount": {"type": "number", "description": "The amount to convert"},
                        "from_currency": {
                            "type": "string",
                            "description": "Source currency code (e.g., EUR, USD, UAH, PLN)"
                        },
                        "to_currency": {
                            "type": "string",
                            "description": "Target currency code (e.g., EUR, USD, UAH, PLN)"
                        }
                    },
                    "required": ["amount", "from_currency", "to_currency"]
                }),
            ),
        ]
    }

    fn messages(request: &SolveRequest) -> Vec<Message> {
        vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(format!(
                "Context (may contain variables):\n{}\n\nSolve: {}",
                request.prior_lines.join("\n"),
                request.expression
            )),
        ]
    }

    async fn run_tool(&self, call: &ToolCall, request: &SolveRequest) -> SolveResult {
        debug!(tool = %call.function.name, args = %truncate(&call.function.arguments, 120), "Executing tool call");
        match call.function.name.as_str() {
            "calculate_math" => {
                let args: MathArgs = parse_args(call)?;
                let bindings = extract_bindings(&request.prior_lines);
                let value = evaluate(&args.expression, &bindings)?;
                Ok(format_number(value))
            }
            "convert_currency" => {
                let args: CurrencyArgs = parse_args(call)?;
                convert_amount(&self.currency, args.amount, &args.from_currency, &args.to_currency)
                    .await
            }
            other => Err(SolveError::Unanswered(format!("unknown tool: {}", other))),
        }
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(call: &ToolCall) -> Result<T, SolveError> {
    serde_json::from_str(&call.function.arguments).map_err(|e| {
        SolveError::Unanswered(format!("bad arguments for {}: {}", call.function.name, e))
    })
}

/// Plain-text fallback: the first number in the reply (commas dropped), else the reply itself
fn answer_from_text(content: &str) -> Option<String> {
    let content = content.trim();
    if content.is_empty() {
        return None;
    }
    match RE_FIRST_NUMBER.find(content) {
        Some(m) => {
            let number = m.as_str().replace(',', "");
            if number.is_empty() {
                Some(content.to_string())
            } else {
                Some(number)
            }
        }
        None => Some(content.to_string()),
    }
}

#[async_trait]
impl SolveStrategy for AiStrategy {
    async fn solve(&self, request: &SolveRequest) -> SolveResult {
        let Some(llm) = &self.llm else {
            return Err(SolveError::Transport("no API key configured".into()));
        };

        let result = llm
            .chat(
                Self::messages(request),
                Some(Self::tools()),
                Some(SOLVER_TEMPERATURE),
            )
            .await
            .map_err(|e| {
                warn!(error = %e, "Solver chat request failed");
                SolveError::Transport(e.to_user_string())
            })?;

        if let Some(call) = result.tool_calls.as_ref().and_then(|calls| calls.first()) {
            info!(request_id = %result.request_id, tool = %call.function.name, "Model selected tool");
            return self.run_tool(call, request).await;
        }

        result
            .content
            .as_deref()
            .and_then(answer_from_text)
            .ok_or_else(|| SolveError::Unanswered("model returned no answer".into()))
    }

    fn name(&self) -> &'static str {
        "ai"
    }
}
