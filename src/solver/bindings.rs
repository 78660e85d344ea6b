// src/solver/bindings.rs
// Variable bindings harvested from the lines above a solve

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

use super::eval::evaluate;

/// Identifier -> value, rebuilt from scratch for every solve
pub type Bindings = HashMap<String, f64>;

/// `name = <anything> = <number>`: a line that already carries an answer
static RE_ANSWERED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*.+=\s*(-?[\d.]+)\s*$").expect("valid regex")
});
/// `name = <number>`
static RE_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(-?[\d.]+)\s*$").expect("valid regex")
});
/// `name = <expression>`
static RE_EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+)$").expect("valid regex"));

/// Scan `lines` top to bottom and collect `name = value` assignments.
///
/// Later assignments overwrite earlier ones. Expression assignments are
/// evaluated against the bindings collected so far; lines that fail to
/// evaluate or parse are skipped and leave the name unbound.
pub fn extract_bindings<I, S>(lines: I) -> Bindings
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut bindings = Bindings::new();

    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = RE_ANSWERED.captures(line) {
            bind_literal(&mut bindings, &caps[1], &caps[2]);
            continue;
        }

        if let Some(caps) = RE_LITERAL.captures(line) {
            bind_literal(&mut bindings, &caps[1], &caps[2]);
            continue;
        }

        if let Some(caps) = RE_EXPRESSION.captures(line) {
            let name = &caps[1];
            match evaluate(&caps[2], &bindings) {
                Ok(value) => {
                    bindings.insert(name.to_string(), value);
                }
                Err(e) => {
                    debug!(name = %name, error = %e, "Skipping binding that does not evaluate");
                }
            }
        }
    }

    bindings
}

fn bind_literal(bindings: &mut Bindings, name: &str, literal: &str) {
    match literal.parse::<f64>() {
        Ok(value) if value.is_finite() => {
            bindings.insert(name.to_string(), value);
        }
        _ => debug!(name = %name, literal = %literal, "Skipping malformed numeric binding"),
    }
}
