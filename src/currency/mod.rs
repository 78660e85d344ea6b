// src/currency/mod.rs
// Currency conversion behind a narrow, replaceable rate-lookup interface

mod exchange_rate;

pub use exchange_rate::{DEFAULT_EXCHANGE_RATE_API, ExchangeRateClient};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::utils::round_cents;

/// Conversion failures, kept distinct so callers can present each one
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurrencyError {
    #[error("unknown source currency: {0}")]
    UnknownSource(String),

    #[error("unknown target currency: {0}")]
    UnknownTarget(String),

    #[error("network error: {0}")]
    Transport(String),
}

/// Raw answer from the rate collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct RateQuote {
    /// Units of the target currency per one unit of the source currency
    pub rate: f64,
    /// Publication date of the rate, when the service reports one
    pub date: Option<NaiveDate>,
}

/// Remote exchange-rate collaborator (network call)
#[async_trait]
pub trait RateLookup: Send + Sync {
    /// Look up the rate from `from` to `to`; both are upper-case ISO codes
    async fn rate(&self, from: &str, to: &str) -> Result<RateQuote, CurrencyError>;
}

/// A successful conversion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversion {
    /// Converted amount, rounded to two decimals
    pub amount: f64,
    pub rate: f64,
    pub from: String,
    pub to: String,
    pub date: Option<NaiveDate>,
}

/// True for exactly three ASCII letters
pub fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic())
}

/// Validates codes, delegates the lookup and applies the rounding rule.
///
/// No caching happens here; a caching `RateLookup` can be slotted in
/// without changing this contract.
#[derive(Clone)]
pub struct CurrencyAdapter {
    lookup: Arc<dyn RateLookup>,
}

impl CurrencyAdapter {
    pub fn new(lookup: Arc<dyn RateLookup>) -> Self {
        Self { lookup }
    }

    /// Convert `amount` from one ISO code to another
    pub async fn convert(
        &self,
        amount: f64,
        from: &str,
        to: &str,
    ) -> Result<Conversion, CurrencyError> {
        let from = from.trim().to_ascii_uppercase();
        let to = to.trim().to_ascii_uppercase();

        if !is_currency_code(&from) {
            return Err(CurrencyError::UnknownSource(from));
        }
        if !is_currency_code(&to) {
            return Err(CurrencyError::UnknownTarget(to));
        }

        let quote = if from == to {
            RateQuote {
                rate: 1.0,
                date: None,
            }
        } else {
            self.lookup.rate(&from, &to).await.inspect_err(|e| {
                warn!(from = %from, to = %to, error = %e, "Rate lookup failed");
            })?
        };

        let converted = round_cents(amount * quote.rate);
        debug!(amount, from = %from, to = %to, rate = quote.rate, converted, "Converted currency");

        Ok(Conversion {
            amount: converted,
            rate: quote.rate,
            from,
            to,
            date: quote.date,
        })
    }
}
