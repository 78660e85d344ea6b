// src/currency/exchange_rate.rs
// HTTP rate lookup against an ExchangeRate-API compatible service

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{CurrencyError, RateLookup, RateQuote};

/// Public endpoint (no key needed, 160+ currencies)
pub const DEFAULT_EXCHANGE_RATE_API: &str = "https://api.exchangerate-api.com/v4";

const REQUEST_TIMEOUT_SECS: u64 = 10;
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// `GET {base}/latest/{FROM}` payload
#[derive(Debug, Deserialize)]
struct LatestRates {
    #[serde(default)]
    rates: HashMap<String, f64>,
    #[serde(default)]
    date: Option<String>,
}

/// Rate lookup over HTTP
pub struct ExchangeRateClient {
    http: Client,
    base_url: String,
}

impl ExchangeRateClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(http, base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn latest_url(&self, from: &str) -> String {
        format!("{}/latest/{}", self.base_url.trim_end_matches('/'), from)
    }

    /// Pick the target rate out of a `latest` response body
    fn quote_from_body(body: &str, to: &str) -> Result<RateQuote, CurrencyError> {
        let latest: LatestRates = serde_json::from_str(body)
            .map_err(|e| CurrencyError::Transport(format!("unreadable rate response: {}", e)))?;

        let rate = latest
            .rates
            .get(to)
            .copied()
            .filter(|r| r.is_finite() && *r > 0.0)
            .ok_or_else(|| CurrencyError::UnknownTarget(to.to_string()))?;

        let date = latest
            .date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

        Ok(RateQuote { rate, date })
    }
}

impl Default for ExchangeRateClient {
    fn default() -> Self {
        Self::new(DEFAULT_EXCHANGE_RATE_API)
    }
}

#[async_trait]
impl RateLookup for ExchangeRateClient {
    #[instrument(skip(self), fields(base = %self.base_url))]
    async fn rate(&self, from: &str, to: &str) -> Result<RateQuote, CurrencyError> {
        let url = self.latest_url(from);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CurrencyError::Transport(e.to_string()))?;

        let status = response.status();
        // the service answers 404/400 for a base currency it does not know
        if status == StatusCode::NOT_FOUND || status == StatusCode::BAD_REQUEST {
            return Err(CurrencyError::UnknownSource(from.to_string()));
        }
        if !status.is_success() {
            return Err(CurrencyError::Transport(format!(
                "rate service returned {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CurrencyError::Transport(e.to_string()))?;
        debug!(bytes = body.len(), "Rate response received");

        Self::quote_from_body(&body, to)
    }
}
