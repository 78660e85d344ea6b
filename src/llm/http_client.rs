// src/llm/http_client.rs
// Shared HTTP client configuration for chat-completion calls

use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::warn;

use crate::error::{MarginError, Result};

/// Default maximum retry attempts for transient failures
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default base backoff duration between retries (doubles each attempt)
const DEFAULT_BASE_BACKOFF_MS: u64 = 500;
/// Whole-request timeout for one-shot calls; streaming bodies are not bounded
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

/// HTTP client with retry for one-shot requests and single-attempt streaming
pub struct LlmHttpClient {
    client: Client,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl LlmHttpClient {
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            request_timeout,
            connect_timeout,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: Duration::from_millis(DEFAULT_BASE_BACKOFF_MS),
        }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// POST a JSON body with Bearer auth, retrying 429/5xx and connect/timeout errors.
    /// Returns the response body as text on success.
    pub async fn post_with_retry(
        &self,
        request_id: &str,
        url: &str,
        api_key: &str,
        body: String,
    ) -> Result<String> {
        self.execute_request_with_retry(request_id, body, |client, body| {
            authorized_post(client, url, api_key, body)
        })
        .await
    }

    /// Execute with retry using a custom request builder.
    pub async fn execute_request_with_retry<F>(
        &self,
        request_id: &str,
        body: String,
        build_request: F,
    ) -> Result<String>
    where
        F: Fn(&Client, String) -> RequestBuilder,
    {
        let mut attempts = 0;
        let mut backoff = self.base_backoff;

        loop {
            let request = build_request(&self.client, body.clone()).timeout(self.request_timeout);
            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        let error_body = response.text().await.unwrap_or_default();

                        if attempts < self.max_attempts
                            && (status.as_u16() == 429 || status.is_server_error())
                        {
                            warn!(
                                request_id = %request_id,
                                status = %status,
                                "Transient error, retrying in {:?}...",
                                backoff
                            );
                            tokio::time::sleep(backoff).await;
                            attempts += 1;
                            backoff *= 2;
                            continue;
                        }

                        return Err(MarginError::Api {
                            status: status.as_u16(),
                            body: error_body,
                        });
                    }

                    return Ok(response.text().await?);
                }
                Err(e) => {
                    // only connect/timeout failures are known not to have reached the server
                    if attempts < self.max_attempts && (e.is_connect() || e.is_timeout()) {
                        warn!(
                            request_id = %request_id,
                            error = %e,
                            "Request failed (connect/timeout), retrying in {:?}...",
                            backoff
                        );
                        tokio::time::sleep(backoff).await;
                        attempts += 1;
                        backoff *= 2;
                        continue;
                    }
                    return Err(MarginError::Http(e));
                }
            }
        }
    }

    /// POST once and hand back the live response for streaming.
    ///
    /// A non-success status is read out and turned into `MarginError::Api`.
    pub async fn post_stream(
        &self,
        url: &str,
        api_key: &str,
        body: String,
    ) -> Result<Response> {
        let response = authorized_post(&self.client, url, api_key, body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|e| format!("(failed to read body: {})", e));
            return Err(MarginError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(response)
    }
}

impl Default for LlmHttpClient {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }
}

fn authorized_post(client: &Client, url: &str, api_key: &str, body: String) -> RequestBuilder {
    client
        .post(url)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .body(body)
}
