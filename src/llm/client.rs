// src/llm/client.rs
// Chat-completions client: tool-calling chat and raw token streams

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Instant;
use tracing::{Span, debug, info, instrument};
use uuid::Uuid;

use super::http_client::LlmHttpClient;
use super::types::{ChatRequest, ChatResult, Message, Tool, parse_chat_response};
use crate::error::{MarginError, Result};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Raw response body chunks of a streaming completion
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Anything that can answer a (possibly tool-calling) chat request
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<Tool>>,
        temperature: Option<f32>,
    ) -> Result<ChatResult>;

    fn model_name(&self) -> String;
}

/// OpenAI-compatible chat-completions client
pub struct ChatClient {
    api_key: String,
    base_url: String,
    model: String,
    http: LlmHttpClient,
}

impl ChatClient {
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, DEFAULT_API_BASE.into(), DEFAULT_MODEL.into())
    }

    pub fn with_model(api_key: String, base_url: String, model: String) -> Self {
        Self {
            api_key,
            base_url,
            model,
            http: LlmHttpClient::default(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Non-streaming chat with retry on transient failures
    #[instrument(skip(self, messages, tools), fields(request_id, model = %self.model, message_count = messages.len()))]
    pub async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<Tool>>,
        temperature: Option<f32>,
    ) -> Result<ChatResult> {
        let request_id = Uuid::new_v4().to_string();
        let start_time = Instant::now();
        Span::current().record("request_id", request_id.as_str());

        info!(
            request_id = %request_id,
            tool_count = tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "Starting chat request"
        );

        let mut request = ChatRequest::new(&self.model, messages).with_tools(tools);
        if let Some(t) = temperature {
            request = request.with_temperature(t);
        }
        let body = serde_json::to_string(&request)?;
        debug!(request_id = %request_id, bytes = body.len(), "Chat request built");

        let response_body = self
            .http
            .post_with_retry(&request_id, &self.completions_url(), &self.api_key, body)
            .await?;

        let duration_ms = start_time.elapsed().as_millis() as u64;
        let result = parse_chat_response(&response_body, &request_id, duration_ms)?;

        info!(
            request_id = %request_id,
            duration_ms,
            content_len = result.content.as_ref().map(|c| c.len()).unwrap_or(0),
            tool_calls = result.tool_calls.as_ref().map(|t| t.len()).unwrap_or(0),
            "Chat request complete"
        );

        Ok(result)
    }

    /// Open a streaming completion and return its body as a byte stream.
    ///
    /// Sent once, no retry. Dropping the stream closes the connection.
    #[instrument(skip(self, messages), fields(request_id, model = %self.model))]
    pub async fn chat_stream(
        &self,
        messages: Vec<Message>,
        temperature: Option<f32>,
    ) -> Result<ByteStream> {
        let request_id = Uuid::new_v4().to_string();
        Span::current().record("request_id", request_id.as_str());

        let mut request = ChatRequest::new(&self.model, messages).streaming();
        if let Some(t) = temperature {
            request = request.with_temperature(t);
        }
        let body = serde_json::to_string(&request)?;

        let response = self
            .http
            .post_stream(&self.completions_url(), &self.api_key, body)
            .await?;
        info!(request_id = %request_id, "Streaming response opened");

        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| MarginError::Stream(e.to_string()))),
        ))
    }
}

#[async_trait]
impl LlmClient for ChatClient {
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<Tool>>,
        temperature: Option<f32>,
    ) -> Result<ChatResult> {
        ChatClient::chat(self, messages, tools, temperature).await
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}
