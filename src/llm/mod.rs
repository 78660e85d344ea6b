// src/llm/mod.rs
// Chat-completions access for correction streaming and AI-assisted solving

mod client;
mod http_client;
mod types;

pub use client::{ByteStream, ChatClient, DEFAULT_API_BASE, DEFAULT_MODEL, LlmClient};
pub use http_client::LlmHttpClient;
pub use types::{
    ChatChunk, ChatRequest, ChatResult, FunctionCall, FunctionDef, Message, Tool, ToolCall,
    parse_chat_response,
};
