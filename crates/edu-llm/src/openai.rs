//! OpenAI-Compatible Chat Completions Client
//!
//! ## API Endpoints
//!
//! | Endpoint | URL | Purpose |
//! |----------|-----|--------|
//! | Base URL | `https://api.openai.com/v1` | Default, override with `OPENAI_BASE_URL` |
//! | Chat | `/chat/completions` | Chat completions |
//!
//! ## Authentication
//! - Header: `Authorization: Bearer {OPENAI_API_KEY}` (omitted when no key is set)
//!
//! Works against any gateway speaking the same wire format (Ollama,
//! vLLM, LiteLLM, ...).

use anyhow::{Context, Result};
use async_trait::async_trait;
use edu_core::BackendError;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::provider::{ChatMessage, ChatRequest, ChatResponse, LlmProvider, TokenUsage};

/// Reported in [`ChatResponse::provider`]
pub const PROVIDER_NAME: &str = "openai";

pub mod endpoints {
    pub const BASE_URL: &str = "https://api.openai.com/v1";
    pub const CHAT_COMPLETIONS: &str = "/chat/completions";
}

pub struct OpenAiCompatClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiCompatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: None,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build from `OPENAI_BASE_URL` / `OPENAI_API_KEY`
    pub fn from_env() -> Self {
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| endpoints::BASE_URL.to_string());
        let client = Self::new(base_url);
        match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.is_empty() => client.with_api_key(key),
            _ => client,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Per-request HTTP timeout. `None` leaves requests unbounded.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        self.client = builder.build().context("failed to build HTTP client")?;
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_body(model: &str, request: &ChatRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role, "content": m.content }))
            .collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": false
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatClient {
    async fn chat(&self, model: &str, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}{}", self.base_url, endpoints::CHAT_COMPLETIONS);
        let body = Self::build_body(model, &request);

        info!(model = %model, endpoint = %self.base_url, json_mode = request.json_mode, "Chat request");

        let mut http = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            http = http.header("Authorization", format!("Bearer {}", key));
        }

        let response = http
            .send()
            .await
            .map_err(|e| BackendError::unavailable(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| BackendError::unavailable(format!("failed to read response: {}", e)))?;

        debug!(
            status = %status,
            body = %response_text.chars().take(500).collect::<String>(),
            "Chat response"
        );

        if !status.is_success() {
            return Err(BackendError::unavailable(format!(
                "API error ({}): {}",
                status, response_text
            ))
            .into());
        }

        let response_json: Value = serde_json::from_str(&response_text).map_err(|e| {
            BackendError::generation_failed(format!("malformed response body: {}", e))
        })?;

        let choice = response_json
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| BackendError::generation_failed("no choices in response"))?;

        let message = choice
            .get("message")
            .ok_or_else(|| BackendError::generation_failed("no message in response"))?;

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();

        let finish_reason = choice
            .get("finish_reason")
            .and_then(|f| f.as_str())
            .map(|s| s.to_string());

        let usage = response_json.get("usage").map(|u| TokenUsage {
            prompt_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            completion_tokens: u.get("completion_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            total_tokens: u.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
        });

        let model = response_json
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(model)
            .to_string();

        Ok(ChatResponse {
            message: ChatMessage::assistant(content),
            model,
            provider: PROVIDER_NAME.to_string(),
            finish_reason,
            usage,
        })
    }
}
