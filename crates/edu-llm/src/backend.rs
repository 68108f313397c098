//! Content Backend
//!
//! [`ContentBackend`] is the seam the MCP adapters call through. The
//! shipped implementation, [`LlmContentBackend`], prompts an
//! [`LlmProvider`] for a JSON document and hands the parsed value back
//! without imposing a schema on it. [`TimeoutBackend`] adds an optional
//! deadline around any backend.

use async_trait::async_trait;
use edu_core::BackendError;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::prompts;
use crate::provider::{ChatMessage, ChatRequest, LlmProvider};

/// Structured value produced by a backend
pub type GenerationResult = Value;

/// Educational content generation
#[async_trait]
pub trait ContentBackend: Send + Sync {
    /// Multiple-choice questions for `topic`
    async fn generate_mcq(&self, topic: &str) -> Result<GenerationResult, BackendError>;

    /// Lesson plan for `subject`
    async fn generate_lesson_plan(&self, subject: &str) -> Result<GenerationResult, BackendError>;
}

#[async_trait]
impl<T: ContentBackend + ?Sized> ContentBackend for Arc<T> {
    async fn generate_mcq(&self, topic: &str) -> Result<GenerationResult, BackendError> {
        (**self).generate_mcq(topic).await
    }

    async fn generate_lesson_plan(&self, subject: &str) -> Result<GenerationResult, BackendError> {
        (**self).generate_lesson_plan(subject).await
    }
}

/// Knobs for the LLM-backed generator
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Questions requested per MCQ call
    pub num_questions: usize,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: Some(0.7),
            max_tokens: None,
            num_questions: 5,
        }
    }
}

/// Backend that asks an LLM for the content
pub struct LlmContentBackend<P> {
    provider: P,
    options: GenerationOptions,
}

impl<P: LlmProvider> LlmContentBackend<P> {
    pub fn new(provider: P, options: GenerationOptions) -> Self {
        Self { provider, options }
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    async fn complete(&self, system: &str, prompt: String) -> Result<Value, BackendError> {
        let mut request = ChatRequest::new(vec![ChatMessage::system(system), ChatMessage::user(prompt)])
            .with_json_mode();
        if let Some(temp) = self.options.temperature {
            request = request.with_temperature(temp);
        }
        if let Some(max_tokens) = self.options.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let response = self
            .provider
            .chat(&self.options.model, request)
            .await
            .map_err(into_backend_error)?;

        debug!(
            model = %response.model,
            finish_reason = ?response.finish_reason,
            "Generation complete"
        );

        extract_json(&response.message.content)
    }
}

#[async_trait]
impl<P: LlmProvider> ContentBackend for LlmContentBackend<P> {
    async fn generate_mcq(&self, topic: &str) -> Result<GenerationResult, BackendError> {
        info!(topic = %topic, count = self.options.num_questions, "Generating MCQs");

        let prompt = prompts::mcq_prompt(topic, self.options.num_questions);
        match self.complete(prompts::MCQ_SYSTEM, prompt).await? {
            list @ Value::Array(_) => Ok(list),
            Value::Object(mut map) => match map.remove("questions") {
                Some(list @ Value::Array(_)) => Ok(list),
                _ => Err(BackendError::generation_failed(
                    "reply did not contain a list of questions",
                )),
            },
            _ => Err(BackendError::generation_failed(
                "reply did not contain a list of questions",
            )),
        }
    }

    async fn generate_lesson_plan(&self, subject: &str) -> Result<GenerationResult, BackendError> {
        info!(subject = %subject, "Generating lesson plan");

        let prompt = prompts::lesson_plan_prompt(subject);
        match self.complete(prompts::LESSON_PLAN_SYSTEM, prompt).await? {
            plan @ Value::Object(_) => Ok(plan),
            _ => Err(BackendError::generation_failed(
                "reply was not a lesson plan object",
            )),
        }
    }
}

/// Recover the backend error kind from a provider failure.
fn into_backend_error(err: anyhow::Error) -> BackendError {
    match err.downcast::<BackendError>() {
        Ok(backend) => backend,
        Err(other) => BackendError::Unavailable(format!("{:#}", other)),
    }
}

/// Pull a JSON document out of a model reply.
///
/// Accepts bare JSON, a fenced ```json block, or JSON surrounded by prose.
pub(crate) fn extract_json(text: &str) -> Result<Value, BackendError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(BackendError::generation_failed("empty reply"));
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let unfenced = strip_fence(trimmed);
    if let Ok(value) = serde_json::from_str(unfenced) {
        return Ok(value);
    }

    let start = unfenced.find(|c| c == '{' || c == '[');
    let end = unfenced.rfind(|c| c == '}' || c == ']');
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            if let Ok(value) = serde_json::from_str(&unfenced[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(BackendError::generation_failed("reply was not valid JSON"))
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the language tag line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Optional deadline around another backend.
///
/// `None` waits as long as the inner backend does.
pub struct TimeoutBackend<B> {
    inner: B,
    timeout: Option<Duration>,
}

impl<B: ContentBackend> TimeoutBackend<B> {
    pub fn new(inner: B, timeout: Option<Duration>) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn with_deadline<F>(&self, what: &str, fut: F) -> Result<GenerationResult, BackendError>
    where
        F: Future<Output = Result<GenerationResult, BackendError>> + Send,
    {
        let Some(limit) = self.timeout else {
            return fut.await;
        };

        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation = %what, timeout = ?limit, "Backend call timed out");
                Err(BackendError::Timeout(limit))
            }
        }
    }
}

#[async_trait]
impl<B: ContentBackend> ContentBackend for TimeoutBackend<B> {
    async fn generate_mcq(&self, topic: &str) -> Result<GenerationResult, BackendError> {
        self.with_deadline("generate_mcq", self.inner.generate_mcq(topic)).await
    }

    async fn generate_lesson_plan(&self, subject: &str) -> Result<GenerationResult, BackendError> {
        self.with_deadline("generate_lesson_plan", self.inner.generate_lesson_plan(subject))
            .await
    }
}
