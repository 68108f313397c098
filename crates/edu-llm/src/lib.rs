//! edu-llm: Content generation over LLM providers
//!
//! ## Endpoints
//!
//! | Provider | Base URL | Auth Method |
//! |----------|----------|-------------|
//! | OpenAI (or compatible gateway) | `https://api.openai.com/v1` | `Bearer {OPENAI_API_KEY}` |
//!
//! ## Environment Variables
//!
//! ```bash
//! OPENAI_API_KEY=sk-xxx                    # optional for local gateways
//! OPENAI_BASE_URL=http://localhost:11434/v1  # any /chat/completions endpoint
//! ```
//!
//! The [`ContentBackend`] trait is what the MCP layer consumes; the
//! provider types underneath are an implementation detail of
//! [`LlmContentBackend`].

pub mod backend;
pub mod openai;
mod prompts;
pub mod provider;

pub use backend::{
    ContentBackend, GenerationOptions, GenerationResult, LlmContentBackend, TimeoutBackend,
};
pub use openai::OpenAiCompatClient;
pub use provider::{ChatMessage, ChatRequest, ChatResponse, LlmProvider, TokenUsage};
