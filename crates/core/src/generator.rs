//! Generator trait: the abstraction over the LLM backend.
//!
//! A Generator takes a system prompt and an ordered message list and returns
//! raw text. The pipeline treats any failure (timeout, backend error, missing
//! credentials) as "unavailable" and falls back to deterministic templated
//! output; generation failures are never surfaced to the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GeneratorError;
use crate::message::ChatMessage;

/// The result of one generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// The raw generated text, before formatting.
    pub text: String,

    /// Tokens consumed, as reported by the backend (0 when unknown).
    #[serde(default)]
    pub tokens_used: u32,
}

impl Generation {
    pub fn new(text: impl Into<String>, tokens_used: u32) -> Self {
        Self {
            text: text.into(),
            tokens_used,
        }
    }
}

/// The core Generator trait.
///
/// Implementations: an OpenAI-style HTTP backend in production; scripted
/// mocks in tests; the deterministic template fallback in this workspace.
#[async_trait]
pub trait Generator: Send + Sync {
    /// A human-readable name for this generator (e.g., "openai", "template").
    fn name(&self) -> &str;

    /// Send the prompt and messages and get raw text back.
    async fn generate(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> std::result::Result<Generation, GeneratorError>;

    /// Health check: can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, GeneratorError> {
        Ok(true)
    }
}
