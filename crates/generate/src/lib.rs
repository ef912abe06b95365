//! Generator wrappers: timeout enforcement and the deterministic fallback.
//!
//! [`TimeoutGenerator`] bounds how long any backend call may run.
//! [`TemplateGenerator`] is the last line of defense: when the real backend
//! is down, slow, or misconfigured, it produces a useful canonical-section
//! response from a fixed template so the user never sees a raw error.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use sitementor_core::error::GeneratorError;
use sitementor_core::generator::{Generation, Generator};
use sitementor_core::message::{ChatMessage, ChatRole};

/// Default bound on one generation call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(18);

/// Wraps a generator with a hard wall-clock bound.
///
/// An elapsed timeout surfaces as [`GeneratorError::Timeout`], which the
/// pipeline treats like any other generation failure.
pub struct TimeoutGenerator {
    inner: Arc<dyn Generator>,
    timeout: Duration,
}

impl TimeoutGenerator {
    pub fn new(inner: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn with_default_timeout(inner: Arc<dyn Generator>) -> Self {
        Self::new(inner, DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl Generator for TimeoutGenerator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> std::result::Result<Generation, GeneratorError> {
        match tokio::time::timeout(self.timeout, self.inner.generate(system_prompt, messages))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                let timeout_secs = self.timeout.as_secs();
                warn!(
                    generator = self.inner.name(),
                    timeout_secs, "Generation timed out"
                );
                Err(GeneratorError::Timeout { timeout_secs })
            }
        }
    }

    async fn health_check(&self) -> std::result::Result<bool, GeneratorError> {
        self.inner.health_check().await
    }
}

/// Deterministic template fallback.
///
/// Produces a fixed, honest response in the canonical section structure.
/// When a topic label is set, the response names the topic so a follow-up
/// question still gets an on-subject (if generic) answer.
pub struct TemplateGenerator {
    topic_label: Option<String>,
}

impl TemplateGenerator {
    pub fn new() -> Self {
        Self { topic_label: None }
    }

    /// Anchor the fallback text to a known discussion topic.
    pub fn with_topic(mut self, label: impl Into<String>) -> Self {
        self.topic_label = Some(label.into());
        self
    }

    fn render(&self, question: &str) -> String {
        let subject = match &self.topic_label {
            Some(label) => format!("your question about {label}"),
            None => "your question".to_string(),
        };
        format!(
            "## 🔧 **Technical Answer**\n\n\
             I couldn't reach the live guidance service just now, so I can't give you a \
             detailed answer to {subject} (\"{question}\"). For anything affecting \
             compliance, work from the approved documentation and the relevant code \
             clauses rather than memory.\n\n\
             ## 🤝 **Mentoring Insight**\n\n\
             When information is unavailable, the safe move on site is always to pause \
             and verify rather than proceed on assumption. That habit is what separates \
             defensible work from rework.\n\n\
             ## 📋 **Next Steps**\n\n\
             - Ask your question again in a minute or two\n\
             - Check the approved drawings and specifications for {subject_short}\n\
             - Confirm any critical requirement with your certifier before installing",
            subject_short = self
                .topic_label
                .as_deref()
                .unwrap_or("this part of the work"),
        )
    }
}

impl Default for TemplateGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for TemplateGenerator {
    fn name(&self) -> &str {
        "template"
    }

    async fn generate(
        &self,
        _system_prompt: &str,
        messages: &[ChatMessage],
    ) -> std::result::Result<Generation, GeneratorError> {
        let question = messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or("your question");
        Ok(Generation::new(self.render(question), 0))
    }
}
