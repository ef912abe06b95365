//! Chat request orchestration.
//!
//! [`ChatOrchestrator`] runs one question through the full pipeline:
//! load context → anchor topics → assemble prompt → pre-save a processing
//! stub → generate (with deterministic fallback) → format → persist →
//! validate. The output contract is strict: every request produces a valid
//! [`StructuredResponse`], degrading through the template fallback and
//! finally the apology path rather than surfacing backend failures.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use sitementor_config::AppConfig;
use sitementor_context::ContextManager;
use sitementor_core::error::{Error, Result};
use sitementor_core::generator::{Generation, Generator};
use sitementor_core::message::{ChatMessage, Tier};
use sitementor_core::response::{Block, ResponseMeta, StructuredResponse};
use sitementor_core::sections::TECHNICAL_ANSWER;
use sitementor_core::store::BlobStore;
use sitementor_core::turn::{ConversationId, TurnRepository};
use sitementor_format::{extract_mentoring_insight, format as format_response};
use sitementor_generate::{TemplateGenerator, TimeoutGenerator};
use sitementor_schema::SchemaGuard;
use sitementor_store::{ConversationStore, FileBlobStore, InMemoryBlobStore};

/// Base system prompt sent with every generation request.
const BASE_SYSTEM_PROMPT: &str = "You are SiteMentor, an experienced construction \
compliance mentor for builders and site supervisors. Give practical, code-aware \
guidance. Structure every answer with markdown sections; always include a \
'Technical Answer' section and a 'Mentoring Insight' section.";

/// One incoming chat request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub question: String,
    pub session_id: String,
    pub tier: Tier,
    pub user_id: Option<String>,
    /// Pre-retrieved reference material injected into the prompt, if any.
    pub knowledge_context: Option<String>,
}

impl ChatRequest {
    pub fn new(question: impl Into<String>, session_id: impl Into<String>, tier: Tier) -> Self {
        Self {
            question: question.into(),
            session_id: session_id.into(),
            tier,
            user_id: None,
            knowledge_context: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_knowledge(mut self, context: impl Into<String>) -> Self {
        self.knowledge_context = Some(context.into());
        self
    }
}

/// Where a request is in the pipeline. Reported in response metadata and
/// logs so a stuck or failed request is attributable to a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Dispatched,
    ContextLoaded,
    Generating,
    Formatted,
    Persisted,
    Validated,
    Done,
    Failed,
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Dispatched => "dispatched",
            Self::ContextLoaded => "context_loaded",
            Self::Generating => "generating",
            Self::Formatted => "formatted",
            Self::Persisted => "persisted",
            Self::Validated => "validated",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Runs chat requests end to end.
pub struct ChatOrchestrator {
    context: Arc<ContextManager>,
    generator: Arc<dyn Generator>,
    guard: Arc<SchemaGuard>,
    base_prompt: String,
}

impl ChatOrchestrator {
    pub fn new(
        context: Arc<ContextManager>,
        generator: Arc<dyn Generator>,
        guard: Arc<SchemaGuard>,
    ) -> Self {
        Self {
            context,
            generator,
            guard,
            base_prompt: BASE_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Override the base system prompt.
    pub fn with_base_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.base_prompt = prompt.into();
        self
    }

    pub fn guard(&self) -> &SchemaGuard {
        &self.guard
    }

    /// Run one request through the pipeline.
    ///
    /// Only schema failures propagate; a response that cannot be made valid
    /// must not reach a client. Every other failure degrades: generation
    /// falls back to the template, storage failures are logged and skipped,
    /// and an unexpected internal error yields the apology response.
    pub async fn generate_response(&self, request: &ChatRequest) -> Result<StructuredResponse> {
        match self.run(request).await {
            Ok(response) => Ok(response),
            Err(Error::Schema(e)) => Err(Error::Schema(e)),
            Err(e) => {
                warn!(session_id = %request.session_id, error = %e,
                      "Pipeline failed, serving apology response");
                Ok(self.apology(request))
            }
        }
    }

    async fn run(&self, request: &ChatRequest) -> Result<StructuredResponse> {
        let session_id = request.session_id.as_str();
        let mut state = RequestState::Dispatched;
        debug!(session_id, %state, "Handling chat request");

        let turns = self.context.load_context(session_id).await;
        let anchors = self.context.extract_topics(&turns);
        let hint = self.context.build_context_hint(&request.question, &anchors);
        state = RequestState::ContextLoaded;
        debug!(session_id, %state, turns = turns.len(), topics = anchors.len(), "Context loaded");

        let messages = self
            .context
            .build_messages(session_id, &request.question)
            .await;
        let system_prompt = self.build_system_prompt(request, &hint);

        // The stub makes the question durably discoverable before the slow
        // part starts. A failed stub write is not fatal.
        let stub_id: Option<ConversationId> = match self
            .context
            .pre_save_stub(session_id, request.user_id.clone(), &request.question)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(session_id, error = %e, "Stub pre-save failed, continuing without it");
                None
            }
        };

        state = RequestState::Generating;
        debug!(session_id, %state, messages = messages.len(), "Calling generator");
        let generation = self
            .generate_with_fallback(&system_prompt, &messages, &anchors)
            .await;

        let raw = unwrap_envelope(&generation.text);
        let formatted = format_response(&raw);
        state = RequestState::Formatted;
        debug!(session_id, %state, sections = formatted.emoji_items.len(), "Response formatted");

        if let Some(id) = &stub_id {
            if let Err(e) = self
                .context
                .update_response(id, &formatted.text, generation.tokens_used)
                .await
            {
                warn!(session_id, conversation_id = %id, error = %e, "Turn completion failed");
            }
        }
        if let Err(e) = self
            .context
            .persist_exchange(session_id, &request.question, &formatted.text)
            .await
        {
            warn!(session_id, error = %e, "History persist failed, response still served");
        }
        state = RequestState::Persisted;
        debug!(session_id, %state, "Exchange persisted");

        let payload = self.build_payload(request, &stub_id, &formatted.text, &generation);
        let (response, repaired) = self.guard.ensure_valid(payload)?;
        state = RequestState::Validated;
        debug!(session_id, %state, repaired, "Response validated");
        if repaired {
            warn!(session_id, "Response needed schema repair before serving");
        }

        state = RequestState::Done;
        info!(session_id, %state, generator = self.generator.name(),
              tokens_used = generation.tokens_used, "Chat request complete");
        Ok(response)
    }

    fn build_system_prompt(&self, request: &ChatRequest, hint: &str) -> String {
        let mut prompt = self.base_prompt.clone();
        prompt.push_str("\n\n");
        prompt.push_str(tier_instruction(request.tier));
        if !hint.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(hint);
        }
        if let Some(knowledge) = &request.knowledge_context {
            prompt.push_str("\n\nREFERENCE MATERIAL:\n");
            prompt.push_str(knowledge);
        }
        prompt
    }

    async fn generate_with_fallback(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        anchors: &sitementor_context::TopicAnchors,
    ) -> Generation {
        match self.generator.generate(system_prompt, messages).await {
            Ok(generation) => generation,
            Err(e) => {
                warn!(generator = self.generator.name(), error = %e,
                      "Generation failed, using template fallback");
                let mut fallback = TemplateGenerator::new();
                if let Some((_, label)) = anchors.last() {
                    fallback = fallback.with_topic(label);
                }
                // The template generator cannot fail.
                fallback
                    .generate(system_prompt, messages)
                    .await
                    .unwrap_or_else(|_| Generation::new("", 0))
            }
        }
    }

    fn build_payload(
        &self,
        request: &ChatRequest,
        stub_id: &Option<ConversationId>,
        text: &str,
        generation: &Generation,
    ) -> serde_json::Value {
        let summary = extract_mentoring_insight(text)
            .map(|s| truncate(&s, 200))
            .unwrap_or_else(|| truncate(text.trim(), 200));

        let mut meta = ResponseMeta::new("🔧")
            .with_extra("tier", json!(request.tier.as_str()))
            .with_extra("session_id", json!(request.session_id))
            .with_extra("tokens_used", json!(generation.tokens_used))
            .with_extra("generator", json!(self.generator.name()))
            .with_extra("state", json!(RequestState::Done.to_string()));
        if let Some(id) = stub_id {
            meta = meta.with_extra("conversation_id", json!(id.to_string()));
        }

        let response = StructuredResponse {
            title: TECHNICAL_ANSWER.to_string(),
            summary,
            blocks: vec![Block::markdown(text)],
            meta,
        };
        // StructuredResponse serialization cannot fail.
        serde_json::to_value(&response).unwrap_or_else(|_| json!({}))
    }

    /// Last-resort response when the pipeline itself failed. Built directly
    /// so it cannot fail again, and formatted so it still carries the
    /// canonical structure.
    fn apology(&self, request: &ChatRequest) -> StructuredResponse {
        let formatted = format_response(
            "I ran into a problem answering your question and couldn't complete a \
             proper response. Nothing was lost; please ask again in a moment.",
        );
        StructuredResponse {
            title: TECHNICAL_ANSWER.to_string(),
            summary: "Something went wrong while answering; please retry shortly.".to_string(),
            blocks: vec![Block::markdown(formatted.text)],
            meta: ResponseMeta::new("🔧")
                .with_extra("tier", json!(request.tier.as_str()))
                .with_extra("session_id", json!(request.session_id))
                .with_extra("state", json!(RequestState::Failed.to_string())),
        }
    }
}

/// Assemble the full pipeline from configuration.
///
/// The caller supplies the generator backend and durable turn storage; the
/// blob store backend, trimming bounds, context window, and the timeout
/// wrapper all come from the (already validated) config.
pub fn build_orchestrator(
    config: &AppConfig,
    backend: Arc<dyn Generator>,
    turns: Arc<dyn TurnRepository>,
) -> ChatOrchestrator {
    let blob: Arc<dyn BlobStore> = match config.store.backend.as_str() {
        // validate() guarantees file_dir is set when the file backend is chosen
        "file" => Arc::new(FileBlobStore::new(
            config.store.file_dir.clone().unwrap_or_default(),
        )),
        _ => Arc::new(InMemoryBlobStore::new()),
    };
    let store = ConversationStore::new(
        blob,
        Duration::from_secs(config.store.ttl_seconds),
        config.store.max_history_messages,
    );
    let context = ContextManager::new(turns, store)
        .with_load_limit(config.context.load_limit)
        .with_window(config.context.max_messages, config.context.window_head);
    let generator = TimeoutGenerator::new(
        backend,
        Duration::from_secs(config.generator.timeout_secs),
    );
    ChatOrchestrator::new(
        Arc::new(context),
        Arc::new(generator),
        Arc::new(SchemaGuard::new()),
    )
}

fn tier_instruction(tier: Tier) -> &'static str {
    match tier {
        Tier::Starter => {
            "The user is on the starter tier: keep answers focused and practical, \
             and point to where the relevant code clauses can be found."
        }
        Tier::Pro => {
            "The user is on the pro tier: include specific code clause references \
             and compliance verification steps where relevant."
        }
        Tier::ProPlus => {
            "The user is on the pro plus tier: give full depth: code clauses, \
             alternative solutions, authority requirements, and documentation needs."
        }
    }
}

/// Generators occasionally return a JSON envelope instead of plain text.
/// Unwrap the flat `text` field or joined block contents; anything else
/// passes through unchanged.
fn unwrap_envelope(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with('{') {
        return raw.to_string();
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return raw.to_string();
    };
    if let Some(text) = value.get("text").and_then(|t| t.as_str()) {
        return text.to_string();
    }
    if let Some(blocks) = value.get("blocks").and_then(|b| b.as_array()) {
        let joined: Vec<&str> = blocks
            .iter()
            .filter_map(|b| b.get("content").and_then(|c| c.as_str()))
            .collect();
        if !joined.is_empty() {
            return joined.join("\n\n");
        }
    }
    raw.to_string()
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}…", cut.trim_end())
    }
}
