//! Context assembly for SiteMentor chat requests.
//!
//! [`ContextManager`] ties together the two storage seams:
//! - the durable [`TurnRepository`] holding per-turn records with the
//!   pre-save-stub lifecycle, and
//! - the [`ConversationStore`] holding the trimmed role/content history blob
//!   fed back into the generator prompt.
//!
//! The stub-before-generate ordering is the core fix for context loss: the
//! question is durably discoverable before generation starts, and a later
//! request can never observe a completed turn in the UI that the context
//! loader cannot see.

pub mod repository;
pub mod topics;

pub use repository::{FailingTurnRepository, InMemoryTurnRepository};
pub use topics::{build_context_hint, extract_topics, has_referential_trigger, TopicAnchors};

use std::sync::Arc;

use sitementor_core::error::{RepoError, StoreError};
use sitementor_core::message::{ChatMessage, HistoryMessage};
use sitementor_core::turn::{ConversationId, Turn, TurnRepository};
use sitementor_store::ConversationStore;
use tracing::{debug, warn};

/// Default number of recent turns loaded per request.
pub const DEFAULT_LOAD_LIMIT: usize = 10;

/// Message-window bound for the assembled generator message list.
pub const DEFAULT_MAX_MESSAGES: usize = 16;

/// Messages kept from the head of an over-long window. The first exchange
/// sometimes carries scope-setting information, so a little of the original
/// framing is preserved alongside maximal recent context.
pub const DEFAULT_WINDOW_HEAD: usize = 2;

/// Builds LLM-ready context from stored conversation state.
pub struct ContextManager {
    turns: Arc<dyn TurnRepository>,
    store: ConversationStore,
    load_limit: usize,
    max_messages: usize,
    window_head: usize,
}

impl ContextManager {
    pub fn new(turns: Arc<dyn TurnRepository>, store: ConversationStore) -> Self {
        Self {
            turns,
            store,
            load_limit: DEFAULT_LOAD_LIMIT,
            max_messages: DEFAULT_MAX_MESSAGES,
            window_head: DEFAULT_WINDOW_HEAD,
        }
    }

    /// Override the per-request turn load limit.
    pub fn with_load_limit(mut self, limit: usize) -> Self {
        self.load_limit = limit;
        self
    }

    /// Override the assembled-message window bounds.
    pub fn with_window(mut self, max_messages: usize, head: usize) -> Self {
        self.max_messages = max_messages;
        self.window_head = head;
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Synchronously create a processing stub BEFORE generation begins.
    ///
    /// If generation is slow or the process restarts, the question is still
    /// discoverable, and a later request reading history sees every turn the
    /// user can see.
    pub async fn pre_save_stub(
        &self,
        session_id: &str,
        user_id: Option<String>,
        question: &str,
    ) -> Result<ConversationId, RepoError> {
        let turn = Turn::stub(session_id, user_id, question);
        let id = self.turns.insert(turn).await?;
        debug!(session_id, conversation_id = %id, "Pre-saved processing stub");
        Ok(id)
    }

    /// Transition a stub to completed with the final text.
    pub async fn update_response(
        &self,
        id: &ConversationId,
        text: &str,
        tokens_used: u32,
    ) -> Result<(), RepoError> {
        self.turns.complete(id, text, tokens_used).await
    }

    /// Load the most recent completed turns for a session, in chronological
    /// (oldest-first) order. Repository failures degrade to an empty
    /// context; a chat without history beats no chat at all.
    pub async fn load_context(&self, session_id: &str) -> Vec<Turn> {
        let mut turns = match self.turns.recent(session_id, self.load_limit).await {
            Ok(turns) => turns,
            Err(e) => {
                warn!(session_id, error = %e, "Context load failed, proceeding without history");
                return Vec::new();
            }
        };
        turns.retain(Turn::is_completed);
        turns.reverse(); // newest-first → chronological
        turns
    }

    /// Derive topic anchors from recent turns.
    pub fn extract_topics(&self, turns: &[Turn]) -> TopicAnchors {
        topics::extract_topics(turns)
    }

    /// Build the pronoun-resolution hint for a question.
    pub fn build_context_hint(&self, question: &str, anchors: &TopicAnchors) -> String {
        topics::build_context_hint(question, anchors)
    }

    /// Assemble the full generator message list: stored history plus the
    /// current question, canonicalized and bounded.
    ///
    /// Canonicalization trims whitespace and drops empty messages. If the
    /// history exceeds the window bound, the first `window_head` and the
    /// most recent remainder are kept.
    pub async fn build_messages(&self, session_id: &str, question: &str) -> Vec<ChatMessage> {
        let history = self.store.get(session_id).await;
        let mut messages: Vec<ChatMessage> = history
            .iter()
            .map(ChatMessage::from)
            .map(|mut m| {
                m.content = m.content.trim().to_string();
                m
            })
            .filter(|m| !m.content.is_empty())
            .collect();

        if messages.len() > self.max_messages {
            let tail_len = self.max_messages - self.window_head;
            let tail_start = messages.len() - tail_len;
            let mut windowed = messages[..self.window_head].to_vec();
            windowed.extend_from_slice(&messages[tail_start..]);
            messages = windowed;
        }

        messages.push(ChatMessage::user(question.trim()));
        messages
    }

    /// Append a completed Q/A exchange to the session history blob
    /// (read, append, trimmed atomic write with TTL refresh).
    pub async fn persist_exchange(
        &self,
        session_id: &str,
        question: &str,
        answer: &str,
    ) -> Result<(), StoreError> {
        let mut history = self.store.get(session_id).await;
        history.push(HistoryMessage::user(question));
        history.push(HistoryMessage::assistant(answer));
        self.store.set(session_id, &history).await
    }

    /// Store liveness, for diagnostics only.
    pub async fn store_healthy(&self) -> bool {
        self.store.health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitementor_store::{FailingBlobStore, InMemoryBlobStore};

    fn manager() -> ContextManager {
        ContextManager::new(
            Arc::new(InMemoryTurnRepository::new()),
            ConversationStore::with_defaults(Arc::new(InMemoryBlobStore::new())),
        )
    }

    #[tokio::test]
    async fn stub_then_update_lifecycle() {
        let mgr = manager();
        let id = mgr
            .pre_save_stub("s1", Some("user_1".into()), "What is a fire collar?")
            .await
            .unwrap();

        // Stub is not visible as context while processing.
        assert!(mgr.load_context("s1").await.is_empty());

        mgr.update_response(&id, "A fire collar is...", 120)
            .await
            .unwrap();

        let context = mgr.load_context("s1").await;
        assert_eq!(context.len(), 1);
        assert!(context[0].is_completed());
        assert_eq!(context[0].tokens_used, 120);
    }

    #[tokio::test]
    async fn load_context_is_chronological() {
        let mgr = manager();
        for i in 0..3 {
            let id = mgr
                .pre_save_stub("s1", None, &format!("question {i}"))
                .await
                .unwrap();
            mgr.update_response(&id, &format!("answer {i}"), 10)
                .await
                .unwrap();
        }

        let context = mgr.load_context("s1").await;
        assert_eq!(context.len(), 3);
        assert_eq!(context[0].question, "question 0");
        assert_eq!(context[2].question, "question 2");
    }

    #[tokio::test]
    async fn load_context_honors_limit() {
        let mgr = ContextManager::new(
            Arc::new(InMemoryTurnRepository::new()),
            ConversationStore::with_defaults(Arc::new(InMemoryBlobStore::new())),
        )
        .with_load_limit(2);

        for i in 0..5 {
            let id = mgr.pre_save_stub("s1", None, &format!("q{i}")).await.unwrap();
            mgr.update_response(&id, "a", 1).await.unwrap();
        }

        let context = mgr.load_context("s1").await;
        assert_eq!(context.len(), 2);
        assert_eq!(context[0].question, "q3");
        assert_eq!(context[1].question, "q4");
    }

    #[tokio::test]
    async fn load_context_swallows_repo_failure() {
        let mgr = ContextManager::new(
            Arc::new(FailingTurnRepository),
            ConversationStore::with_defaults(Arc::new(InMemoryBlobStore::new())),
        );
        assert!(mgr.load_context("s1").await.is_empty());
    }

    #[tokio::test]
    async fn build_messages_appends_question() {
        let mgr = manager();
        mgr.persist_exchange("s1", "first question", "first answer")
            .await
            .unwrap();

        let messages = mgr.build_messages("s1", "follow-up").await;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "first question");
        assert_eq!(messages[2].content, "follow-up");
    }

    #[tokio::test]
    async fn build_messages_drops_empty_and_trims() {
        let mgr = manager();
        let history = vec![
            HistoryMessage::user("  padded question  "),
            HistoryMessage::assistant("   "),
            HistoryMessage::assistant("real answer"),
        ];
        mgr.store().set("s1", &history).await.unwrap();

        let messages = mgr.build_messages("s1", "next").await;
        assert_eq!(messages.len(), 3); // blank assistant message dropped
        assert_eq!(messages[0].content, "padded question");
        assert_eq!(messages[1].content, "real answer");
    }

    #[tokio::test]
    async fn build_messages_windows_head_and_tail() {
        let mgr = ContextManager::new(
            Arc::new(InMemoryTurnRepository::new()),
            // Bound of 20 so the store itself does not trim below the window.
            ConversationStore::new(
                Arc::new(InMemoryBlobStore::new()),
                std::time::Duration::from_secs(60),
                20,
            ),
        );
        let history: Vec<HistoryMessage> = (0..20)
            .map(|i| {
                if i % 2 == 0 {
                    HistoryMessage::user(format!("m{i}"))
                } else {
                    HistoryMessage::assistant(format!("m{i}"))
                }
            })
            .collect();
        mgr.store().set("s1", &history).await.unwrap();

        let messages = mgr.build_messages("s1", "current").await;
        // 2 head + 14 tail + current question
        assert_eq!(messages.len(), 17);
        assert_eq!(messages[0].content, "m0");
        assert_eq!(messages[1].content, "m1");
        assert_eq!(messages[2].content, "m6");
        assert_eq!(messages[15].content, "m19");
        assert_eq!(messages[16].content, "current");
    }

    #[tokio::test]
    async fn persist_exchange_accumulates() {
        let mgr = manager();
        mgr.persist_exchange("s1", "q1", "a1").await.unwrap();
        mgr.persist_exchange("s1", "q2", "a2").await.unwrap();

        let history = mgr.store().get("s1").await;
        assert_eq!(history.len(), 4);
        assert_eq!(history[3].content, "a2");
    }

    #[tokio::test]
    async fn topic_round_trip_through_context() {
        let mgr = manager();
        let id = mgr
            .pre_save_stub("s1", None, "Tell me about acoustic lagging requirements")
            .await
            .unwrap();
        mgr.update_response(&id, "Acoustic lagging must be...", 50)
            .await
            .unwrap();

        let turns = mgr.load_context("s1").await;
        let anchors = mgr.extract_topics(&turns);
        let hint = mgr.build_context_hint("when do I need to install it?", &anchors);
        assert!(!hint.is_empty());
        assert!(hint.contains("acoustic lagging"));
    }

    #[tokio::test]
    async fn store_outage_degrades_gracefully() {
        let mgr = ContextManager::new(
            Arc::new(InMemoryTurnRepository::new()),
            ConversationStore::with_defaults(Arc::new(FailingBlobStore::new())),
        );
        let messages = mgr.build_messages("s1", "question").await;
        assert_eq!(messages.len(), 1, "history lost, question still present");
        assert!(!mgr.store_healthy().await);
    }
}
