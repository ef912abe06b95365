//! Conversation history persistence for SiteMentor.
//!
//! [`ConversationStore`] keeps one JSON blob per session: an ordered array of
//! `{role, content}` messages, oldest first, bounded to a fixed length and
//! expired on a last-write TTL. Reads degrade to an empty history on any
//! backend failure; context loss must degrade the chat gracefully, not
//! break it. Writes propagate failures so callers can decide whether to
//! proceed without persistence.
//!
//! Backends implement [`sitementor_core::BlobStore`]:
//! - [`InMemoryBlobStore`]: testing and single-process deployments
//! - [`FileBlobStore`]: JSON file per key with persisted expiry
//! - [`FailingBlobStore`]: test double that fails every operation

pub mod failing;
pub mod file_backend;
pub mod in_memory;

pub use failing::FailingBlobStore;
pub use file_backend::FileBlobStore;
pub use in_memory::InMemoryBlobStore;

use std::sync::Arc;
use std::time::Duration;

use sitementor_core::error::StoreError;
use sitementor_core::message::{HistoryMessage, HistoryRole};
use sitementor_core::store::BlobStore;
use tracing::{debug, warn};

/// Default history TTL: 30 days, refreshed on every write.
pub const DEFAULT_TTL: Duration = Duration::from_secs(2_592_000);

/// Default bound on stored messages per session (8 Q/A pairs).
pub const DEFAULT_MAX_MESSAGES: usize = 16;

/// Key/value persistence of per-session message histories.
///
/// Two overlapping writes from concurrent turns on one session interleave
/// last-writer-wins on the full blob; each individual write is atomic, but
/// same-session concurrency is not serialized.
pub struct ConversationStore {
    backend: Arc<dyn BlobStore>,
    ttl: Duration,
    max_messages: usize,
}

impl ConversationStore {
    /// Create a store with explicit TTL and trimming bound.
    pub fn new(backend: Arc<dyn BlobStore>, ttl: Duration, max_messages: usize) -> Self {
        Self {
            backend,
            ttl,
            max_messages,
        }
    }

    /// Create a store with the default TTL (30 days) and bound (16 messages).
    pub fn with_defaults(backend: Arc<dyn BlobStore>) -> Self {
        Self::new(backend, DEFAULT_TTL, DEFAULT_MAX_MESSAGES)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn key(session_id: &str) -> String {
        format!("conversation:{session_id}")
    }

    /// Fetch the history for a session, oldest first.
    ///
    /// Returns `[]` if the session is absent, expired, or the backend
    /// fails; failures are logged, never propagated.
    pub async fn get(&self, session_id: &str) -> Vec<HistoryMessage> {
        let key = Self::key(session_id);
        let raw = match self.backend.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(session_id, error = %e, "History read failed, proceeding without context");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(history) => history,
            Err(e) => {
                warn!(session_id, error = %e, "History blob is corrupt, proceeding without context");
                Vec::new()
            }
        }
    }

    /// Persist the (trimmed) history and reset the TTL atomically.
    ///
    /// Propagates backend failures.
    pub async fn set(
        &self,
        session_id: &str,
        history: &[HistoryMessage],
    ) -> Result<(), StoreError> {
        let trimmed = trim_history(history, self.max_messages);
        let blob = serde_json::to_string(&trimmed)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.backend
            .set_with_ttl(&Self::key(session_id), blob, self.ttl)
            .await?;
        debug!(
            session_id,
            messages = trimmed.len(),
            ttl_secs = self.ttl.as_secs(),
            "History persisted"
        );
        Ok(())
    }

    /// Lightweight liveness probe. Diagnostics only; never gates a request.
    pub async fn health(&self) -> bool {
        matches!(self.backend.ping().await, Ok(true))
    }
}

/// Bound a history to its most recent `max` messages without starting the
/// kept window mid-pair when avoidable: if the first kept message is an
/// assistant message whose preceding user message was cut, that user message
/// replaces the first kept entry.
pub fn trim_history(history: &[HistoryMessage], max: usize) -> Vec<HistoryMessage> {
    if max == 0 {
        return Vec::new();
    }
    if history.len() <= max {
        return history.to_vec();
    }
    let cut = history.len() - max;
    let mut kept = history[cut..].to_vec();
    if kept[0].role == HistoryRole::Assistant && history[cut - 1].role == HistoryRole::User {
        kept[0] = history[cut - 1].clone();
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(i: usize) -> [HistoryMessage; 2] {
        [
            HistoryMessage::user(format!("question {i}")),
            HistoryMessage::assistant(format!("answer {i}")),
        ]
    }

    fn long_history(pairs: usize) -> Vec<HistoryMessage> {
        (0..pairs).flat_map(pair).collect()
    }

    #[test]
    fn trim_noop_when_within_bound() {
        let history = long_history(4);
        let trimmed = trim_history(&history, 16);
        assert_eq!(trimmed, history);
    }

    #[test]
    fn trim_keeps_last_entries() {
        let history = long_history(12); // 24 messages
        let trimmed = trim_history(&history, 16);
        assert_eq!(trimmed.len(), 16);
        assert_eq!(trimmed.last(), history.last());
    }

    #[test]
    fn trim_never_starts_mid_pair() {
        // 24 messages of aligned pairs: cutting 8 leaves the window starting
        // on a user message already.
        let history = long_history(12);
        let trimmed = trim_history(&history, 16);
        assert_eq!(trimmed[0].role, HistoryRole::User);

        // Force a mid-pair cut: odd trim bound puts an assistant message
        // first; the cut user message must replace it.
        let trimmed = trim_history(&history, 15);
        assert_eq!(trimmed.len(), 15);
        assert_eq!(trimmed[0].role, HistoryRole::User);
        assert_eq!(trimmed[0].content, "question 4");
        assert_eq!(trimmed[1].content, "question 5");
    }

    #[test]
    fn trim_to_zero_yields_empty() {
        let history = long_history(2);
        assert!(trim_history(&history, 0).is_empty());
    }

    #[tokio::test]
    async fn get_returns_empty_for_unknown_session() {
        let store = ConversationStore::with_defaults(Arc::new(InMemoryBlobStore::new()));
        assert!(store.get("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn set_then_get_roundtrip() {
        let store = ConversationStore::with_defaults(Arc::new(InMemoryBlobStore::new()));
        let history = long_history(2);
        store.set("s1", &history).await.unwrap();
        assert_eq!(store.get("s1").await, history);
    }

    #[tokio::test]
    async fn set_applies_trimming() {
        let store = ConversationStore::with_defaults(Arc::new(InMemoryBlobStore::new()));
        let history = long_history(20); // 40 messages
        store.set("s1", &history).await.unwrap();
        let read = store.get("s1").await;
        assert_eq!(read.len(), 16);
        assert_eq!(read.last(), history.last());
    }

    #[tokio::test]
    async fn ttl_is_refreshed_on_every_write() {
        let backend = Arc::new(InMemoryBlobStore::new());
        let store = ConversationStore::new(backend.clone(), Duration::from_secs(3600), 16);

        store.set("s1", &long_history(1)).await.unwrap();
        let first = backend.ttl("conversation:s1").await.unwrap().unwrap();

        store.set("s1", &long_history(2)).await.unwrap();
        let second = backend.ttl("conversation:s1").await.unwrap().unwrap();

        // Both writes leave a TTL within a few seconds of the configured value.
        for ttl in [first, second] {
            assert!(ttl <= Duration::from_secs(3600));
            assert!(ttl >= Duration::from_secs(3595));
        }
    }

    #[tokio::test]
    async fn backend_failure_degrades_reads_to_empty() {
        let store = ConversationStore::with_defaults(Arc::new(FailingBlobStore::new()));
        assert!(store.get("s1").await.is_empty());
    }

    #[tokio::test]
    async fn backend_failure_propagates_on_write() {
        let store = ConversationStore::with_defaults(Arc::new(FailingBlobStore::new()));
        let err = store.set("s1", &long_history(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn corrupt_blob_degrades_to_empty() {
        let backend = Arc::new(InMemoryBlobStore::new());
        backend
            .set_with_ttl("conversation:s1", "not json".into(), DEFAULT_TTL)
            .await
            .unwrap();
        let store = ConversationStore::with_defaults(backend);
        assert!(store.get("s1").await.is_empty());
    }

    #[tokio::test]
    async fn oversized_message_is_accepted() {
        let store = ConversationStore::with_defaults(Arc::new(InMemoryBlobStore::new()));
        let big = "x".repeat(50_000);
        let history = vec![
            HistoryMessage::user(big.clone()),
            HistoryMessage::assistant("short answer"),
        ];
        store.set("s1", &history).await.unwrap();
        let read = store.get("s1").await;
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].content.len(), 50_000);
    }

    #[tokio::test]
    async fn health_reflects_backend() {
        let healthy = ConversationStore::with_defaults(Arc::new(InMemoryBlobStore::new()));
        assert!(healthy.health().await);

        let unhealthy = ConversationStore::with_defaults(Arc::new(FailingBlobStore::new()));
        assert!(!unhealthy.health().await);
    }
}
