//! Turn domain type and the durable turn repository trait.
//!
//! A turn is one question/answer exchange. It is written in two phases:
//! a stub with `status = processing` is inserted *before* generation starts,
//! then updated in place to `completed` once the answer exists. The stub
//! guarantees that by the time a later request reads history, every turn the
//! user can see is also visible to the context loader; there is no
//! "invisible pending turn" race when a caller serializes its requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RepoError;

/// Unique identifier for a turn. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    /// Stub inserted, generation in flight.
    Processing,
    /// Final response attached. Never mutated afterwards.
    Completed,
}

/// One question/answer exchange within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub conversation_id: ConversationId,

    /// Groups turns into one conversation thread
    pub session_id: String,

    /// Optional authenticated user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// The user's question
    pub question: String,

    /// The final answer text; `None` while the stub is processing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    /// Lifecycle state
    pub status: TurnStatus,

    /// Tokens consumed by generation (0 while processing)
    #[serde(default)]
    pub tokens_used: u32,

    /// When the stub was inserted
    pub created_at: DateTime<Utc>,

    /// When the response was attached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Turn {
    /// Create a processing stub for a question, before generation begins.
    pub fn stub(
        session_id: impl Into<String>,
        user_id: Option<String>,
        question: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: ConversationId::new(),
            session_id: session_id.into(),
            user_id,
            question: question.into(),
            response: None,
            status: TurnStatus::Processing,
            tokens_used: 0,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Transition the stub to completed with the final answer.
    pub fn complete(&mut self, response: impl Into<String>, tokens_used: u32) {
        self.response = Some(response.into());
        self.status = TurnStatus::Completed;
        self.tokens_used = tokens_used;
        self.completed_at = Some(Utc::now());
    }

    pub fn is_completed(&self) -> bool {
        self.status == TurnStatus::Completed
    }
}

/// Durable turn storage.
///
/// Implementations: in-memory (tests and single-process deployments); a
/// document database in production. Both write phases operate on the same
/// record keyed by `conversation_id`.
#[async_trait]
pub trait TurnRepository: Send + Sync {
    /// The repository name (e.g., "in_memory").
    fn name(&self) -> &str;

    /// Insert a new turn record (normally a processing stub).
    async fn insert(&self, turn: Turn) -> std::result::Result<ConversationId, RepoError>;

    /// Attach the final response to an existing turn.
    async fn complete(
        &self,
        id: &ConversationId,
        response: &str,
        tokens_used: u32,
    ) -> std::result::Result<(), RepoError>;

    /// Fetch a turn by ID.
    async fn get(&self, id: &ConversationId) -> std::result::Result<Option<Turn>, RepoError>;

    /// Fetch the most recent turns for a session, newest first.
    async fn recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> std::result::Result<Vec<Turn>, RepoError>;
}
