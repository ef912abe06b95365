//! Turn repository backends.
//!
//! The in-memory implementation backs tests and single-process deployments;
//! production deployments put a document database behind the same trait.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use sitementor_core::error::RepoError;
use sitementor_core::turn::{ConversationId, Turn, TurnRepository};

/// A turn repository that stores records in a Vec.
pub struct InMemoryTurnRepository {
    turns: Arc<RwLock<Vec<Turn>>>,
}

impl InMemoryTurnRepository {
    pub fn new() -> Self {
        Self {
            turns: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn count(&self) -> usize {
        self.turns.read().await.len()
    }
}

impl Default for InMemoryTurnRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TurnRepository for InMemoryTurnRepository {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn insert(&self, turn: Turn) -> Result<ConversationId, RepoError> {
        let id = turn.conversation_id.clone();
        let mut turns = self.turns.write().await;
        if turns.iter().any(|t| t.conversation_id == id) {
            return Err(RepoError::Storage(format!(
                "duplicate conversation_id: {id}"
            )));
        }
        turns.push(turn);
        Ok(id)
    }

    async fn complete(
        &self,
        id: &ConversationId,
        response: &str,
        tokens_used: u32,
    ) -> Result<(), RepoError> {
        let mut turns = self.turns.write().await;
        let turn = turns
            .iter_mut()
            .find(|t| &t.conversation_id == id)
            .ok_or_else(|| RepoError::NotFound(id.to_string()))?;
        turn.complete(response, tokens_used);
        Ok(())
    }

    async fn get(&self, id: &ConversationId) -> Result<Option<Turn>, RepoError> {
        let turns = self.turns.read().await;
        Ok(turns.iter().find(|t| &t.conversation_id == id).cloned())
    }

    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, RepoError> {
        let turns = self.turns.read().await;
        // Insertion order is chronological; walk backwards for newest-first.
        Ok(turns
            .iter()
            .rev()
            .filter(|t| t.session_id == session_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// A turn repository that fails every operation; for outage-path tests.
pub struct FailingTurnRepository;

impl FailingTurnRepository {
    fn error() -> RepoError {
        RepoError::Storage("injected failure".into())
    }
}

#[async_trait]
impl TurnRepository for FailingTurnRepository {
    fn name(&self) -> &str {
        "failing"
    }

    async fn insert(&self, _turn: Turn) -> Result<ConversationId, RepoError> {
        Err(Self::error())
    }

    async fn complete(
        &self,
        _id: &ConversationId,
        _response: &str,
        _tokens_used: u32,
    ) -> Result<(), RepoError> {
        Err(Self::error())
    }

    async fn get(&self, _id: &ConversationId) -> Result<Option<Turn>, RepoError> {
        Err(Self::error())
    }

    async fn recent(&self, _session_id: &str, _limit: usize) -> Result<Vec<Turn>, RepoError> {
        Err(Self::error())
    }
}
