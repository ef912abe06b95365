//! The StructuredResponse output contract.
//!
//! Every response emitted by the pipeline satisfies this shape; there is no
//! pass-through path for invalid payloads. The wire shape is bit-exact for
//! client integrations:
//!
//! ```json
//! {
//!   "title": "...",
//!   "summary": "...",
//!   "blocks": [{"type": "markdown", "content": "..."}],
//!   "meta": {"emoji": "🔧", "schema": "v2", "mapped": false, ...}
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Current schema version tag.
pub const SCHEMA_VERSION: &str = "v2";

/// Content block kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Markdown,
    Code,
    List,
    Table,
}

/// One ordered content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub kind: BlockType,
    pub content: String,
}

impl Block {
    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            kind: BlockType::Markdown,
            content: content.into(),
        }
    }
}

/// Response metadata. Fixed fields plus free-form extensible ones
/// (tier, session_id, tokens_used, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// Primary marker glyph for the response.
    pub emoji: String,

    /// Schema version tag (always "v2" on emitted responses).
    pub schema: String,

    /// Whether this response was mapped/repaired into shape rather than
    /// produced valid.
    pub mapped: bool,

    /// Free-form extensible fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ResponseMeta {
    pub fn new(emoji: impl Into<String>) -> Self {
        Self {
            emoji: emoji.into(),
            schema: SCHEMA_VERSION.into(),
            mapped: false,
            extra: serde_json::Map::new(),
        }
    }

    /// Insert an extensible field, builder-style.
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// The canonical output object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResponse {
    pub title: String,
    pub summary: String,
    pub blocks: Vec<Block>,
    pub meta: ResponseMeta,
}

impl StructuredResponse {
    /// Check the structural invariants: non-empty title and summary, at
    /// least one block with non-empty content, a non-empty emoji, and the
    /// current schema tag.
    pub fn validate(&self) -> std::result::Result<(), SchemaError> {
        if self.title.trim().is_empty() {
            return Err(SchemaError::Invalid("title is empty".into()));
        }
        if self.summary.trim().is_empty() {
            return Err(SchemaError::Invalid("summary is empty".into()));
        }
        if self.blocks.is_empty() {
            return Err(SchemaError::Invalid("blocks is empty".into()));
        }
        for (i, block) in self.blocks.iter().enumerate() {
            if block.content.trim().is_empty() {
                return Err(SchemaError::Invalid(format!("block {i} has empty content")));
            }
        }
        if self.meta.emoji.trim().is_empty() {
            return Err(SchemaError::Invalid("meta.emoji is empty".into()));
        }
        if self.meta.schema != SCHEMA_VERSION {
            return Err(SchemaError::Invalid(format!(
                "meta.schema is '{}', expected '{}'",
                self.meta.schema, SCHEMA_VERSION
            )));
        }
        Ok(())
    }
}
