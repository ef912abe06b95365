//! # SiteMentor Core
//!
//! Domain types, traits, and error definitions for the SiteMentor chat
//! pipeline. This crate has **zero framework dependencies**; it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (the key/value blob store, the durable turn
//! repository, the LLM generator) is defined as a trait here. Implementations
//! live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod generator;
pub mod message;
pub mod response;
pub mod sections;
pub mod store;
pub mod turn;

// Re-export key types at crate root for ergonomics
pub use error::{Error, GeneratorError, RepoError, Result, SchemaError, StoreError};
pub use generator::{Generation, Generator};
pub use message::{ChatMessage, ChatRole, HistoryMessage, HistoryRole, Tier};
pub use response::{Block, BlockType, ResponseMeta, StructuredResponse, SCHEMA_VERSION};
pub use sections::{Section, MENTORING_INSIGHT, NEXT_STEPS, SECTIONS, TECHNICAL_ANSWER};
pub use store::BlobStore;
pub use turn::{ConversationId, Turn, TurnRepository, TurnStatus};
