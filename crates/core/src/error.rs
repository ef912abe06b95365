//! Error types for the SiteMentor domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all SiteMentor operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Conversation store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Turn repository errors ---
    #[error("Repository error: {0}")]
    Repository(#[from] RepoError),

    // --- Generator errors ---
    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    // --- Schema validation errors ---
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store backend unavailable: {0}")]
    Unavailable(String),

    #[error("Write failed for session '{session_id}': {reason}")]
    WriteFailed { session_id: String, reason: String },

    #[error("Stored history blob is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Error)]
pub enum RepoError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Turn not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Error)]
pub enum GeneratorError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Generator not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("Response failed validation: {0}")]
    Invalid(String),

    #[error("Repair failed, response still invalid: {0}")]
    RepairFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_error_displays_correctly() {
        let err = Error::Generator(GeneratorError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn store_error_displays_correctly() {
        let err = Error::Store(StoreError::WriteFailed {
            session_id: "session_42".into(),
            reason: "connection reset".into(),
        });
        assert!(err.to_string().contains("session_42"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn schema_error_is_distinguishable() {
        let err = Error::Schema(SchemaError::RepairFailed("missing title".into()));
        assert!(matches!(err, Error::Schema(SchemaError::RepairFailed(_))));
    }
}
