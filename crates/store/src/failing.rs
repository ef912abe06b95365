//! A blob backend that fails every operation: for exercising outage paths.

use async_trait::async_trait;
use std::time::Duration;

use sitementor_core::error::StoreError;
use sitementor_core::store::BlobStore;

/// Simulates a store outage: every call returns `StoreError::Unavailable`.
pub struct FailingBlobStore;

impl FailingBlobStore {
    pub fn new() -> Self {
        Self
    }

    fn error() -> StoreError {
        StoreError::Unavailable("injected failure".into())
    }
}

impl Default for FailingBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for FailingBlobStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(Self::error())
    }

    async fn set_with_ttl(
        &self,
        _key: &str,
        _value: String,
        _ttl: Duration,
    ) -> Result<(), StoreError> {
        Err(Self::error())
    }

    async fn ttl(&self, _key: &str) -> Result<Option<Duration>, StoreError> {
        Err(Self::error())
    }

    async fn ping(&self) -> Result<bool, StoreError> {
        Err(Self::error())
    }
}
