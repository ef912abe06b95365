//! BlobStore trait: the abstraction over the external key/value service.
//!
//! The backing store is a shared, external service supporting `GET key`,
//! an atomic `SET key value; EXPIRE key ttl`, and a liveness ping. The
//! mutation discipline is read-then-overwrite-whole-blob per key; there are
//! no partial updates.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

/// A key→blob store with TTL support.
///
/// Implementations: in-memory and file-backed (this workspace); Redis or a
/// compatible service in production.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// The backend name (e.g., "in_memory", "file").
    fn name(&self) -> &str;

    /// Fetch the blob under `key`, or `None` if absent/expired.
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, StoreError>;

    /// Write `value` under `key` and reset its TTL in one atomic operation.
    /// The write and the expiry refresh must be indivisible from the
    /// caller's perspective.
    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> std::result::Result<(), StoreError>;

    /// Remaining TTL for `key`, or `None` if absent.
    async fn ttl(&self, key: &str) -> std::result::Result<Option<Duration>, StoreError>;

    /// Liveness probe.
    async fn ping(&self) -> std::result::Result<bool, StoreError>;
}
