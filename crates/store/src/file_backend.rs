//! File-based blob backend: one JSON file per session key.
//!
//! Each key maps to `<dir>/<sanitized-key>.json` holding the blob value and
//! its absolute expiry timestamp, so TTLs survive process restarts. Simple,
//! portable, human-inspectable, and requires zero external services.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use sitementor_core::error::StoreError;
use sitementor_core::store::BlobStore;

#[derive(Serialize, Deserialize)]
struct StoredBlob {
    value: String,
    expires_at: DateTime<Utc>,
}

/// A blob store writing one JSON file per key.
///
/// A write replaces the whole file (value + expiry together), so the
/// set-with-TTL atomicity contract holds at file granularity.
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{sanitized}.json"))
    }

    fn read_blob(path: &Path) -> Result<Option<StoredBlob>, StoreError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Unavailable(e.to_string())),
        };
        match serde_json::from_str(&raw) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping corrupted blob file");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        match Self::read_blob(&path)? {
            Some(blob) if blob.expires_at > Utc::now() => Ok(Some(blob.value)),
            Some(_) => {
                // Expired: remove lazily on read.
                let _ = std::fs::remove_file(&path);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| StoreError::Unavailable(format!("Failed to create store dir: {e}")))?;

        let blob = StoredBlob {
            value,
            expires_at: Utc::now()
                + chrono::Duration::from_std(ttl)
                    .map_err(|e| StoreError::Corrupt(format!("TTL out of range: {e}")))?,
        };
        let raw = serde_json::to_string(&blob).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        std::fs::write(self.path_for(key), raw).map_err(|e| StoreError::WriteFailed {
            session_id: key.to_string(),
            reason: e.to_string(),
        })
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        match Self::read_blob(&self.path_for(key))? {
            Some(blob) => {
                let remaining = blob.expires_at - Utc::now();
                Ok(remaining.to_std().ok())
            }
            None => Ok(None),
        }
    }

    async fn ping(&self) -> Result<bool, StoreError> {
        Ok(self.dir.exists() || std::fs::create_dir_all(&self.dir).is_ok())
    }
}
