//! Artifact store contract
//!
//! Opaque blob storage addressed by `(bucket, key)`. Keys are the hex
//! BLAKE3 of the content, so every read can be verified and a fetched
//! artifact can be cached indefinitely.

use crate::error::ArtifactError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use vmog_types::ContentHash;

/// Content-addressed blob storage.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store bytes under `bucket/key`.
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), ArtifactError>;

    /// Fetch bytes stored under `bucket/key`, verified against the key.
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ArtifactError>;
}

/// Key under which `bytes` are stored.
pub fn content_key(bytes: &[u8]) -> String {
    ContentHash::hash(bytes).to_hex()
}

/// Check that `bytes` hash to `key`.
pub fn verify_content(key: &str, bytes: &[u8]) -> Result<(), ArtifactError> {
    let expected = key.parse::<ContentHash>().ok();
    if expected.is_some_and(|digest| digest.matches(bytes)) {
        Ok(())
    } else {
        Err(ArtifactError::IntegrityMismatch {
            key: key.to_string(),
            actual: content_key(bytes),
        })
    }
}

/// In-memory artifact store for testing and development.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    blobs: DashMap<(String, String), Vec<u8>>,
    fail_next: AtomicU32,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` operations fail with `Unavailable`.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Overwrite stored bytes without updating the key.
    pub fn corrupt(&self, bucket: &str, key: &str, bytes: Vec<u8>) {
        self.blobs
            .insert((bucket.to_string(), key.to_string()), bytes);
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    fn check_available(&self) -> Result<(), ArtifactError> {
        let remaining = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match remaining {
            Ok(_) => Err(ArtifactError::Unavailable("injected failure".into())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), ArtifactError> {
        self.check_available()?;
        self.blobs
            .insert((bucket.to_string(), key.to_string()), bytes);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ArtifactError> {
        self.check_available()?;
        let bytes = self
            .blobs
            .get(&(bucket.to_string(), key.to_string()))
            .map(|b| b.clone())
            .ok_or_else(|| ArtifactError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
        verify_content(key, &bytes)?;
        Ok(bytes)
    }
}

/// Read-through cache in front of another store. Entries never expire.
pub struct CachedArtifactStore {
    inner: Arc<dyn ArtifactStore>,
    cache: DashMap<String, Arc<Vec<u8>>>,
    hits: AtomicU64,
}

impl CachedArtifactStore {
    pub fn new(inner: Arc<dyn ArtifactStore>) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
            hits: AtomicU64::new(0),
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl ArtifactStore for CachedArtifactStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), ArtifactError> {
        self.inner.put(bucket, key, bytes).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ArtifactError> {
        if let Some(bytes) = self.cache.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key, "artifact cache hit");
            return Ok(bytes.as_ref().clone());
        }
        let bytes = self.inner.get(bucket, key).await?;
        verify_content(key, &bytes)?;
        self.cache.insert(key.to_string(), Arc::new(bytes.clone()));
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_and_get_verified() {
        let store = InMemoryArtifactStore::new();
        let bytes = b"export const Button = 1;".to_vec();
        let key = content_key(&bytes);
        store.put("b", &key, bytes.clone()).await.unwrap();
        assert_eq!(store.get("b", &key).await.unwrap(), bytes);
    }

    #[tokio::test]
    async fn missing_artifact() {
        let store = InMemoryArtifactStore::new();
        let err = store.get("b", "nope").await.unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound { .. }));
    }

    #[tokio::test]
    async fn corrupted_artifact_fails_integrity() {
        let store = InMemoryArtifactStore::new();
        let key = content_key(b"v1");
        store.put("b", &key, b"v1".to_vec()).await.unwrap();
        store.corrupt("b", &key, b"tampered".to_vec());
        let err = store.get("b", &key).await.unwrap_err();
        assert!(matches!(err, ArtifactError::IntegrityMismatch { .. }));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = InMemoryArtifactStore::new();
        store.fail_next(1);
        let key = content_key(b"x");
        assert!(matches!(
            store.put("b", &key, b"x".to_vec()).await,
            Err(ArtifactError::Unavailable(_))
        ));
        store.put("b", &key, b"x".to_vec()).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn cache_serves_repeat_reads() {
        let inner = Arc::new(InMemoryArtifactStore::new());
        let key = content_key(b"bundle");
        inner.put("b", &key, b"bundle".to_vec()).await.unwrap();
        let cached = CachedArtifactStore::new(inner.clone());

        cached.get("b", &key).await.unwrap();
        // The backing store going away does not affect cached content.
        inner.fail_next(5);
        assert_eq!(cached.get("b", &key).await.unwrap(), b"bundle".to_vec());
        assert_eq!(cached.hits(), 1);
        assert_eq!(cached.cached(), 1);
    }
}
