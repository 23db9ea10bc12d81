//! In-process blob store.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use super::{validate_key, ArtifactStore, BlobReader, BlobStat};
use crate::error::{StorageError, StorageResult};

struct Blob {
    media_type: String,
    bytes: Arc<[u8]>,
}

/// [`ArtifactStore`] backed by a map. Readers share the stored buffer, so a
/// blob removed mid-read stays readable until the reader is dropped.
#[derive(Default)]
pub struct MemoryArtifactStore {
    blobs: RwLock<HashMap<String, Blob>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.read().contains_key(key)
    }

    /// Every stored key, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn get(&self, key: &str) -> StorageResult<BlobReader> {
        let blobs = self.blobs.read();
        let blob = blobs
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        let stat = BlobStat {
            media_type: blob.media_type.clone(),
            size: blob.bytes.len() as u64,
        };
        Ok(BlobReader::new(
            key,
            stat,
            Box::new(Cursor::new(Arc::clone(&blob.bytes))),
        ))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, media_type: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.blobs.write().insert(
            key.to_string(),
            Blob {
                media_type: media_type.to_string(),
                bytes: bytes.into(),
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.blobs.write().remove(key);
        Ok(())
    }

    async fn stat(&self, key: &str) -> StorageResult<BlobStat> {
        self.blobs
            .read()
            .get(key)
            .map(|blob| BlobStat {
                media_type: blob.media_type.clone(),
                size: blob.bytes.len() as u64,
            })
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_and_remove() {
        let store = MemoryArtifactStore::new();
        store.put("a", b"hello".to_vec(), "image/png").await.unwrap();
        assert!(store.contains("a"));
        assert_eq!(store.stat("a").await.unwrap().size, 5);

        let reader = store.get("a").await.unwrap();
        store.remove("a").await.unwrap();
        store.remove("a").await.unwrap();
        assert!(store.is_empty());

        // The open reader still sees the bytes it was opened on
        assert_eq!(reader.read_all().await.unwrap(), b"hello");
        assert!(store.get("a").await.unwrap_err().is_not_found());
    }
}
