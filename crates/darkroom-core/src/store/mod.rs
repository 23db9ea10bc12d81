//! Blob storage for uploaded originals and derived artifacts.
//!
//! Blobs are opaque byte strings under opaque string keys. Reads are
//! streamed through a [`BlobReader`] in bounded chunks; the reader owns the
//! underlying handle and releases it when dropped, whichever way the caller
//! exits.

pub mod fs;
pub mod memory;

pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;

use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{StorageError, StorageResult};

/// Default read chunk size: 1 MiB.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Media type and length of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobStat {
    pub media_type: String,
    pub size: u64,
}

/// Contract every blob store implements.
///
/// Uses `async_trait` because native async fn in trait is not object-safe
/// and the orchestrator holds stores as `Arc<dyn ArtifactStore>`.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Open a blob for reading. `StorageError::NotFound` when absent.
    async fn get(&self, key: &str) -> StorageResult<BlobReader>;

    /// Store `bytes` under `key`, replacing any previous blob.
    async fn put(&self, key: &str, bytes: Vec<u8>, media_type: &str) -> StorageResult<()>;

    /// Delete a blob. Removing a missing key succeeds.
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// Media type and size. `StorageError::NotFound` when absent.
    async fn stat(&self, key: &str) -> StorageResult<BlobStat>;
}

/// Streaming handle over one stored blob.
pub struct BlobReader {
    key: String,
    stat: BlobStat,
    inner: Box<dyn AsyncRead + Send + Unpin>,
}

impl std::fmt::Debug for BlobReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobReader")
            .field("key", &self.key)
            .field("stat", &self.stat)
            .finish_non_exhaustive()
    }
}

impl BlobReader {
    pub fn new(
        key: impl Into<String>,
        stat: BlobStat,
        inner: Box<dyn AsyncRead + Send + Unpin>,
    ) -> Self {
        Self {
            key: key.into(),
            stat,
            inner,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn media_type(&self) -> &str {
        &self.stat.media_type
    }

    pub fn size(&self) -> u64 {
        self.stat.size
    }

    /// Read up to `chunk_size` bytes. Returns `None` at end of blob.
    ///
    /// Short reads from the underlying handle are coalesced, so every chunk
    /// but the last is exactly `chunk_size` long.
    pub async fn next_chunk(&mut self, chunk_size: usize) -> StorageResult<Option<Vec<u8>>> {
        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .inner
                .read(&mut buf[filled..])
                .await
                .map_err(|source| StorageError::Read {
                    key: self.key.clone(),
                    source,
                })?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(buf))
    }

    /// Drain the blob into memory, one chunk at a time.
    pub async fn read_all(mut self) -> StorageResult<Vec<u8>> {
        let capacity = usize::try_from(self.stat.size).unwrap_or(0).min(64 * CHUNK_SIZE);
        let mut out = Vec::with_capacity(capacity);
        while let Some(chunk) = self.next_chunk(CHUNK_SIZE).await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// Turn the reader into a stream of chunks. Dropping the stream early
    /// drops the handle.
    pub fn into_stream(self, chunk_size: usize) -> impl Stream<Item = StorageResult<Vec<u8>>> + Send {
        stream::try_unfold(self, move |mut reader| async move {
            Ok(reader
                .next_chunk(chunk_size)
                .await?
                .map(|chunk| (chunk, reader)))
        })
    }
}

/// Reject keys that are empty or could address anything outside the store's
/// own namespace.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let bad = key.is_empty()
        || key.starts_with('.')
        || key.contains(['/', '\\', '\0'])
        || key.ends_with(fs::SIDECAR_SUFFIX);
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use std::io::Cursor;

    fn reader(bytes: Vec<u8>) -> BlobReader {
        let stat = BlobStat {
            media_type: "application/octet-stream".into(),
            size: bytes.len() as u64,
        };
        BlobReader::new("k", stat, Box::new(Cursor::new(bytes)))
    }

    #[tokio::test]
    async fn test_next_chunk_is_bounded() {
        let mut r = reader(vec![7u8; 10]);
        assert_eq!(r.next_chunk(4).await.unwrap().unwrap().len(), 4);
        assert_eq!(r.next_chunk(4).await.unwrap().unwrap().len(), 4);
        assert_eq!(r.next_chunk(4).await.unwrap().unwrap().len(), 2);
        assert!(r.next_chunk(4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_into_stream_yields_all_bytes() {
        let data: Vec<u8> = (0..=255).cycle().take(1000).collect();
        let chunks: Vec<Vec<u8>> = reader(data.clone()).into_stream(300).try_collect().await.unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks.concat(), data);
    }

    #[tokio::test]
    async fn test_read_all_empty_blob() {
        assert!(reader(Vec::new()).read_all().await.unwrap().is_empty());
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("3f2a_photo.jpg").is_ok());
        for bad in ["", ".", "..", "../etc", "a/b", "a\\b", ".hidden", "x.meta.json"] {
            assert!(validate_key(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
