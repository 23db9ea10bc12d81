//! Blob store on a local directory.
//!
//! Layout: one file per key directly under the root, plus a
//! `{key}.meta.json` sidecar holding the media type. Writes go to a hidden
//! temp file first and are renamed into place, so a reader never sees a
//! half-written blob.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{validate_key, ArtifactStore, BlobReader, BlobStat};
use crate::error::{StorageError, StorageResult};
use crate::pipeline::sniff::OCTET_STREAM;

pub(crate) const SIDECAR_SUFFIX: &str = ".meta.json";

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    media_type: String,
}

/// Filesystem-backed [`ArtifactStore`].
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|source| StorageError::Write {
                key: root.display().to_string(),
                source,
            })?;
        tracing::debug!("Blob store at {:?}", root);
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}{SIDECAR_SUFFIX}"))
    }

    async fn read_media_type(&self, key: &str) -> String {
        match fs::read(self.sidecar_path(key)).await {
            Ok(raw) => serde_json::from_slice::<Sidecar>(&raw)
                .map(|s| s.media_type)
                .unwrap_or_else(|_| OCTET_STREAM.to_string()),
            Err(_) => OCTET_STREAM.to_string(),
        }
    }

    /// Write `bytes` to a temp file next to `dest`, then rename over it.
    async fn write_atomic(&self, key: &str, dest: &Path, bytes: &[u8]) -> StorageResult<()> {
        let tmp = self
            .root
            .join(format!(".tmp-{}", uuid::Uuid::new_v4().simple()));
        let write_err = |source| StorageError::Write {
            key: key.to_string(),
            source,
        };

        let result = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, dest).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp).await;
            return Err(write_err(e));
        }
        Ok(())
    }
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn get(&self, key: &str) -> StorageResult<BlobReader> {
        validate_key(key)?;
        let file = match fs::File::open(self.blob_path(key)).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(source) => {
                return Err(StorageError::Read {
                    key: key.to_string(),
                    source,
                })
            }
        };
        let size = file
            .metadata()
            .await
            .map_err(|source| StorageError::Read {
                key: key.to_string(),
                source,
            })?
            .len();
        let media_type = self.read_media_type(key).await;

        Ok(BlobReader::new(
            key,
            BlobStat { media_type, size },
            Box::new(file),
        ))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, media_type: &str) -> StorageResult<()> {
        validate_key(key)?;
        let sidecar = serde_json::to_vec(&Sidecar {
            media_type: media_type.to_string(),
        })
        .map_err(|e| StorageError::Write {
            key: key.to_string(),
            source: e.into(),
        })?;

        // Sidecar first: a blob that exists always has its media type.
        let sidecar_path = self.sidecar_path(key);
        self.write_atomic(key, &sidecar_path, &sidecar).await?;
        if let Err(e) = self.write_atomic(key, &self.blob_path(key), &bytes).await {
            if let Err(cleanup) = remove_if_present(&sidecar_path).await {
                tracing::warn!("Could not remove sidecar for {}: {}", key, cleanup);
            }
            return Err(e);
        }
        tracing::trace!("Stored blob {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let write_err = |source| StorageError::Write {
            key: key.to_string(),
            source,
        };
        remove_if_present(&self.blob_path(key))
            .await
            .map_err(write_err)?;
        remove_if_present(&self.sidecar_path(key))
            .await
            .map_err(write_err)?;
        Ok(())
    }

    async fn stat(&self, key: &str) -> StorageResult<BlobStat> {
        validate_key(key)?;
        let meta = match fs::metadata(self.blob_path(key)).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(source) => {
                return Err(StorageError::Read {
                    key: key.to_string(),
                    source,
                })
            }
        };
        Ok(BlobStat {
            media_type: self.read_media_type(key).await,
            size: meta.len(),
        })
    }
}
