//! Upload: store the original bytes, then record them in the catalog.

use std::sync::Arc;

use crate::catalog::CatalogStore;
use crate::config::LimitsConfig;
use crate::error::{DarkroomError, Result};
use crate::pipeline::{content_checksum, resolve_media_type, MetadataExtractor};
use crate::store::fs::SIDECAR_SUFFIX;
use crate::store::ArtifactStore;
use crate::types::{CollectionId, NewSourceImage, SourceImage};

/// One file to upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Vec<u8>,
    pub file_name: String,
    /// Client-declared type; sniffed from the bytes when absent or generic
    pub media_type: Option<String>,
    pub collection_id: CollectionId,
}

/// Writes originals to the blob store and their rows to the catalog.
pub struct Uploader {
    artifacts: Arc<dyn ArtifactStore>,
    catalog: Arc<dyn CatalogStore>,
    limits: LimitsConfig,
}

impl Uploader {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        catalog: Arc<dyn CatalogStore>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            artifacts,
            catalog,
            limits,
        }
    }

    /// Upload one file into a collection.
    ///
    /// If the catalog write fails the stored blob is removed again
    /// (best-effort) before the error is returned.
    pub async fn upload(&self, request: UploadRequest) -> Result<SourceImage> {
        let max_bytes = self.limits.max_upload_size_mb.saturating_mul(1024 * 1024);
        let size = request.bytes.len() as u64;
        if size == 0 {
            return Err(DarkroomError::Validation(format!(
                "{} is empty",
                request.file_name
            )));
        }
        if size > max_bytes {
            return Err(DarkroomError::Validation(format!(
                "{} is {} bytes, over the {} MB upload limit",
                request.file_name, size, self.limits.max_upload_size_mb
            )));
        }
        if self
            .catalog
            .get_collection(request.collection_id)
            .await?
            .is_none()
        {
            return Err(DarkroomError::NotFound(format!(
                "collection {}",
                request.collection_id
            )));
        }

        let file_name = sanitize_file_name(&request.file_name);
        let storage_key = format!("{}_{}", uuid::Uuid::new_v4(), file_name);
        let media_type = resolve_media_type(request.media_type.as_deref(), &request.bytes);
        let checksum = content_checksum(&request.bytes);
        let metadata = MetadataExtractor::extract(&request.bytes);

        self.artifacts
            .put(&storage_key, request.bytes, &media_type)
            .await?;

        let new_image = NewSourceImage {
            storage_key: storage_key.clone(),
            file_name,
            media_type,
            file_size: size,
            checksum: Some(checksum),
            metadata,
        };
        match self
            .catalog
            .create_source_image(new_image, request.collection_id)
            .await
        {
            Ok(image) => {
                tracing::debug!(
                    "Uploaded {} as image {} ({} bytes, {})",
                    image.file_name,
                    image.id,
                    image.file_size,
                    image.media_type
                );
                Ok(image)
            }
            Err(e) => {
                if let Err(cleanup) = self.artifacts.remove(&storage_key).await {
                    tracing::warn!("Could not remove orphaned upload {}: {}", storage_key, cleanup);
                }
                Err(e.into())
            }
        }
    }
}

/// Last path component of a client-supplied name, safe to embed in a key.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        return "upload".to_string();
    }
    // Keys with the sidecar suffix are reserved by the blob store
    match cleaned.strip_suffix(SIDECAR_SUFFIX) {
        Some(stem) => format!("{stem}_{}", &SIDECAR_SUFFIX[1..]),
        None => cleaned.to_string(),
    }
}
