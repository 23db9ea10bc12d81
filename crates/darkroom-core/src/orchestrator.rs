//! Batch orchestration: the per-image dedup → fetch → filter → encode →
//! store → persist → link workflow, and its fan-out over a collection.
//!
//! Nothing here locks around the dedup check. Two runs racing on the same
//! (image, spec) may both miss and both compute; the catalog's uniqueness
//! constraint picks the winner and the loser deletes its blob and links the
//! winner's artifact instead.

use futures_util::stream::{self, StreamExt};
use futures_util::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use crate::catalog::CatalogStore;
use crate::error::{CatalogError, DarkroomError, PipelineError, Result};
use crate::pipeline::{Encoder, FilterPipeline, FilterSpec, Fingerprint, ImageDecoder};
use crate::store::ArtifactStore;
use crate::types::{
    ArtifactId, ArtifactStatus, CollectionId, DerivedArtifact, NewDerivedArtifact, SourceImage,
    SourceImageId,
};

/// Terminal state of one (image, spec, collection) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// A new artifact was computed, stored and linked
    Ok,
    /// An existing artifact was linked into the collection
    SkippedLinkedExisting,
    /// The collection already had this artifact
    SkippedAlreadyApplied,
    /// An existing artifact was found but linking it failed
    SkippedExistingLinkFailed,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Ok => "ok",
            ItemStatus::SkippedLinkedExisting => "skipped_linked_existing",
            ItemStatus::SkippedAlreadyApplied => "skipped_already_applied",
            ItemStatus::SkippedExistingLinkFailed => "skipped_existing_link_failed",
            ItemStatus::Failed => "failed",
        }
    }

    /// Dedup hits: no new artifact was computed.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            ItemStatus::SkippedLinkedExisting
                | ItemStatus::SkippedAlreadyApplied
                | ItemStatus::SkippedExistingLinkFailed
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ItemStatus::Failed)
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which step of the workflow an item failed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    StorageRead,
    DecodeError,
    EncodeError,
    StorageWrite,
    DbError,
    Unexpected,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::StorageRead => "storage_read",
            FailureKind::DecodeError => "decode_error",
            FailureKind::EncodeError => "encode_error",
            FailureKind::StorageWrite => "storage_write",
            FailureKind::DbError => "db_error",
            FailureKind::Unexpected => "unexpected",
        }
    }
}

/// A recorded per-item failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub kind: FailureKind,
    pub message: String,
}

impl ItemError {
    fn new(kind: FailureKind, message: impl std::fmt::Display) -> Self {
        Self {
            kind,
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

/// What a caller needs to fetch an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRef {
    pub id: ArtifactId,
    pub storage_key: String,
    pub file_name: String,
    pub media_type: String,
    pub file_size: u64,
}

impl From<&DerivedArtifact> for ArtifactRef {
    fn from(a: &DerivedArtifact) -> Self {
        Self {
            id: a.id,
            storage_key: a.storage_key.clone(),
            file_name: a.file_name.clone(),
            media_type: a.media_type.clone(),
            file_size: a.file_size,
        }
    }
}

/// Outcome of one image in a batch.
#[derive(Debug, Clone, Serialize)]
pub struct ItemResult {
    pub source_image_id: SourceImageId,
    pub file_name: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

impl ItemResult {
    fn done(image: &SourceImage, status: ItemStatus, artifact: &DerivedArtifact) -> Self {
        Self {
            source_image_id: image.id,
            file_name: image.file_name.clone(),
            status,
            artifact: Some(artifact.into()),
            error: None,
        }
    }

    fn failed(image: &SourceImage, error: ItemError) -> Self {
        Self {
            source_image_id: image.id,
            file_name: image.file_name.clone(),
            status: ItemStatus::Failed,
            artifact: None,
            error: Some(error),
        }
    }
}

/// Aggregate of a collection-wide apply.
///
/// `processed` counts every item that did not fail, dedup hits included;
/// `skipped` is the dedup-hit subset. `processed + failed == items.len()`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub collection_id: CollectionId,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub items: Vec<ItemResult>,
}

impl BatchReport {
    fn from_items(collection_id: CollectionId, items: Vec<ItemResult>) -> Self {
        let failed = items.iter().filter(|i| i.status.is_failed()).count();
        let skipped = items.iter().filter(|i| i.status.is_skip()).count();
        Self {
            collection_id,
            processed: items.len() - failed,
            skipped,
            failed,
            items,
        }
    }
}

/// Drives filter requests against the two stores.
pub struct BatchOrchestrator {
    artifacts: Arc<dyn ArtifactStore>,
    catalog: Arc<dyn CatalogStore>,
    pipeline: Arc<FilterPipeline>,
    decoder: ImageDecoder,
    encoder: Encoder,
    parallel_workers: usize,
}

impl BatchOrchestrator {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        catalog: Arc<dyn CatalogStore>,
        pipeline: Arc<FilterPipeline>,
        decoder: ImageDecoder,
        encoder: Encoder,
        parallel_workers: usize,
    ) -> Self {
        Self {
            artifacts,
            catalog,
            pipeline,
            decoder,
            encoder,
            parallel_workers: parallel_workers.max(1),
        }
    }

    /// Apply `spec` to every member image of a collection.
    ///
    /// Fails up front only when the collection is missing or has no images;
    /// after that every item's outcome is recorded in the report.
    pub async fn apply_to_collection(
        &self,
        collection_id: CollectionId,
        spec: &FilterSpec,
    ) -> Result<BatchReport> {
        let start = Instant::now();
        if self.catalog.get_collection(collection_id).await?.is_none() {
            return Err(DarkroomError::NotFound(format!("collection {collection_id}")));
        }
        let images = self.catalog.images_for_collection(collection_id).await?;
        if images.is_empty() {
            return Err(DarkroomError::NotFound(format!(
                "no images in collection {collection_id}"
            )));
        }

        tracing::debug!(
            "Applying {} to {} images in collection {} ({} workers)",
            spec.canonical_json(),
            images.len(),
            collection_id,
            self.parallel_workers
        );

        let items: Vec<ItemResult> = stream::iter(images.iter())
            .map(|image| self.process_guarded(collection_id, image, spec))
            .buffered(self.parallel_workers)
            .collect()
            .await;

        let report = BatchReport::from_items(collection_id, items);
        tracing::info!(
            "Collection {}: {} processed ({} skipped), {} failed in {:?}",
            collection_id,
            report.processed,
            report.skipped,
            report.failed,
            start.elapsed()
        );
        Ok(report)
    }

    /// Apply `spec` to one image on behalf of a collection.
    ///
    /// The image does not have to be a member of the collection; the
    /// resulting artifact is linked into it either way.
    pub async fn apply_to_image(
        &self,
        collection_id: CollectionId,
        image_id: SourceImageId,
        spec: &FilterSpec,
    ) -> Result<ItemResult> {
        if self.catalog.get_collection(collection_id).await?.is_none() {
            return Err(DarkroomError::NotFound(format!("collection {collection_id}")));
        }
        let image = self
            .catalog
            .get_source_image(image_id)
            .await?
            .ok_or_else(|| DarkroomError::NotFound(format!("source image {image_id}")))?;

        Ok(self.process_guarded(collection_id, &image, spec).await)
    }

    /// Item boundary: a panic anywhere in the workflow becomes an
    /// `unexpected` failure for this item only.
    async fn process_guarded(
        &self,
        collection_id: CollectionId,
        image: &SourceImage,
        spec: &FilterSpec,
    ) -> ItemResult {
        match AssertUnwindSafe(self.process_item(collection_id, image, spec))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!("Image {} panicked: {}", image.id, message);
                ItemResult::failed(image, ItemError::new(FailureKind::Unexpected, message))
            }
        }
    }

    async fn process_item(
        &self,
        collection_id: CollectionId,
        image: &SourceImage,
        spec: &FilterSpec,
    ) -> ItemResult {
        let start = Instant::now();
        let fingerprint = Fingerprint::compute(image.id, spec);

        match self.catalog.find_artifact(image.id, &fingerprint).await {
            Ok(Some(existing)) => {
                tracing::debug!("Image {}: dedup hit, artifact {}", image.id, existing.id);
                return self.link_existing(collection_id, image, &existing).await;
            }
            Ok(None) => {}
            Err(e) => return ItemResult::failed(image, ItemError::new(FailureKind::DbError, e)),
        }

        // Fetch
        let fetch_start = Instant::now();
        let original = match self.artifacts.get(&image.storage_key).await {
            Ok(reader) => reader.read_all().await,
            Err(e) => Err(e),
        };
        let original = match original {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("Image {}: fetch failed: {}", image.id, e);
                return ItemResult::failed(image, ItemError::new(FailureKind::StorageRead, e));
            }
        };
        tracing::trace!("  Fetch: {:?}", fetch_start.elapsed());

        // Decode
        let decode_start = Instant::now();
        let decoded = match self
            .decoder
            .decode_from_bytes(original, &image.file_name)
            .await
        {
            Ok(decoded) => decoded,
            Err(e) => return ItemResult::failed(image, ItemError::new(FailureKind::DecodeError, e)),
        };
        tracing::trace!("  Decode: {:?}", decode_start.elapsed());

        // Filter + encode on the blocking pool
        let render_start = Instant::now();
        let format = spec.output_format();
        let rendered = {
            let pipeline = Arc::clone(&self.pipeline);
            let encoder = self.encoder;
            let spec = spec.clone();
            let raster = decoded.into_rgb8();
            tokio::task::spawn_blocking(move || {
                let filtered = pipeline.apply(raster, &spec);
                encoder.encode(&filtered, spec.output_format())
            })
            .await
        };
        let (bytes, media_type) = match rendered {
            Ok(Ok(encoded)) => encoded,
            Ok(Err(e @ PipelineError::Encode { .. })) => {
                return ItemResult::failed(image, ItemError::new(FailureKind::EncodeError, e))
            }
            Ok(Err(e)) => return ItemResult::failed(image, ItemError::new(FailureKind::Unexpected, e)),
            Err(join) => {
                return ItemResult::failed(
                    image,
                    ItemError::new(FailureKind::Unexpected, format!("filter task failed: {join}")),
                )
            }
        };
        tracing::trace!("  Filter+encode: {:?}", render_start.elapsed());

        // Store
        let file_name = artifact_file_name(&image.file_name, format.extension());
        let storage_key = format!("{}_{}", uuid::Uuid::new_v4(), file_name);
        let file_size = bytes.len() as u64;
        if let Err(e) = self.artifacts.put(&storage_key, bytes, media_type).await {
            return ItemResult::failed(image, ItemError::new(FailureKind::StorageWrite, e));
        }

        // Persist + link
        let new_artifact = NewDerivedArtifact {
            source_image_id: image.id,
            storage_key: storage_key.clone(),
            file_name,
            media_type: media_type.to_string(),
            file_size,
            fingerprint: Some(fingerprint.clone()),
            params: Some(spec.canonical_json()),
            status: ArtifactStatus::Completed,
            error_message: None,
        };
        match self.catalog.create_artifact(new_artifact, collection_id).await {
            Ok(artifact) => {
                tracing::debug!(
                    "Image {}: stored artifact {} ({} bytes) in {:?}",
                    image.id,
                    artifact.id,
                    artifact.file_size,
                    start.elapsed()
                );
                ItemResult::done(image, ItemStatus::Ok, &artifact)
            }
            Err(CatalogError::Duplicate { constraint }) => {
                self.discard_blob(&storage_key).await;
                match self.catalog.find_artifact(image.id, &fingerprint).await {
                    Ok(Some(winner)) => {
                        tracing::debug!(
                            "Image {}: lost insert race to artifact {}",
                            image.id,
                            winner.id
                        );
                        self.link_existing(collection_id, image, &winner).await
                    }
                    Ok(None) => ItemResult::failed(
                        image,
                        ItemError::new(FailureKind::DbError, format!("duplicate row: {constraint}")),
                    ),
                    Err(e) => ItemResult::failed(image, ItemError::new(FailureKind::DbError, e)),
                }
            }
            Err(e) => {
                self.discard_blob(&storage_key).await;
                ItemResult::failed(image, ItemError::new(FailureKind::DbError, e))
            }
        }
    }

    /// Hit path: link an existing artifact, never recompute.
    async fn link_existing(
        &self,
        collection_id: CollectionId,
        image: &SourceImage,
        artifact: &DerivedArtifact,
    ) -> ItemResult {
        let linked = match self.catalog.artifact_linked(collection_id, artifact.id).await {
            Ok(true) => {
                return ItemResult::done(image, ItemStatus::SkippedAlreadyApplied, artifact);
            }
            Ok(false) => self.catalog.link_artifact(collection_id, artifact.id).await,
            Err(e) => Err(e),
        };

        match linked {
            Ok(_) => ItemResult::done(image, ItemStatus::SkippedLinkedExisting, artifact),
            Err(e) => {
                tracing::warn!(
                    "Image {}: linking artifact {} into collection {} failed: {}",
                    image.id,
                    artifact.id,
                    collection_id,
                    e
                );
                let mut result =
                    ItemResult::done(image, ItemStatus::SkippedExistingLinkFailed, artifact);
                result.error = Some(ItemError::new(FailureKind::DbError, format!("link failed: {e}")));
                result
            }
        }
    }

    /// Compensating delete after a failed catalog write. Best-effort.
    async fn discard_blob(&self, key: &str) {
        if let Err(e) = self.artifacts.remove(key).await {
            tracing::warn!("Could not remove orphaned blob {}: {}", key, e);
        }
    }
}

/// `filtered_{stem}.{ext}`, where stem is the name up to its last dot.
pub fn artifact_file_name(source_name: &str, extension: &str) -> String {
    let stem = match source_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => source_name,
    };
    format!("filtered_{stem}.{extension}")
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
