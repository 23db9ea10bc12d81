//! Darkroom Core - collection-scoped image filtering library.
//!
//! Darkroom keeps source images in a blob store, records them in a catalog,
//! and derives filtered artifacts from them. Identical filter requests are
//! deduplicated by a content fingerprint, so re-applying a spec links the
//! existing artifact instead of producing a new one.
//!
//! # Architecture
//!
//! ```text
//! Upload → Blob store + Catalog
//! Apply  → Fetch → Decode → Filter → Encode → Store → Record → Link
//! Export → Linked artifacts → ZIP (streamed in bounded chunks)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use darkroom_core::{Config, Darkroom, FilterParams};
//!
//! #[tokio::main]
//! async fn main() -> darkroom_core::Result<()> {
//!     let darkroom = Darkroom::open(Config::load()?).await?;
//!     let collection = darkroom.create_collection("holiday", None).await?;
//!
//!     let params = FilterParams { brightness: Some(70), blur: Some(4), ..Default::default() };
//!     let report = darkroom.apply_to_collection(collection.id, params).await?;
//!     println!("{} processed, {} failed", report.processed, report.failed);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod store;
pub mod types;
pub mod upload;

// Re-exports for convenient access
pub use catalog::{CatalogStore, MemoryCatalog, SqliteCatalog};
pub use config::Config;
pub use error::{
    CatalogError, ConfigError, DarkroomError, PipelineError, PipelineResult, Result, StorageError,
};
pub use export::{ArchiveExporter, ExportSummary, ExportedArchive};
pub use orchestrator::{BatchOrchestrator, BatchReport, FailureKind, ItemResult, ItemStatus};
pub use output::{ReportFormat, ReportWriter};
pub use pipeline::{FilterParams, FilterPipeline, FilterSpec, OutputFormat};
pub use store::{ArtifactStore, BlobReader, FsArtifactStore, MemoryArtifactStore};
pub use types::{
    Collection, CollectionDetail, CollectionId, CollectionSummary, DerivedArtifact, SourceImage,
    SourceImageId,
};
pub use upload::{UploadRequest, Uploader};

use std::sync::Arc;

use pipeline::{Encoder, ImageDecoder, SeetaFaceDetector};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How a download should be presented to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Save as a file
    Attachment,
    /// Display in place (previews)
    Inline,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attachment => "attachment",
            Self::Inline => "inline",
        }
    }
}

/// A blob ready to be streamed to a client.
pub struct Download {
    /// Client-facing name: the storage key without its unique prefix
    pub file_name: String,
    pub media_type: String,
    pub size: u64,
    pub disposition: Disposition,
    pub reader: BlobReader,
}

/// Darkroom service - the main entry point.
///
/// Owns the two stores and the components that work on them. Cloning the
/// stores is cheap; everything is behind `Arc`.
pub struct Darkroom {
    config: Config,
    artifacts: Arc<dyn ArtifactStore>,
    catalog: Arc<dyn CatalogStore>,
    orchestrator: BatchOrchestrator,
    exporter: ArchiveExporter,
    uploader: Uploader,
}

impl Darkroom {
    /// Open the filesystem blob store and SQLite catalog named by `config`.
    pub async fn open(config: Config) -> Result<Self> {
        let blob_dir = config.blob_dir();
        let catalog_path = config.catalog_path();
        tracing::debug!(
            "Opening Darkroom v{} (blobs: {:?}, catalog: {:?})",
            VERSION,
            blob_dir,
            catalog_path
        );

        let artifacts = FsArtifactStore::open(blob_dir).await?;
        let catalog = tokio::task::spawn_blocking(move || SqliteCatalog::open(&catalog_path))
            .await
            .map_err(|e| DarkroomError::Io(std::io::Error::other(e)))??;

        Ok(Self::with_stores(config, Arc::new(artifacts), Arc::new(catalog)))
    }

    /// Purely in-memory instance; nothing outlives the process.
    pub fn in_memory(config: Config) -> Self {
        Self::with_stores(
            config,
            Arc::new(MemoryArtifactStore::new()),
            Arc::new(MemoryCatalog::new()),
        )
    }

    /// Build on caller-supplied stores.
    pub fn with_stores(
        config: Config,
        artifacts: Arc<dyn ArtifactStore>,
        catalog: Arc<dyn CatalogStore>,
    ) -> Self {
        let pipeline = match config.face_model_path() {
            Some(path) => FilterPipeline::with_face_detector(Arc::new(SeetaFaceDetector::new(
                path,
                config.filters.face_min_size,
            ))),
            None => FilterPipeline::new(),
        };

        let orchestrator = BatchOrchestrator::new(
            artifacts.clone(),
            catalog.clone(),
            Arc::new(pipeline),
            ImageDecoder::new(config.limits.clone()),
            Encoder::new(config.codec.jpeg_quality),
            config.processing.parallel_workers,
        );
        let exporter = ArchiveExporter::new(artifacts.clone(), catalog.clone(), config.export.clone());
        let uploader = Uploader::new(artifacts.clone(), catalog.clone(), config.limits.clone());

        Self {
            config,
            artifacts,
            catalog,
            orchestrator,
            exporter,
            uploader,
        }
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.catalog
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifacts
    }

    pub async fn create_collection(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Collection> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DarkroomError::Validation(
                "collection name must not be empty".to_string(),
            ));
        }
        let collection = self.catalog.create_collection(name, description).await?;
        tracing::debug!("Created collection {} ({})", collection.id, collection.name);
        Ok(collection)
    }

    pub async fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        Ok(self.catalog.list_collections().await?)
    }

    /// A collection with its member images and linked artifacts.
    pub async fn get_collection(&self, id: CollectionId) -> Result<CollectionDetail> {
        let collection = self
            .catalog
            .get_collection(id)
            .await?
            .ok_or_else(|| DarkroomError::NotFound(format!("collection {id}")))?;
        let images = self.catalog.images_for_collection(id).await?;
        let artifacts = self.catalog.artifacts_for_collection(id).await?;
        Ok(CollectionDetail {
            collection,
            images,
            artifacts,
        })
    }

    /// Delete a collection and everything it owns, then purge their blobs.
    ///
    /// Blob removal is best-effort: a failure is logged and the remaining
    /// blobs are still attempted. Returns the number of blobs purged.
    pub async fn delete_collection(&self, id: CollectionId) -> Result<usize> {
        let purged = self
            .catalog
            .delete_collection(id)
            .await?
            .ok_or_else(|| DarkroomError::NotFound(format!("collection {id}")))?;

        let mut removed = 0;
        for key in purged.all() {
            match self.artifacts.remove(key).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Could not remove blob {} of collection {}: {}", key, id, e),
            }
        }
        tracing::info!(
            "Deleted collection {}: {} images, {} artifacts, {} blobs purged",
            id,
            purged.source_keys.len(),
            purged.artifact_keys.len(),
            removed
        );
        Ok(removed)
    }

    pub async fn upload(&self, request: UploadRequest) -> Result<SourceImage> {
        self.uploader.upload(request).await
    }

    /// Make an existing image a member of another collection.
    ///
    /// Returns `false` when it already was one.
    pub async fn attach_image(
        &self,
        collection_id: CollectionId,
        image_id: SourceImageId,
    ) -> Result<bool> {
        if self.catalog.get_collection(collection_id).await?.is_none() {
            return Err(DarkroomError::NotFound(format!("collection {collection_id}")));
        }
        if self.catalog.get_source_image(image_id).await?.is_none() {
            return Err(DarkroomError::NotFound(format!("source image {image_id}")));
        }
        Ok(self.catalog.link_source_image(collection_id, image_id).await?)
    }

    /// Validate `params` and apply them to one image.
    pub async fn apply_to_image(
        &self,
        collection_id: CollectionId,
        image_id: SourceImageId,
        params: FilterParams,
    ) -> Result<ItemResult> {
        let spec = FilterSpec::new(params)?;
        self.orchestrator
            .apply_to_image(collection_id, image_id, &spec)
            .await
    }

    /// Validate `params` and apply them to every member image of a collection.
    pub async fn apply_to_collection(
        &self,
        collection_id: CollectionId,
        params: FilterParams,
    ) -> Result<BatchReport> {
        let spec = FilterSpec::new(params)?;
        self.orchestrator
            .apply_to_collection(collection_id, &spec)
            .await
    }

    /// Open a stored original or artifact for streaming.
    pub async fn download(&self, key: &str, disposition: Disposition) -> Result<Download> {
        let reader = self.artifacts.get(key).await.map_err(|e| {
            if e.is_not_found() {
                DarkroomError::NotFound(format!("file {key}"))
            } else {
                e.into()
            }
        })?;
        Ok(Download {
            file_name: download_name(key).to_string(),
            media_type: reader.media_type().to_string(),
            size: reader.size(),
            disposition,
            reader,
        })
    }

    pub async fn export_zip(&self, collection_id: CollectionId) -> Result<ExportedArchive> {
        self.exporter.export_zip(collection_id).await
    }
}

/// Storage keys are `{uuid}_{name}`; clients see only `{name}`.
fn download_name(key: &str) -> &str {
    match key.split_once('_') {
        Some((_, name)) if !name.is_empty() => name,
        _ => key,
    }
}
