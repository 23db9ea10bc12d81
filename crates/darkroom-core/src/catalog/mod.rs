//! The catalog: collections, source images, derived artifacts and the two
//! membership link tables.
//!
//! Every implementation enforces the same rules:
//!
//! - storage keys are unique per source image and per artifact
//! - `(source_image_id, fingerprint)` is unique when a fingerprint is set
//! - link pairs are unique, and re-linking is a no-op
//! - deleting a collection removes the images and artifacts it owns (plus
//!   artifacts derived from those images) and every link touching them, but
//!   leaves rows that are only linked into it

pub mod memory;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod conformance;

pub use memory::MemoryCatalog;
pub use sqlite::SqliteCatalog;

use async_trait::async_trait;

use crate::error::CatalogResult;
use crate::types::{
    ArtifactId, Collection, CollectionId, CollectionSummary, DerivedArtifact,
    NewDerivedArtifact, NewSourceImage, PurgedKeys, SourceImage, SourceImageId,
};

/// Contract every catalog implements.
///
/// Multi-row writes (`create_source_image`, `create_artifact`,
/// `delete_collection`) are atomic: either every row lands or none does.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn create_collection(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> CatalogResult<Collection>;

    /// All collections in id order, with member counts.
    async fn list_collections(&self) -> CatalogResult<Vec<CollectionSummary>>;

    async fn get_collection(&self, id: CollectionId) -> CatalogResult<Option<Collection>>;

    /// Delete a collection and everything it owns. `None` if it did not exist.
    async fn delete_collection(&self, id: CollectionId) -> CatalogResult<Option<PurgedKeys>>;

    /// Insert a source image owned by and linked into `collection_id`.
    async fn create_source_image(
        &self,
        image: NewSourceImage,
        collection_id: CollectionId,
    ) -> CatalogResult<SourceImage>;

    async fn get_source_image(&self, id: SourceImageId) -> CatalogResult<Option<SourceImage>>;

    /// Add link-only membership. Returns `false` when the link already existed.
    async fn link_source_image(
        &self,
        collection_id: CollectionId,
        image_id: SourceImageId,
    ) -> CatalogResult<bool>;

    /// Member images of a collection, in id order.
    async fn images_for_collection(
        &self,
        collection_id: CollectionId,
    ) -> CatalogResult<Vec<SourceImage>>;

    /// The artifact previously produced for this fingerprint, if any.
    async fn find_artifact(
        &self,
        image_id: SourceImageId,
        fingerprint: &str,
    ) -> CatalogResult<Option<DerivedArtifact>>;

    /// Insert an artifact owned by and linked into `collection_id`.
    ///
    /// Fails with `CatalogError::Duplicate` when the `(source, fingerprint)`
    /// pair or the storage key is already taken.
    async fn create_artifact(
        &self,
        artifact: NewDerivedArtifact,
        collection_id: CollectionId,
    ) -> CatalogResult<DerivedArtifact>;

    async fn artifact_linked(
        &self,
        collection_id: CollectionId,
        artifact_id: ArtifactId,
    ) -> CatalogResult<bool>;

    /// Add link-only membership. Returns `false` when the link already existed.
    async fn link_artifact(
        &self,
        collection_id: CollectionId,
        artifact_id: ArtifactId,
    ) -> CatalogResult<bool>;

    /// Artifacts linked into a collection, in id order.
    async fn artifacts_for_collection(
        &self,
        collection_id: CollectionId,
    ) -> CatalogResult<Vec<DerivedArtifact>>;

    /// Artifacts derived from one source image, in id order.
    async fn artifacts_for_image(
        &self,
        image_id: SourceImageId,
    ) -> CatalogResult<Vec<DerivedArtifact>>;
}
