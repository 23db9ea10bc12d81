//! In-process catalog for tests and ephemeral runs.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

use super::CatalogStore;
use crate::error::{CatalogError, CatalogResult};
use crate::types::{
    ArtifactId, Collection, CollectionId, CollectionSummary, DerivedArtifact,
    NewDerivedArtifact, NewSourceImage, PurgedKeys, SourceImage, SourceImageId,
};

#[derive(Default)]
struct State {
    last_id: i64,
    collections: BTreeMap<CollectionId, Collection>,
    images: BTreeMap<SourceImageId, SourceImage>,
    artifacts: BTreeMap<ArtifactId, DerivedArtifact>,
    image_links: BTreeSet<(CollectionId, SourceImageId)>,
    artifact_links: BTreeSet<(CollectionId, ArtifactId)>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn require_collection(&self, id: CollectionId) -> CatalogResult<()> {
        if self.collections.contains_key(&id) {
            Ok(())
        } else {
            Err(CatalogError::NotFound {
                entity: "collection",
                id,
            })
        }
    }

    fn storage_key_taken(&self, key: &str) -> bool {
        self.images.values().any(|i| i.storage_key == key)
            || self.artifacts.values().any(|a| a.storage_key == key)
    }
}

/// [`CatalogStore`] held in a single mutex. Ids are shared across tables.
#[derive(Default)]
pub struct MemoryCatalog {
    state: Mutex<State>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn create_collection(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> CatalogResult<Collection> {
        let mut state = self.state.lock();
        let now = Utc::now();
        let collection = Collection {
            id: state.next_id(),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        state.collections.insert(collection.id, collection.clone());
        Ok(collection)
    }

    async fn list_collections(&self) -> CatalogResult<Vec<CollectionSummary>> {
        let state = self.state.lock();
        Ok(state
            .collections
            .values()
            .map(|c| CollectionSummary {
                id: c.id,
                name: c.name.clone(),
                description: c.description.clone(),
                image_count: state.image_links.iter().filter(|(cid, _)| *cid == c.id).count(),
                artifact_count: state
                    .artifact_links
                    .iter()
                    .filter(|(cid, _)| *cid == c.id)
                    .count(),
            })
            .collect())
    }

    async fn get_collection(&self, id: CollectionId) -> CatalogResult<Option<Collection>> {
        Ok(self.state.lock().collections.get(&id).cloned())
    }

    async fn delete_collection(&self, id: CollectionId) -> CatalogResult<Option<PurgedKeys>> {
        let mut state = self.state.lock();
        if state.collections.remove(&id).is_none() {
            return Ok(None);
        }

        let owned_images: BTreeSet<SourceImageId> = state
            .images
            .values()
            .filter(|i| i.owner_collection_id == id)
            .map(|i| i.id)
            .collect();
        let doomed_artifacts: BTreeSet<ArtifactId> = state
            .artifacts
            .values()
            .filter(|a| a.owner_collection_id == id || owned_images.contains(&a.source_image_id))
            .map(|a| a.id)
            .collect();

        let mut purged = PurgedKeys::default();
        for image_id in &owned_images {
            if let Some(image) = state.images.remove(image_id) {
                purged.source_keys.push(image.storage_key);
            }
        }
        for artifact_id in &doomed_artifacts {
            if let Some(artifact) = state.artifacts.remove(artifact_id) {
                purged.artifact_keys.push(artifact.storage_key);
            }
        }
        state
            .image_links
            .retain(|(cid, iid)| *cid != id && !owned_images.contains(iid));
        state
            .artifact_links
            .retain(|(cid, aid)| *cid != id && !doomed_artifacts.contains(aid));

        Ok(Some(purged))
    }

    async fn create_source_image(
        &self,
        image: NewSourceImage,
        collection_id: CollectionId,
    ) -> CatalogResult<SourceImage> {
        let mut state = self.state.lock();
        state.require_collection(collection_id)?;
        if state.storage_key_taken(&image.storage_key) {
            return Err(CatalogError::Duplicate {
                constraint: "source_images.storage_key".to_string(),
            });
        }

        let now = Utc::now();
        let record = SourceImage {
            id: state.next_id(),
            owner_collection_id: collection_id,
            storage_key: image.storage_key,
            file_name: image.file_name,
            media_type: image.media_type,
            file_size: image.file_size,
            checksum: image.checksum,
            metadata: image.metadata,
            created_at: now,
            updated_at: now,
        };
        state.images.insert(record.id, record.clone());
        state.image_links.insert((collection_id, record.id));
        Ok(record)
    }

    async fn get_source_image(&self, id: SourceImageId) -> CatalogResult<Option<SourceImage>> {
        Ok(self.state.lock().images.get(&id).cloned())
    }

    async fn link_source_image(
        &self,
        collection_id: CollectionId,
        image_id: SourceImageId,
    ) -> CatalogResult<bool> {
        let mut state = self.state.lock();
        state.require_collection(collection_id)?;
        if !state.images.contains_key(&image_id) {
            return Err(CatalogError::NotFound {
                entity: "source image",
                id: image_id,
            });
        }
        Ok(state.image_links.insert((collection_id, image_id)))
    }

    async fn images_for_collection(
        &self,
        collection_id: CollectionId,
    ) -> CatalogResult<Vec<SourceImage>> {
        let state = self.state.lock();
        Ok(state
            .image_links
            .iter()
            .filter(|(cid, _)| *cid == collection_id)
            .filter_map(|(_, iid)| state.images.get(iid).cloned())
            .collect())
    }

    async fn find_artifact(
        &self,
        image_id: SourceImageId,
        fingerprint: &str,
    ) -> CatalogResult<Option<DerivedArtifact>> {
        Ok(self
            .state
            .lock()
            .artifacts
            .values()
            .find(|a| a.source_image_id == image_id && a.fingerprint.as_deref() == Some(fingerprint))
            .cloned())
    }

    async fn create_artifact(
        &self,
        artifact: NewDerivedArtifact,
        collection_id: CollectionId,
    ) -> CatalogResult<DerivedArtifact> {
        let mut state = self.state.lock();
        state.require_collection(collection_id)?;
        if !state.images.contains_key(&artifact.source_image_id) {
            return Err(CatalogError::NotFound {
                entity: "source image",
                id: artifact.source_image_id,
            });
        }
        if let Some(fp) = artifact.fingerprint.as_deref() {
            let taken = state.artifacts.values().any(|a| {
                a.source_image_id == artifact.source_image_id && a.fingerprint.as_deref() == Some(fp)
            });
            if taken {
                return Err(CatalogError::Duplicate {
                    constraint: "derived_artifacts.source_image_id, derived_artifacts.fingerprint"
                        .to_string(),
                });
            }
        }
        if state.storage_key_taken(&artifact.storage_key) {
            return Err(CatalogError::Duplicate {
                constraint: "derived_artifacts.storage_key".to_string(),
            });
        }

        let now = Utc::now();
        let record = DerivedArtifact {
            id: state.next_id(),
            source_image_id: artifact.source_image_id,
            owner_collection_id: collection_id,
            storage_key: artifact.storage_key,
            file_name: artifact.file_name,
            media_type: artifact.media_type,
            file_size: artifact.file_size,
            fingerprint: artifact.fingerprint,
            params: artifact.params,
            status: artifact.status,
            error_message: artifact.error_message,
            created_at: now,
            updated_at: now,
        };
        state.artifacts.insert(record.id, record.clone());
        state.artifact_links.insert((collection_id, record.id));
        Ok(record)
    }

    async fn artifact_linked(
        &self,
        collection_id: CollectionId,
        artifact_id: ArtifactId,
    ) -> CatalogResult<bool> {
        Ok(self
            .state
            .lock()
            .artifact_links
            .contains(&(collection_id, artifact_id)))
    }

    async fn link_artifact(
        &self,
        collection_id: CollectionId,
        artifact_id: ArtifactId,
    ) -> CatalogResult<bool> {
        let mut state = self.state.lock();
        state.require_collection(collection_id)?;
        if !state.artifacts.contains_key(&artifact_id) {
            return Err(CatalogError::NotFound {
                entity: "artifact",
                id: artifact_id,
            });
        }
        Ok(state.artifact_links.insert((collection_id, artifact_id)))
    }

    async fn artifacts_for_collection(
        &self,
        collection_id: CollectionId,
    ) -> CatalogResult<Vec<DerivedArtifact>> {
        let state = self.state.lock();
        Ok(state
            .artifact_links
            .iter()
            .filter(|(cid, _)| *cid == collection_id)
            .filter_map(|(_, aid)| state.artifacts.get(aid).cloned())
            .collect())
    }

    async fn artifacts_for_image(
        &self,
        image_id: SourceImageId,
    ) -> CatalogResult<Vec<DerivedArtifact>> {
        Ok(self
            .state
            .lock()
            .artifacts
            .values()
            .filter(|a| a.source_image_id == image_id)
            .cloned()
            .collect())
    }
}
