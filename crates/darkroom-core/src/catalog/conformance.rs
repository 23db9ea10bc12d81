//! Behaviour every `CatalogStore` must share, run against each implementation.

use super::CatalogStore;
use crate::error::CatalogError;
use crate::types::{ArtifactStatus, NewDerivedArtifact, NewSourceImage, SourceMetadata};

pub(crate) fn new_image(key: &str) -> NewSourceImage {
    NewSourceImage {
        storage_key: key.to_string(),
        file_name: format!("{key}.png"),
        media_type: "image/png".to_string(),
        file_size: 42,
        checksum: Some("c0ffee".to_string()),
        metadata: Some(SourceMetadata {
            width: Some(4),
            height: Some(3),
            format: Some("png".to_string()),
            ..Default::default()
        }),
    }
}

pub(crate) fn new_artifact(source: i64, key: &str, fingerprint: &str) -> NewDerivedArtifact {
    NewDerivedArtifact {
        source_image_id: source,
        storage_key: key.to_string(),
        file_name: format!("filtered_{key}.png"),
        media_type: "image/png".to_string(),
        file_size: 7,
        fingerprint: Some(fingerprint.to_string()),
        params: Some(r#"{"output_format":"png"}"#.to_string()),
        status: ArtifactStatus::Completed,
        error_message: None,
    }
}

pub(crate) async fn run_all(catalog: &dyn CatalogStore) {
    roundtrips_rows(catalog).await;
    rejects_duplicates(catalog).await;
    links_are_idempotent(catalog).await;
    delete_respects_ownership(catalog).await;
    missing_rows(catalog).await;
}

async fn roundtrips_rows(catalog: &dyn CatalogStore) {
    let c = catalog.create_collection("trip", Some("summer")).await.unwrap();
    assert_eq!(catalog.get_collection(c.id).await.unwrap().unwrap().name, "trip");

    let image = catalog.create_source_image(new_image("rt-img"), c.id).await.unwrap();
    assert_eq!(image.owner_collection_id, c.id);
    let loaded = catalog.get_source_image(image.id).await.unwrap().unwrap();
    assert_eq!(loaded.storage_key, "rt-img");
    assert_eq!(loaded.file_size, 42);
    assert_eq!(loaded.metadata.unwrap().width, Some(4));

    let members = catalog.images_for_collection(c.id).await.unwrap();
    assert_eq!(members.iter().map(|i| i.id).collect::<Vec<_>>(), vec![image.id]);

    let artifact = catalog
        .create_artifact(new_artifact(image.id, "rt-art", "fp1"), c.id)
        .await
        .unwrap();
    assert_eq!(artifact.status, ArtifactStatus::Completed);
    let found = catalog.find_artifact(image.id, "fp1").await.unwrap().unwrap();
    assert_eq!(found.id, artifact.id);
    assert!(catalog.find_artifact(image.id, "fp2").await.unwrap().is_none());
    assert!(catalog.artifact_linked(c.id, artifact.id).await.unwrap());
    assert_eq!(catalog.artifacts_for_image(image.id).await.unwrap().len(), 1);
    assert_eq!(catalog.artifacts_for_collection(c.id).await.unwrap().len(), 1);

    let summary = catalog
        .list_collections()
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.id == c.id)
        .unwrap();
    assert_eq!((summary.image_count, summary.artifact_count), (1, 1));
}

async fn rejects_duplicates(catalog: &dyn CatalogStore) {
    let c = catalog.create_collection("dups", None).await.unwrap();
    let image = catalog.create_source_image(new_image("dup-img"), c.id).await.unwrap();

    let err = catalog
        .create_source_image(new_image("dup-img"), c.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Duplicate { .. }), "{err}");

    catalog
        .create_artifact(new_artifact(image.id, "dup-art-1", "same"), c.id)
        .await
        .unwrap();
    let err = catalog
        .create_artifact(new_artifact(image.id, "dup-art-2", "same"), c.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Duplicate { .. }), "{err}");

    // The rejected insert left nothing behind
    assert_eq!(catalog.artifacts_for_image(image.id).await.unwrap().len(), 1);
    assert_eq!(catalog.artifacts_for_collection(c.id).await.unwrap().len(), 1);

    // No fingerprint, no uniqueness on the pair
    let mut a = new_artifact(image.id, "dup-art-3", "x");
    a.fingerprint = None;
    let mut b = new_artifact(image.id, "dup-art-4", "x");
    b.fingerprint = None;
    catalog.create_artifact(a, c.id).await.unwrap();
    catalog.create_artifact(b, c.id).await.unwrap();
}

async fn links_are_idempotent(catalog: &dyn CatalogStore) {
    let a = catalog.create_collection("a", None).await.unwrap();
    let b = catalog.create_collection("b", None).await.unwrap();
    let image = catalog.create_source_image(new_image("link-img"), a.id).await.unwrap();
    let artifact = catalog
        .create_artifact(new_artifact(image.id, "link-art", "fp"), a.id)
        .await
        .unwrap();

    assert!(!catalog.link_source_image(a.id, image.id).await.unwrap());
    assert!(catalog.link_source_image(b.id, image.id).await.unwrap());
    assert!(!catalog.link_source_image(b.id, image.id).await.unwrap());

    assert!(!catalog.artifact_linked(b.id, artifact.id).await.unwrap());
    assert!(catalog.link_artifact(b.id, artifact.id).await.unwrap());
    assert!(!catalog.link_artifact(b.id, artifact.id).await.unwrap());
    assert!(catalog.artifact_linked(b.id, artifact.id).await.unwrap());
    assert_eq!(catalog.images_for_collection(b.id).await.unwrap().len(), 1);
}

async fn delete_respects_ownership(catalog: &dyn CatalogStore) {
    let owner = catalog.create_collection("owner", None).await.unwrap();
    let other = catalog.create_collection("other", None).await.unwrap();

    // Owned by `owner`, shared into `other`
    let owned = catalog.create_source_image(new_image("del-owned"), owner.id).await.unwrap();
    let owned_art = catalog
        .create_artifact(new_artifact(owned.id, "del-owned-art", "fp"), owner.id)
        .await
        .unwrap();
    catalog.link_source_image(other.id, owned.id).await.unwrap();
    catalog.link_artifact(other.id, owned_art.id).await.unwrap();

    // Owned by `other`, shared into `owner`, with one artifact made for each
    let foreign = catalog.create_source_image(new_image("del-foreign"), other.id).await.unwrap();
    catalog.link_source_image(owner.id, foreign.id).await.unwrap();
    let made_for_owner = catalog
        .create_artifact(new_artifact(foreign.id, "del-foreign-owner", "fp-a"), owner.id)
        .await
        .unwrap();
    let made_for_other = catalog
        .create_artifact(new_artifact(foreign.id, "del-foreign-other", "fp-b"), other.id)
        .await
        .unwrap();
    catalog.link_artifact(owner.id, made_for_other.id).await.unwrap();

    let mut purged = catalog.delete_collection(owner.id).await.unwrap().unwrap();
    purged.artifact_keys.sort();
    assert_eq!(purged.source_keys, vec!["del-owned".to_string()]);
    assert_eq!(
        purged.artifact_keys,
        vec!["del-foreign-owner".to_string(), "del-owned-art".to_string()]
    );

    assert!(catalog.get_collection(owner.id).await.unwrap().is_none());
    assert!(catalog.get_source_image(owned.id).await.unwrap().is_none());
    assert!(catalog.find_artifact(foreign.id, "fp-a").await.unwrap().is_none());
    assert!(catalog.get_source_image(foreign.id).await.unwrap().is_some());
    assert_eq!(
        catalog.find_artifact(foreign.id, "fp-b").await.unwrap().map(|a| a.id),
        Some(made_for_other.id)
    );

    // `other` lost the memberships that pointed at purged rows only
    let images: Vec<_> = catalog
        .images_for_collection(other.id)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(images, vec![foreign.id]);
    let artifacts: Vec<_> = catalog
        .artifacts_for_collection(other.id)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(artifacts, vec![made_for_other.id]);
    assert!(!artifacts.contains(&made_for_owner.id));

    assert!(catalog.delete_collection(owner.id).await.unwrap().is_none());
}

async fn missing_rows(catalog: &dyn CatalogStore) {
    assert!(catalog.get_collection(999_999).await.unwrap().is_none());
    assert!(catalog.get_source_image(999_999).await.unwrap().is_none());

    let err = catalog
        .create_source_image(new_image("orphan"), 999_999)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::NotFound { .. }), "{err}");

    let c = catalog.create_collection("m", None).await.unwrap();
    let err = catalog.link_artifact(c.id, 999_999).await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound { .. }), "{err}");
    assert!(catalog.images_for_collection(999_999).await.unwrap().is_empty());
}
