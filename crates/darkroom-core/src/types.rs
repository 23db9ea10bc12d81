//! Core data types for the Darkroom catalog.
//!
//! Plain value structs: relationships are read explicitly through the
//! catalog (`images_for_collection`, `artifacts_for_image`, ...) rather than
//! hanging off these structs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Catalog identity of a collection.
pub type CollectionId = i64;

/// Catalog identity of an uploaded source image.
pub type SourceImageId = i64;

/// Catalog identity of a derived artifact.
pub type ArtifactId = i64;

/// A named grouping of source images and derived artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing view of a collection with member counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub id: CollectionId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub image_count: usize,
    pub artifact_count: usize,
}

/// A collection together with everything linked into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionDetail {
    #[serde(flatten)]
    pub collection: Collection,
    pub images: Vec<SourceImage>,
    pub artifacts: Vec<DerivedArtifact>,
}

/// Known attributes of an uploaded image.
///
/// Everything the uploader can learn cheaply gets a typed field; anything
/// else goes in `extra` as an opaque string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Detected container format ("jpeg", "png", ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// When the photo was captured, as recorded in EXIF
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,

    /// EXIF orientation (1-8)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<u32>,

    /// Opaque extension field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl SourceMetadata {
    /// True when no field carries a value.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Insert payload for a source image.
#[derive(Debug, Clone)]
pub struct NewSourceImage {
    pub storage_key: String,
    pub file_name: String,
    pub media_type: String,
    pub file_size: u64,
    pub checksum: Option<String>,
    pub metadata: Option<SourceMetadata>,
}

/// An uploaded original. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceImage {
    pub id: SourceImageId,
    /// Collection the image was uploaded into; deleting it deletes the image
    pub owner_collection_id: CollectionId,
    pub storage_key: String,
    pub file_name: String,
    pub media_type: String,
    pub file_size: u64,
    /// BLAKE3 of the uploaded bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SourceMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome recorded on a derived artifact row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Completed,
    Failed,
}

impl ArtifactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactStatus::Completed => "completed",
            ArtifactStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(ArtifactStatus::Completed),
            "failed" => Some(ArtifactStatus::Failed),
            _ => None,
        }
    }
}

/// Insert payload for a derived artifact.
#[derive(Debug, Clone)]
pub struct NewDerivedArtifact {
    pub source_image_id: SourceImageId,
    pub storage_key: String,
    pub file_name: String,
    pub media_type: String,
    pub file_size: u64,
    pub fingerprint: Option<String>,
    /// Canonical JSON of the filter spec that produced it
    pub params: Option<String>,
    pub status: ArtifactStatus,
    pub error_message: Option<String>,
}

/// The stored output of running one filter spec over one source image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedArtifact {
    pub id: ArtifactId,
    pub source_image_id: SourceImageId,
    /// Collection whose request created the artifact
    pub owner_collection_id: CollectionId,
    pub storage_key: String,
    pub file_name: String,
    pub media_type: String,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<String>,
    pub status: ArtifactStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Membership of a source image in a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionImageLink {
    pub collection_id: CollectionId,
    pub source_image_id: SourceImageId,
}

/// Membership of a derived artifact in a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionArtifactLink {
    pub collection_id: CollectionId,
    pub artifact_id: ArtifactId,
}

/// Storage keys of every row a collection delete removed from the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgedKeys {
    pub source_keys: Vec<String>,
    pub artifact_keys: Vec<String>,
}

impl PurgedKeys {
    pub fn len(&self) -> usize {
        self.source_keys.len() + self.artifact_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.source_keys
            .iter()
            .chain(self.artifact_keys.iter())
            .map(String::as_str)
    }
}
