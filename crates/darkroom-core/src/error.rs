//! Error types for Darkroom.
//!
//! Errors are organized by layer: configuration, the image pipeline, the blob
//! store, and the catalog. `DarkroomError` is what the operation surface
//! returns; per-item failures inside a batch never surface as a
//! `DarkroomError`, they are recorded in the item result instead.

use thiserror::Error;

/// Top-level error type for Darkroom operations.
#[derive(Error, Debug)]
pub enum DarkroomError {
    /// A collection, image, or blob does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The source bytes could not be decoded as an image
    #[error("Unsupported image: {0}")]
    UnsupportedImage(String),

    /// Out-of-range or malformed input (filter parameters, upload limits)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Blob store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Catalog transaction failure
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// The encoder rejected the filtered image
    #[error("Encode error: {0}")]
    Encode(String),

    /// None of a collection's artifacts could be added to the archive
    #[error("Nothing to export for collection {collection_id}")]
    EmptyExport { collection_id: i64 },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PipelineError> for DarkroomError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Encode { .. } => DarkroomError::Encode(err.to_string()),
            other => DarkroomError::UnsupportedImage(other.to_string()),
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Image pipeline errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Image decoding failed
    #[error("Decode error for {name}: {message}")]
    Decode { name: String, message: String },

    /// Decoding did not finish in time
    #[error("Decode of {name} timed out after {timeout_ms}ms")]
    Timeout { name: String, timeout_ms: u64 },

    /// Image dimensions exceed limit
    #[error("Image too large: {name} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        name: String,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// Encoding the filtered raster failed
    #[error("Encode to {format} failed: {message}")]
    Encode { format: String, message: String },
}

/// Blob store errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No blob under this key
    #[error("Blob not found: {0}")]
    NotFound(String),

    /// Key is empty or would escape the store's namespace
    #[error("Invalid blob key: {0:?}")]
    InvalidKey(String),

    /// Reading a blob failed after it was located
    #[error("Read failed for {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing a blob failed
    #[error("Write failed for {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Whether the error means "the blob is absent" rather than "the store failed".
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Catalog (metadata store) errors.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// A referenced row does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// A uniqueness constraint rejected the write
    #[error("Duplicate row violates {constraint}")]
    Duplicate { constraint: String },

    /// Any other backend failure (connection, SQL, serialization)
    #[error("Catalog backend failure: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref code, ref message) = err {
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return CatalogError::Duplicate {
                    constraint: message.clone().unwrap_or_else(|| "unique".to_string()),
                };
            }
        }
        CatalogError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Backend(format!("metadata column: {err}"))
    }
}

/// Convenience type alias for Darkroom results.
pub type Result<T> = std::result::Result<T, DarkroomError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Convenience type alias for blob store results.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Convenience type alias for catalog results.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_pipeline_error_maps_to_encode() {
        let err: DarkroomError = PipelineError::Encode {
            format: "png".into(),
            message: "buffer rejected".into(),
        }
        .into();
        assert!(matches!(err, DarkroomError::Encode(_)));
    }

    #[test]
    fn test_decode_pipeline_error_maps_to_unsupported_image() {
        let err: DarkroomError = PipelineError::Decode {
            name: "cat.png".into(),
            message: "bad header".into(),
        }
        .into();
        assert!(matches!(err, DarkroomError::UnsupportedImage(_)));
        assert!(err.to_string().contains("cat.png"));
    }

    #[test]
    fn test_storage_not_found_classification() {
        assert!(StorageError::NotFound("k".into()).is_not_found());
        assert!(!StorageError::InvalidKey("../k".into()).is_not_found());
    }
}
