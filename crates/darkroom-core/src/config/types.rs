//! Sub-configuration structs with defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the two backing stores live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the filesystem blob store
    pub blob_dir: PathBuf,

    /// SQLite catalog file. `":memory:"` keeps the catalog in-process.
    pub catalog_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob_dir: PathBuf::from("~/.darkroom/blobs"),
            catalog_path: PathBuf::from("~/.darkroom/catalog.db"),
        }
    }
}

/// Processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of collection members filtered concurrently
    pub parallel_workers: usize,

    /// File extensions picked up when uploading a directory
    pub supported_formats: Vec<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel_workers: 4,
            supported_formats: vec![
                "jpg".to_string(),
                "jpeg".to_string(),
                "png".to_string(),
                "webp".to_string(),
                "gif".to_string(),
                "bmp".to_string(),
                "tif".to_string(),
                "tiff".to_string(),
            ],
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum upload size in megabytes
    pub max_upload_size_mb: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,

    /// Decode timeout in milliseconds
    pub decode_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_size_mb: 100,
            max_image_dimension: 10000,
            decode_timeout_ms: 5000,
        }
    }
}

/// Output encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self { jpeg_quality: 90 }
    }
}

/// Filter settings that depend on the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// SeetaFace model file (`seeta_fd_frontal_v1.0.bin`).
    /// Face detection is a no-op when unset or unreadable.
    pub face_model_path: Option<PathBuf>,

    /// Smallest face, in pixels, the detector reports
    pub face_min_size: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            face_model_path: None,
            face_min_size: 30,
        }
    }
}

/// Archive export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Archive size kept in memory before spilling to a temp file
    pub spool_threshold_mb: usize,

    /// Chunk size for streaming blobs in and archives out
    pub chunk_size_kb: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            spool_threshold_mb: 50,
            chunk_size_kb: 1024,
        }
    }
}

impl ExportConfig {
    /// Spool threshold in bytes.
    pub fn spool_threshold_bytes(&self) -> usize {
        self.spool_threshold_mb.saturating_mul(1024 * 1024)
    }

    /// Chunk size in bytes.
    pub fn chunk_size_bytes(&self) -> usize {
        self.chunk_size_kb.saturating_mul(1024)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
