//! Configuration management for Darkroom.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. All config structs implement `Default`.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Darkroom.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backing store locations
    pub storage: StorageConfig,

    /// Processing settings
    pub processing: ProcessingConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Encoder settings
    pub codec: CodecConfig,

    /// Filter settings
    pub filters: FilterConfig,

    /// Archive export settings
    pub export: ExportConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.darkroom.darkroom/config.toml
    /// - Linux: ~/.config/darkroom/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\darkroom\config\config.toml
    ///
    /// Falls back to ~/.darkroom/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "darkroom", "darkroom")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".darkroom").join("config.toml")
            })
    }

    /// Resolved blob store root (with ~ expansion).
    pub fn blob_dir(&self) -> PathBuf {
        expand(&self.storage.blob_dir)
    }

    /// Resolved catalog path (with ~ expansion).
    pub fn catalog_path(&self) -> PathBuf {
        expand(&self.storage.catalog_path)
    }

    /// Resolved face model path, if configured.
    pub fn face_model_path(&self) -> Option<PathBuf> {
        self.filters.face_model_path.as_deref().map(expand)
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(&path_str);
    PathBuf::from(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.processing.parallel_workers, 4);
        assert_eq!(config.codec.jpeg_quality, 90);
        assert_eq!(config.limits.max_upload_size_mb, 100);
        assert_eq!(config.export.chunk_size_bytes(), 1024 * 1024);
        assert!(config.filters.face_model_path.is_none());
    }

    #[test]
    fn test_export_sizes_saturate() {
        let export = ExportConfig {
            spool_threshold_mb: usize::MAX,
            chunk_size_kb: usize::MAX,
        };
        assert_eq!(export.spool_threshold_bytes(), usize::MAX);
        assert_eq!(export.chunk_size_bytes(), usize::MAX);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[storage]"));
        assert!(toml.contains("[processing]"));
        assert!(toml.contains("[export]"));
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[processing]\nparallel_workers = 8\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.processing.parallel_workers, 8);
        assert_eq!(config.codec.jpeg_quality, 90);
    }

    #[test]
    fn test_tilde_expansion() {
        let config = Config::default();
        let blob_dir = config.blob_dir();
        assert!(!blob_dir.to_string_lossy().starts_with('~'));
        assert!(blob_dir.ends_with(".darkroom/blobs"));
    }
}
