//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

/// 64 MiB read chunks.
const MAX_CHUNK_SIZE_KB: usize = 64 * 1024;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.parallel_workers == 0 {
            return Err(ConfigError::ValidationError(
                "processing.parallel_workers must be > 0".into(),
            ));
        }
        if self.limits.max_upload_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_upload_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.decode_timeout_ms must be > 0".into(),
            ));
        }
        if !(1..=100).contains(&self.codec.jpeg_quality) {
            return Err(ConfigError::ValidationError(
                "codec.jpeg_quality must be between 1 and 100".into(),
            ));
        }
        if self.filters.face_min_size < 20 {
            return Err(ConfigError::ValidationError(
                "filters.face_min_size must be >= 20".into(),
            ));
        }
        if !(1..=MAX_CHUNK_SIZE_KB).contains(&self.export.chunk_size_kb) {
            return Err(ConfigError::ValidationError(format!(
                "export.chunk_size_kb must be between 1 and {MAX_CHUNK_SIZE_KB}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_parallel_workers() {
        let mut config = Config::default();
        config.processing.parallel_workers = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("parallel_workers"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.limits.decode_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("decode_timeout_ms"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_jpeg_quality() {
        let mut config = Config::default();
        config.codec.jpeg_quality = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("jpeg_quality"));

        config.codec.jpeg_quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_tiny_face_size() {
        let mut config = Config::default();
        config.filters.face_min_size = 10;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("face_min_size"));
    }

    #[test]
    fn test_validate_bounds_chunk_size() {
        let mut config = Config::default();
        config.export.chunk_size_kb = 0;
        assert!(config.validate().is_err());

        config.export.chunk_size_kb = usize::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_size_kb"));

        config.export.chunk_size_kb = MAX_CHUNK_SIZE_KB;
        assert!(config.validate().is_ok());
    }
}
