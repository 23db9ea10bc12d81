//! Finding uploadable images on the local filesystem.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ProcessingConfig;

/// Discovers image files to upload from a file or directory argument.
pub struct FileDiscovery {
    supported_formats: Vec<String>,
}

/// A file picked for upload.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Name the upload is recorded under
    pub file_name: String,
    pub size: u64,
}

impl FileDiscovery {
    pub fn new(config: &ProcessingConfig) -> Self {
        Self {
            supported_formats: config
                .supported_formats
                .iter()
                .map(|f| f.to_lowercase())
                .collect(),
        }
    }

    /// A single file is returned as-is, whatever its extension: the caller
    /// named it explicitly. Directories are walked recursively and filtered
    /// by extension, skipping dotfiles.
    pub fn discover(&self, path: &Path) -> Vec<DiscoveredFile> {
        if path.is_file() {
            return std::fs::metadata(path)
                .ok()
                .and_then(|meta| Self::entry(path, meta.len()))
                .into_iter()
                .collect();
        }

        let mut files: Vec<DiscoveredFile> = WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !Self::is_hidden(e.path()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && self.is_supported(e.path()))
            .filter_map(|e| {
                let size = e.metadata().ok()?.len();
                Self::entry(e.path(), size)
            })
            .collect();

        // Deterministic upload order
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    fn entry(path: &Path, size: u64) -> Option<DiscoveredFile> {
        let file_name = path.file_name()?.to_str()?.to_string();
        Some(DiscoveredFile {
            path: path.to_path_buf(),
            file_name,
            size,
        })
    }

    fn is_hidden(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'))
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.supported_formats.iter().any(|fmt| *fmt == ext)
            })
            .unwrap_or(false)
    }

    pub fn total_size(files: &[DiscoveredFile]) -> u64 {
        files.iter().map(|f| f.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovery() -> FileDiscovery {
        FileDiscovery::new(&ProcessingConfig::default())
    }

    #[test]
    fn test_is_supported() {
        let discovery = discovery();
        assert!(discovery.is_supported(Path::new("test.jpg")));
        assert!(discovery.is_supported(Path::new("test.JPG")));
        assert!(discovery.is_supported(Path::new("test.tiff")));
        assert!(!discovery.is_supported(Path::new("test.txt")));
        assert!(!discovery.is_supported(Path::new("noext")));
    }

    #[test]
    fn test_discover_directory_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.png"), b"bb").unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::write(dir.path().join(".hidden.png"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/c.webp"), b"ccc").unwrap();

        let files = discovery().discover(dir.path());
        let names: Vec<_> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.png", "c.webp"]);
        assert_eq!(FileDiscovery::total_size(&files), 6);
    }

    #[test]
    fn test_explicit_file_is_always_taken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.raw");
        std::fs::write(&path, b"1234").unwrap();

        let files = discovery().discover(&path);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name, "scan.raw");
        assert_eq!(files[0].size, 4);
    }
}
