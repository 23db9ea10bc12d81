//! Image processing pipeline components.
//!
//! - **spec**: Filter parameters and their validated, canonical form
//! - **filters**: The ordered filter pipeline over RGB rasters
//! - **kernel**: Convolution, Gaussian and HSV helpers the filters share
//! - **face**: Face detection for the face overlay
//! - **fingerprint**: Artifact fingerprints and content checksums
//! - **decode**: Bounded decoding of stored bytes
//! - **codec**: Encoding to the requested output format
//! - **metadata**: Upload-time dimension and EXIF extraction
//! - **sniff**: Media type detection from magic bytes
//! - **discovery**: Find image files in directories

pub mod codec;
pub mod decode;
pub mod discovery;
pub mod face;
pub mod filters;
pub mod fingerprint;
pub mod kernel;
pub mod metadata;
pub mod sniff;
pub mod spec;

// Re-exports for convenient access
pub use codec::Encoder;
pub use decode::{DecodedImage, ImageDecoder};
pub use discovery::{DiscoveredFile, FileDiscovery};
pub use face::{FaceDetector, FaceRegion, SeetaFaceDetector};
pub use filters::FilterPipeline;
pub use fingerprint::{content_checksum, Fingerprint};
pub use metadata::MetadataExtractor;
pub use sniff::{resolve_media_type, sniff_media_type};
pub use spec::{FilterParams, FilterSpec, OutputFormat};
