//! Upload-time metadata extraction: header dimensions plus EXIF.

use exif::{In, Reader, Tag, Value};
use std::io::Cursor;

use super::decode::format_to_string;
use crate::types::SourceMetadata;

/// Extracts cheap-to-read attributes from uploaded image bytes.
pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Read dimensions, container format and EXIF fields from `bytes`.
    ///
    /// Lenient: returns whatever could be read, and `None` when nothing
    /// could. Never decodes pixel data.
    pub fn extract(bytes: &[u8]) -> Option<SourceMetadata> {
        let mut metadata = SourceMetadata::default();

        if let Ok(reader) = image::ImageReader::new(Cursor::new(bytes)).with_guessed_format() {
            metadata.format = reader.format().map(format_to_string);
            if let Ok((width, height)) = reader.into_dimensions() {
                metadata.width = Some(width);
                metadata.height = Some(height);
            }
        }

        if let Ok(exif) = Reader::new().read_from_container(&mut Cursor::new(bytes)) {
            metadata.captured_at = Self::get_datetime(&exif);
            metadata.camera_make = Self::get_string(&exif, Tag::Make);
            metadata.camera_model = Self::get_string(&exif, Tag::Model);
            metadata.orientation = Self::get_u32(&exif, Tag::Orientation);
        }

        if metadata.is_empty() {
            None
        } else {
            Some(metadata)
        }
    }

    /// Get a string field from EXIF data.
    fn get_string(exif: &exif::Exif, tag: Tag) -> Option<String> {
        exif.get_field(tag, In::PRIMARY).map(|f| {
            let s = f.display_value().to_string();
            s.trim_matches('"').to_string()
        })
    }

    fn get_u32(exif: &exif::Exif, tag: Tag) -> Option<u32> {
        exif.get_field(tag, In::PRIMARY)
            .and_then(|f| match &f.value {
                Value::Short(v) => v.first().map(|&x| x as u32),
                Value::Long(v) => v.first().copied(),
                _ => None,
            })
    }

    /// Get the capture datetime, preferring DateTimeOriginal over DateTime.
    fn get_datetime(exif: &exif::Exif) -> Option<String> {
        exif.get_field(Tag::DateTimeOriginal, In::PRIMARY)
            .or_else(|| exif.get_field(Tag::DateTime, In::PRIMARY))
            .map(|f| {
                let s = f.display_value().to_string();
                s.trim_matches('"').to_string()
            })
    }
}
