//! Media type detection from magic bytes.
//!
//! Used at upload when the caller sends no content type, or only the
//! generic `application/octet-stream`. Sniffing never rejects: unknown
//! content keeps the generic type and fails later, at decode.

/// Fallback media type for unrecognized content.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Guess an image media type from the leading bytes of `data`.
pub fn sniff_media_type(data: &[u8]) -> Option<&'static str> {
    let header = &data[..data.len().min(12)];
    if header.len() < 2 {
        return None;
    }

    // JPEG: FF D8 FF
    if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }

    // PNG: 89 50 4E 47
    if header.starts_with(&[0x89, b'P', b'N', b'G']) {
        return Some("image/png");
    }

    if header.starts_with(b"GIF8") {
        return Some("image/gif");
    }

    // WebP: RIFF....WEBP
    if header.len() >= 12 && header.starts_with(b"RIFF") && &header[8..12] == b"WEBP" {
        return Some("image/webp");
    }

    // TIFF: II (little-endian) or MM (big-endian) followed by version 42
    if header.starts_with(&[b'I', b'I', 0x2A, 0x00]) || header.starts_with(&[b'M', b'M', 0x00, 0x2A])
    {
        return Some("image/tiff");
    }

    // HEIC/HEIF/AVIF: ftyp box at offset 4, brand at 8
    if header.len() >= 12 && &header[4..8] == b"ftyp" {
        return match &header[8..12] {
            b"avif" | b"avis" => Some("image/avif"),
            b"heic" | b"heix" | b"mif1" | b"msf1" => Some("image/heic"),
            _ => None,
        };
    }

    if header.starts_with(b"BM") {
        return Some("image/bmp");
    }

    None
}

/// The media type to record for an upload.
///
/// A specific client-declared type wins; otherwise the sniffed type, and
/// failing that the generic fallback.
pub fn resolve_media_type(declared: Option<&str>, data: &[u8]) -> String {
    match declared.map(str::trim) {
        Some(t) if !t.is_empty() && !t.eq_ignore_ascii_case(OCTET_STREAM) => t.to_string(),
        _ => sniff_media_type(data).unwrap_or(OCTET_STREAM).to_string(),
    }
}
