//! Content checksums and artifact fingerprints.

use blake3::Hasher as Blake3Hasher;

use super::spec::FilterSpec;
use crate::types::SourceImageId;

/// Identity of a (source image, normalized filter spec) pair.
///
/// Two requests that would produce the same artifact hash to the same
/// fingerprint, which is what makes re-applying a spec idempotent.
pub struct Fingerprint;

impl Fingerprint {
    /// BLAKE3 over `"{source_id}:{canonical_json}"`, hex encoded.
    ///
    /// The canonical JSON includes the output format, so the same filters
    /// encoded as PNG and as JPEG are distinct artifacts.
    pub fn compute(source_id: SourceImageId, spec: &FilterSpec) -> String {
        let mut hasher = Blake3Hasher::new();
        hasher.update(source_id.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(spec.canonical_json().as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

/// BLAKE3 of an in-memory byte buffer, hex encoded.
pub fn content_checksum(data: &[u8]) -> String {
    let mut hasher = Blake3Hasher::new();
    hasher.update(data);
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::spec::FilterParams;

    fn spec(params: FilterParams) -> FilterSpec {
        FilterSpec::new(params).unwrap()
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let s = spec(FilterParams {
            brightness: Some(70),
            ..Default::default()
        });
        let a = Fingerprint::compute(1, &s);
        let b = Fingerprint::compute(1, &s.clone());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_ignores_equivalent_spellings() {
        let a = spec(FilterParams {
            blur: Some(0),
            sharpen: Some(false),
            output_format: Some("jpg".into()),
            ..Default::default()
        });
        let b = spec(FilterParams {
            output_format: Some("jpeg".into()),
            ..Default::default()
        });
        assert_eq!(Fingerprint::compute(3, &a), Fingerprint::compute(3, &b));
    }

    #[test]
    fn test_fingerprint_separates_source_spec_and_format() {
        let base = spec(FilterParams {
            vintage: Some(true),
            ..Default::default()
        });
        let other = spec(FilterParams {
            sharpen: Some(true),
            ..Default::default()
        });
        let webp = spec(FilterParams {
            vintage: Some(true),
            output_format: Some("webp".into()),
            ..Default::default()
        });

        let fp = Fingerprint::compute(1, &base);
        assert_ne!(fp, Fingerprint::compute(2, &base));
        assert_ne!(fp, Fingerprint::compute(1, &other));
        assert_ne!(fp, Fingerprint::compute(1, &webp));
    }

    #[test]
    fn test_content_checksum() {
        assert_eq!(content_checksum(b"abc"), content_checksum(b"abc"));
        assert_ne!(content_checksum(b"abc"), content_checksum(b"abd"));
    }
}
