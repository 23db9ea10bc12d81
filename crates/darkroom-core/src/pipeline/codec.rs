//! Encoding filtered rasters into the requested output format.

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;

use super::spec::OutputFormat;
use crate::error::{PipelineError, PipelineResult};

/// Encodes RGB rasters. JPEG quality comes from `[codec]` config.
#[derive(Debug, Clone, Copy)]
pub struct Encoder {
    jpeg_quality: u8,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(90)
    }
}

impl Encoder {
    pub fn new(jpeg_quality: u8) -> Self {
        Self { jpeg_quality }
    }

    /// Encode `image` and return the bytes with their media type.
    pub fn encode(
        &self,
        image: &RgbImage,
        format: OutputFormat,
    ) -> PipelineResult<(Vec<u8>, &'static str)> {
        let mut buffer = Cursor::new(Vec::new());

        let result = match format {
            OutputFormat::Jpeg => {
                JpegEncoder::new_with_quality(&mut buffer, self.jpeg_quality).encode_image(image)
            }
            OutputFormat::Png => image.write_to(&mut buffer, ImageFormat::Png),
            OutputFormat::Webp => image.write_to(&mut buffer, ImageFormat::WebP),
        };

        result.map_err(|e| PipelineError::Encode {
            format: format.as_str().to_string(),
            message: e.to_string(),
        })?;

        Ok((buffer.into_inner(), format.media_type()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn sample() -> RgbImage {
        RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 128]))
    }

    #[test]
    fn test_png_roundtrips_losslessly() {
        let img = sample();
        let (bytes, media_type) = Encoder::default().encode(&img, OutputFormat::Png).unwrap();
        assert_eq!(media_type, "image/png");
        assert_eq!(&bytes[1..4], b"PNG");

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_jpeg_has_soi_marker() {
        let (bytes, media_type) = Encoder::new(75).encode(&sample(), OutputFormat::Jpeg).unwrap();
        assert_eq!(media_type, "image/jpeg");
        assert_eq!(&bytes[0..3], &[0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn test_webp_is_riff() {
        let (bytes, media_type) = Encoder::default().encode(&sample(), OutputFormat::Webp).unwrap();
        assert_eq!(media_type, "image/webp");
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }

    #[test]
    fn test_jpeg_quality_changes_size() {
        let img = RgbImage::from_fn(128, 128, |x, y| {
            Rgb([(x * 31 % 256) as u8, (y * 17 % 256) as u8, ((x ^ y) % 256) as u8])
        });
        let (low, _) = Encoder::new(10).encode(&img, OutputFormat::Jpeg).unwrap();
        let (high, _) = Encoder::new(95).encode(&img, OutputFormat::Jpeg).unwrap();
        assert!(low.len() < high.len());
    }
}
