//! The filter pipeline: a pure function from (raster, spec) to raster.
//!
//! Steps run in a fixed order and each is skipped when its parameter is
//! unset: tone (brightness/contrast), saturation, vintage, sharpen, blur,
//! edge overlay, face overlay. Photometric adjustments come first so the
//! stylistic and structural passes see the adjusted tones.

use image::{imageops, GrayImage, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::sync::Arc;

use super::face::{FaceDetector, FaceRegion};
use super::kernel::{convolve_3x3, gaussian_blur, hsv_to_rgb, rgb_to_hsv};
use super::spec::FilterSpec;

const SHARPEN_KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

/// Rows produce R', G', B' from (R, G, B). Red and blue weights sit in
/// BGR order, which keeps output identical to the legacy service.
const SEPIA: [[f32; 3]; 3] = [
    [0.189, 0.769, 0.393],
    [0.168, 0.686, 0.349],
    [0.131, 0.534, 0.272],
];
const VINTAGE_ORIGINAL_WEIGHT: f32 = 0.85;
const VINTAGE_SEPIA_WEIGHT: f32 = 0.15;

const CANNY_LOW: f32 = 100.0;
const CANNY_HIGH: f32 = 200.0;
const EDGE_WEIGHT: f32 = 0.35;
const MARKER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Applies a [`FilterSpec`] to decoded rasters.
#[derive(Clone, Default)]
pub struct FilterPipeline {
    face_detector: Option<Arc<dyn FaceDetector>>,
}

impl FilterPipeline {
    /// Pipeline without a face detector: face overlay becomes a no-op.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline that uses `detector` for the face overlay step.
    pub fn with_face_detector(detector: Arc<dyn FaceDetector>) -> Self {
        Self {
            face_detector: Some(detector),
        }
    }

    /// Run every enabled step over `image`.
    pub fn apply(&self, image: RgbImage, spec: &FilterSpec) -> RgbImage {
        let mut out = image;

        if spec.brightness().is_some() || spec.contrast().is_some() {
            adjust_tone(&mut out, spec.brightness(), spec.contrast());
        }
        if let Some(saturation) = spec.saturation() {
            scale_saturation(&mut out, f32::from(saturation) / 50.0);
        }
        if spec.vintage() {
            apply_vintage(&mut out);
        }
        if spec.sharpen() {
            out = convolve_3x3(&out, &SHARPEN_KERNEL);
        }
        if let Some(ksize) = spec.blur_kernel_size() {
            out = gaussian_blur(&out, ksize);
        }
        if spec.edge_detect() {
            overlay_edges(&mut out);
        }
        if spec.face_detect() {
            self.overlay_faces(&mut out);
        }

        out
    }

    fn overlay_faces(&self, image: &mut RgbImage) {
        let Some(detector) = &self.face_detector else {
            tracing::debug!("Face overlay requested but no detector is configured");
            return;
        };
        let gray = imageops::grayscale(&*image);
        let faces = detector.detect(&gray);
        tracing::trace!("  Faces: {}", faces.len());
        for face in faces {
            draw_marker(image, face);
        }
    }
}

/// `clamp(v * contrast + offset)` with contrast `c/50` and offset `b-50`.
/// An unset parameter is neutral.
fn adjust_tone(image: &mut RgbImage, brightness: Option<u8>, contrast: Option<u8>) {
    let gain = contrast.map_or(1.0, |c| f32::from(c) / 50.0);
    let offset = brightness.map_or(0.0, |b| f32::from(b) - 50.0);

    let mut lut = [0u8; 256];
    for (v, slot) in lut.iter_mut().enumerate() {
        *slot = (v as f32 * gain + offset).round().clamp(0.0, 255.0) as u8;
    }
    for px in image.pixels_mut() {
        for c in px.0.iter_mut() {
            *c = lut[*c as usize];
        }
    }
}

fn scale_saturation(image: &mut RgbImage, factor: f32) {
    for px in image.pixels_mut() {
        let (h, s, v) = rgb_to_hsv(*px);
        *px = hsv_to_rgb(h, (s * factor).clamp(0.0, 1.0), v);
    }
}

fn apply_vintage(image: &mut RgbImage) {
    for px in image.pixels_mut() {
        let rgb = px.0.map(f32::from);
        let mut blended = [0u8; 3];
        for (c, row) in SEPIA.iter().enumerate() {
            let sepia = (row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2])
                .round()
                .min(255.0);
            blended[c] = (VINTAGE_ORIGINAL_WEIGHT * rgb[c] + VINTAGE_SEPIA_WEIGHT * sepia)
                .round()
                .clamp(0.0, 255.0) as u8;
        }
        *px = Rgb(blended);
    }
}

/// Canny edges, thickened by one pixel, painted green on a copy of the image.
/// The copy is added back at `EDGE_WEIGHT` with saturation, so the whole
/// image brightens by that factor and edges pick up a green cast.
fn overlay_edges(image: &mut RgbImage) {
    let gray = imageops::grayscale(&*image);
    let edges = imageproc::edges::canny(&gray, CANNY_LOW, CANNY_HIGH);
    let edges: GrayImage = imageproc::morphology::dilate(&edges, Norm::L1, 1);

    for (px, edge) in image.pixels_mut().zip(edges.pixels()) {
        let overlay = if edge[0] == 0 { *px } else { MARKER_COLOR };
        for c in 0..3 {
            let sum = f32::from(px[c]) + EDGE_WEIGHT * f32::from(overlay[c]);
            px[c] = sum.round().min(255.0) as u8;
        }
    }
}

/// Two-pixel hollow rectangle around a detected face.
fn draw_marker(image: &mut RgbImage, face: FaceRegion) {
    if face.width == 0 || face.height == 0 {
        return;
    }
    draw_hollow_rect_mut(
        image,
        Rect::at(face.x, face.y).of_size(face.width, face.height),
        MARKER_COLOR,
    );
    if face.width > 2 && face.height > 2 {
        draw_hollow_rect_mut(
            image,
            Rect::at(face.x + 1, face.y + 1).of_size(face.width - 2, face.height - 2),
            MARKER_COLOR,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::spec::FilterParams;

    fn spec(params: FilterParams) -> FilterSpec {
        FilterSpec::new(params).unwrap()
    }

    fn mean(image: &RgbImage) -> f64 {
        let total: u64 = image.as_raw().iter().map(|&v| u64::from(v)).sum();
        total as f64 / image.as_raw().len() as f64
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) * 3 % 256) as u8])
        })
    }

    /// Left half `left`, right half `right`.
    fn split(width: u32, height: u32, left: u8, right: u8) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([left; 3])
            } else {
                Rgb([right; 3])
            }
        })
    }

    #[test]
    fn test_empty_spec_is_identity() {
        let img = gradient(32, 24);
        let out = FilterPipeline::new().apply(img.clone(), &FilterSpec::default());
        assert_eq!(out, img);
    }

    #[test]
    fn test_neutral_tone_is_identity() {
        let img = gradient(32, 24);
        let s = spec(FilterParams {
            brightness: Some(50),
            contrast: Some(50),
            ..Default::default()
        });
        assert_eq!(FilterPipeline::new().apply(img.clone(), &s), img);
    }

    #[test]
    fn test_neutral_saturation_is_identity_within_rounding() {
        let img = gradient(32, 24);
        let s = spec(FilterParams {
            saturation: Some(50),
            ..Default::default()
        });
        let out = FilterPipeline::new().apply(img.clone(), &s);
        for (a, b) in out.as_raw().iter().zip(img.as_raw()) {
            assert!(a.abs_diff(*b) <= 1);
        }
    }

    #[test]
    fn test_zero_contrast_flattens_to_offset() {
        let img = gradient(16, 16);
        let s = spec(FilterParams {
            contrast: Some(0),
            brightness: Some(80),
            ..Default::default()
        });
        let out = FilterPipeline::new().apply(img, &s);
        assert!(out.as_raw().iter().all(|&v| v == 30));
    }

    #[test]
    fn test_tone_clamps() {
        let img = RgbImage::from_pixel(4, 4, Rgb([200, 10, 128]));
        let s = spec(FilterParams {
            contrast: Some(100),
            ..Default::default()
        });
        let out = FilterPipeline::new().apply(img, &s);
        assert_eq!(*out.get_pixel(0, 0), Rgb([255, 20, 255]));
    }

    #[test]
    fn test_brightness_and_blur_on_gray_square() {
        let img = RgbImage::from_pixel(100, 100, Rgb([128, 128, 128]));
        let s = spec(FilterParams {
            brightness: Some(70),
            blur: Some(4),
            ..Default::default()
        });
        assert_eq!(s.blur_kernel_size(), Some(5));

        let out = FilterPipeline::new().apply(img.clone(), &s);
        assert!(mean(&out) > mean(&img));
        assert_eq!(*out.get_pixel(50, 50), Rgb([148, 148, 148]));
    }

    #[test]
    fn test_zero_saturation_desaturates() {
        let img = RgbImage::from_pixel(4, 4, Rgb([200, 40, 40]));
        let s = spec(FilterParams {
            saturation: Some(0),
            ..Default::default()
        });
        let out = FilterPipeline::new().apply(img, &s);
        let px = out.get_pixel(0, 0);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn test_vintage_warms_neutral_gray() {
        let img = RgbImage::from_pixel(4, 4, Rgb([100, 100, 100]));
        let s = spec(FilterParams {
            vintage: Some(true),
            ..Default::default()
        });
        let px = *FilterPipeline::new().apply(img, &s).get_pixel(0, 0);
        assert!(px[0] > px[2], "sepia should push red above blue: {px:?}");
    }

    #[test]
    fn test_sharpen_increases_edge_contrast() {
        let img = RgbImage::from_fn(10, 10, |x, _| {
            if x < 5 {
                Rgb([100, 100, 100])
            } else {
                Rgb([150, 150, 150])
            }
        });
        let s = spec(FilterParams {
            sharpen: Some(true),
            ..Default::default()
        });
        let out = FilterPipeline::new().apply(img, &s);
        assert!(out.get_pixel(4, 5)[0] < 100);
        assert!(out.get_pixel(5, 5)[0] > 150);
        assert_eq!(out.get_pixel(0, 5)[0], 100);
    }

    #[test]
    fn test_vintage_keeps_legacy_channel_order() {
        let img = RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]));
        let s = spec(FilterParams {
            vintage: Some(true),
            ..Default::default()
        });
        let out = FilterPipeline::new().apply(img, &s);
        assert_eq!(*out.get_pixel(0, 0), Rgb([224, 6, 5]));
    }

    #[test]
    fn test_edge_overlay_adds_weighted_copy() {
        let img = split(40, 40, 100, 200);
        let s = spec(FilterParams {
            edge_detect: Some(true),
            ..Default::default()
        });
        let out = FilterPipeline::new().apply(img.clone(), &s);

        // Away from the boundary every channel gains 35% and saturates
        assert_eq!(*out.get_pixel(2, 20), Rgb([135, 135, 135]));
        assert_eq!(*out.get_pixel(37, 20), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_edge_overlay_adds_green_on_edges() {
        let img = split(40, 40, 0, 200);
        let s = spec(FilterParams {
            edge_detect: Some(true),
            ..Default::default()
        });
        let out = FilterPipeline::new().apply(img, &s);

        assert_eq!(*out.get_pixel(2, 20), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(19, 20), Rgb([0, 89, 0]));
    }

    #[test]
    fn test_edge_overlay_flat_image_brightens_uniformly() {
        let img = RgbImage::from_pixel(20, 20, Rgb([100, 100, 100]));
        let s = spec(FilterParams {
            edge_detect: Some(true),
            ..Default::default()
        });
        let out = FilterPipeline::new().apply(img, &s);
        assert!(out.pixels().all(|px| *px == Rgb([135, 135, 135])));
    }

    struct FixedDetector(Vec<FaceRegion>);

    impl FaceDetector for FixedDetector {
        fn detect(&self, _gray: &GrayImage) -> Vec<FaceRegion> {
            self.0.clone()
        }
    }

    #[test]
    fn test_face_overlay_without_detector_is_noop() {
        let img = gradient(32, 32);
        let s = spec(FilterParams {
            face_detect: Some(true),
            ..Default::default()
        });
        assert_eq!(FilterPipeline::new().apply(img.clone(), &s), img);
    }

    #[test]
    fn test_face_overlay_draws_two_pixel_marker() {
        let img = RgbImage::from_pixel(40, 40, Rgb([10, 10, 10]));
        let detector = Arc::new(FixedDetector(vec![FaceRegion {
            x: 5,
            y: 5,
            width: 20,
            height: 20,
        }]));
        let s = spec(FilterParams {
            face_detect: Some(true),
            ..Default::default()
        });
        let out = FilterPipeline::with_face_detector(detector).apply(img, &s);

        assert_eq!(*out.get_pixel(5, 5), MARKER_COLOR);
        assert_eq!(*out.get_pixel(6, 6), MARKER_COLOR);
        assert_eq!(*out.get_pixel(15, 15), Rgb([10, 10, 10]));
        assert_eq!(*out.get_pixel(0, 0), Rgb([10, 10, 10]));
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let img = gradient(48, 32);
        let s = spec(FilterParams {
            brightness: Some(60),
            contrast: Some(55),
            saturation: Some(70),
            vintage: Some(true),
            sharpen: Some(true),
            blur: Some(3),
            edge_detect: Some(true),
            ..Default::default()
        });
        let pipeline = FilterPipeline::new();
        assert_eq!(pipeline.apply(img.clone(), &s), pipeline.apply(img, &s));
    }
}
