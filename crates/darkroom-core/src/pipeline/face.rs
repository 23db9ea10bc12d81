//! Face-region detection for the face overlay filter.

use image::GrayImage;
use std::path::PathBuf;

/// Axis-aligned face bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Something that can find faces in a grayscale raster.
///
/// Detection never fails: a detector that cannot run reports no faces.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, gray: &GrayImage) -> Vec<FaceRegion>;
}

/// SeetaFace frontal cascade via `rustface`.
///
/// The model is loaded on every call so the detector itself holds no
/// non-`Send` state and a model file replaced on disk is picked up.
pub struct SeetaFaceDetector {
    model_path: PathBuf,
    min_face_size: u32,
}

impl SeetaFaceDetector {
    pub fn new(model_path: PathBuf, min_face_size: u32) -> Self {
        Self {
            model_path,
            min_face_size,
        }
    }
}

impl FaceDetector for SeetaFaceDetector {
    fn detect(&self, gray: &GrayImage) -> Vec<FaceRegion> {
        let model_path = self.model_path.to_string_lossy();
        let mut detector = match rustface::create_detector(&model_path) {
            Ok(detector) => detector,
            Err(e) => {
                tracing::debug!("Face model {:?} unavailable, skipping: {}", self.model_path, e);
                return Vec::new();
            }
        };
        detector.set_min_face_size(self.min_face_size);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        let mut data = rustface::ImageData::new(gray.as_raw(), gray.width(), gray.height());
        detector
            .detect(&mut data)
            .into_iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceRegion {
                    x: bbox.x(),
                    y: bbox.y(),
                    width: bbox.width(),
                    height: bbox.height(),
                }
            })
            .collect()
    }
}
