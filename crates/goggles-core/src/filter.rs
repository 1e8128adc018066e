//! The two photo filters: grayscale, and glasses aligned to detected eyes.

use crate::detector::Detector;
use crate::grayscale::to_grayscale;
use crate::overlay::{place_overlay, OverlayAsset, OverlayError, OverlayOutput};
use crate::types::{FaceDetection, OverlaySettings};
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

/// Which filter produced an image. Used in saved file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    Original,
    Grayscale,
    Glasses,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Original => "original",
            FilterKind::Grayscale => "grayscale",
            FilterKind::Glasses => "glasses",
        }
    }
}

impl std::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert an image to single-channel luma.
pub fn apply_grayscale(image: &DynamicImage) -> DynamicImage {
    DynamicImage::ImageLuma8(to_grayscale(&image.to_rgba8()))
}

/// Detect faces in the whole frame, then eyes inside each face.
pub fn detect_faces(
    gray: &GrayImage,
    face_detector: &dyn Detector,
    eye_detector: &dyn Detector,
) -> Vec<FaceDetection> {
    face_detector
        .detect(gray, None)
        .into_iter()
        .map(|face| FaceDetection {
            face,
            eyes: eye_detector.detect(gray, Some(face)),
        })
        .collect()
}

/// Glasses filter: detectors, overlay asset and placement settings.
pub struct GlassesFilter {
    face_detector: Box<dyn Detector>,
    eye_detector: Box<dyn Detector>,
    asset: OverlayAsset,
    settings: OverlaySettings,
}

impl GlassesFilter {
    pub fn new(
        face_detector: Box<dyn Detector>,
        eye_detector: Box<dyn Detector>,
        asset: OverlayAsset,
        settings: OverlaySettings,
    ) -> Self {
        Self {
            face_detector,
            eye_detector,
            asset,
            settings,
        }
    }

    /// Faces and eyes found in `image`.
    pub fn detect(&self, image: &DynamicImage) -> Vec<FaceDetection> {
        let gray = to_grayscale(&image.to_rgba8());
        detect_faces(&gray, self.face_detector.as_ref(), self.eye_detector.as_ref())
    }

    /// Detect faces and eyes in `image` and composite the glasses onto them.
    pub fn apply(&self, image: &DynamicImage) -> Result<OverlayOutput, OverlayError> {
        let rgba = image.to_rgba8();
        let gray = to_grayscale(&rgba);
        let faces = detect_faces(&gray, self.face_detector.as_ref(), self.eye_detector.as_ref());
        tracing::info!(faces = faces.len(), "glasses: faces detected");

        let output = place_overlay(&rgba, &faces, &self.asset, &self.settings)?;
        tracing::info!(
            applied = output.applied(),
            skipped = output.skipped(),
            "glasses: overlay placed"
        );
        Ok(output)
    }
}
