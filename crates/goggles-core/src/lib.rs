//! goggles-core: photo filters and eye-aligned overlay placement.
//!
//! Grayscale conversion, Haar cascade face/eye detection behind a
//! pluggable [`Detector`] trait, and the overlay placement that fits a
//! glasses graphic onto each detected pair of eyes.

pub mod cascade;
pub mod detector;
pub mod filter;
pub mod grayscale;
pub mod overlay;
pub mod types;

pub use cascade::{CascadeDetector, CascadeError, HaarCascade};
pub use detector::{DetectionParams, Detector};
pub use filter::{apply_grayscale, detect_faces, FilterKind, GlassesFilter};
pub use overlay::{
    place_overlay, FaceOutcome, OverlayAsset, OverlayError, OverlayOutput, SkipReason,
};
pub use types::{FaceDetection, OverlaySettings, Placement, Point, Rect};
