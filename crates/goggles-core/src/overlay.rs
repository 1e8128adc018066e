//! Eye-aligned overlay placement.
//!
//! Given faces with their detected eyes, scales and rotates an overlay asset
//! (a glasses graphic with alpha) so it spans both eyes, centres it on the
//! eye midpoint and alpha-composites it onto a copy of the source raster.

use crate::types::{FaceDetection, OverlaySettings, Placement, Point, Rect};
use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, Rgba, RgbaImage};
use thiserror::Error;

/// Errors that abort a whole `place_overlay` call.
#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("source raster is empty ({width}x{height})")]
    EmptySource { width: u32, height: u32 },
    #[error("overlay asset has no alpha channel (color type {0:?})")]
    MissingAlpha(ColorType),
    #[error("overlay asset is empty")]
    EmptyAsset,
}

/// Why a single face did not receive an overlay.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkipReason {
    #[error("need two eyes, found {found}")]
    TooFewEyes { found: usize },
    #[error("face rectangle lies outside the source raster")]
    FaceOutOfFrame,
    #[error("eye {eye:?} lies outside its face")]
    EyeOutOfFace { eye: Rect },
    #[error("degenerate overlay size {width}x{height}")]
    DegenerateScale { width: i64, height: i64 },
    #[error("overlay destination {destination:?} exceeds the source raster")]
    OutOfBounds { destination: Rect },
    #[error("overlay is {actual:?} but destination is {expected:?}")]
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

/// Result of placing the overlay on one face.
#[derive(Debug, Clone, PartialEq)]
pub enum FaceOutcome {
    Applied {
        placement: Placement,
        destination: Rect,
    },
    Skipped(SkipReason),
}

impl FaceOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, FaceOutcome::Applied { .. })
    }
}

/// Composited raster plus one outcome per input face, in input order.
#[derive(Debug, Clone)]
pub struct OverlayOutput {
    pub image: RgbaImage,
    pub outcomes: Vec<FaceOutcome>,
}

impl OverlayOutput {
    pub fn applied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_applied()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.applied()
    }
}

/// The overlay graphic. Loaded once, never mutated.
#[derive(Debug, Clone)]
pub struct OverlayAsset {
    raster: RgbaImage,
}

impl OverlayAsset {
    /// Wrap a decoded image. The image must carry an alpha channel.
    pub fn new(image: DynamicImage) -> Result<Self, OverlayError> {
        let color = image.color();
        if !color.has_alpha() {
            return Err(OverlayError::MissingAlpha(color));
        }
        Self::from_rgba(image.into_rgba8())
    }

    pub fn from_rgba(raster: RgbaImage) -> Result<Self, OverlayError> {
        if raster.width() == 0 || raster.height() == 0 {
            return Err(OverlayError::EmptyAsset);
        }
        Ok(Self { raster })
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    pub fn raster(&self) -> &RgbaImage {
        &self.raster
    }
}

/// Pick the left and right eye from a face's eye candidates.
///
/// Candidates are ordered by ascending x and the first two are taken. With
/// more than two candidates this is only a heuristic: the detector reports
/// no confidence to rank by.
pub fn select_eye_pair(eyes: &[Rect]) -> Option<(Rect, Rect)> {
    if eyes.len() < 2 {
        return None;
    }
    let mut sorted = eyes.to_vec();
    sorted.sort_by_key(|eye| eye.x);
    Some((sorted[0], sorted[1]))
}

/// Centre of a face-relative eye rectangle, in frame coordinates.
fn eye_center(face: &Rect, eye: &Rect) -> Point {
    let c = eye.center();
    Point::new(face.x as f64 + c.x, face.y as f64 + c.y)
}

/// Compute the overlay geometry for one face.
///
/// `left` and `right` are relative to `face`; the result is in frame coordinates.
pub fn compute_placement(
    face: &Rect,
    left: &Rect,
    right: &Rect,
    asset_width: u32,
    asset_height: u32,
    settings: &OverlaySettings,
) -> Placement {
    let left_eye = eye_center(face, left);
    let right_eye = eye_center(face, right);

    let angle_degrees = (right_eye.y - left_eye.y)
        .atan2(right_eye.x - left_eye.x)
        .to_degrees();
    let eye_distance = left_eye.distance(&right_eye);

    let width = eye_distance * settings.width_multiplier;
    let height = width * asset_height as f64 / asset_width as f64;

    Placement {
        left_eye,
        right_eye,
        angle_degrees,
        eye_distance,
        width,
        height,
        anchor: left_eye.midpoint(&right_eye),
    }
}

/// Destination rectangle for an overlay of `width × height` centred on `anchor`.
///
/// The half extent uses integer division and the origin truncates toward zero.
fn destination_origin(anchor: &Point, width: i64, height: i64) -> (i64, i64) {
    let x = (anchor.x - (width / 2) as f64) as i64;
    let y = (anchor.y - (height / 2) as f64) as i64;
    (x, y)
}

/// Resize the asset to `width × height` with bilinear filtering.
pub fn scale_overlay(asset: &OverlayAsset, width: u32, height: u32) -> RgbaImage {
    imageops::resize(asset.raster(), width, height, FilterType::Triangle)
}

/// Rotate a raster about its centre by `angle_degrees`, keeping its size.
///
/// A positive angle turns the +x axis toward +y (image coordinates, y down),
/// so the overlay's horizontal follows the left→right eye vector. Samples
/// outside the source are fully transparent. Bilinear interpolation.
pub fn rotate_about_center(src: &RgbaImage, angle_degrees: f64) -> RgbaImage {
    let (width, height) = src.dimensions();
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    let (sin, cos) = angle_degrees.to_radians().sin_cos();

    let sample = |x: i64, y: i64| -> [f32; 4] {
        if x >= 0 && x < width as i64 && y >= 0 && y < height as i64 {
            let p = src.get_pixel(x as u32, y as u32).0;
            [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
        } else {
            [0.0; 4]
        }
    };

    let mut output = RgbaImage::new(width, height);

    for (ox, oy, pixel) in output.enumerate_pixels_mut() {
        // Inverse map: src = centre + R(-angle) * (dst - centre)
        let dx = ox as f64 - cx;
        let dy = oy as f64 - cy;
        let sx = cx + cos * dx + sin * dy;
        let sy = cy - sin * dx + cos * dy;

        let x0 = sx.floor() as i64;
        let y0 = sy.floor() as i64;
        let fx = (sx - x0 as f64) as f32;
        let fy = (sy - y0 as f64) as f32;

        let tl = sample(x0, y0);
        let tr = sample(x0 + 1, y0);
        let bl = sample(x0, y0 + 1);
        let br = sample(x0 + 1, y0 + 1);

        let mut out = [0u8; 4];
        for c in 0..4 {
            let val = tl[c] * (1.0 - fx) * (1.0 - fy)
                + tr[c] * fx * (1.0 - fy)
                + bl[c] * (1.0 - fx) * fy
                + br[c] * fx * fy;
            out[c] = val.round().clamp(0.0, 255.0) as u8;
        }
        *pixel = Rgba(out);
    }

    output
}

/// Source-over blend of one channel, weighted by `alpha`.
///
/// Exact at the endpoints: alpha 0 returns `dst`, alpha 255 returns `src`.
fn blend_channel(src: u8, dst: u8, alpha: u8) -> u8 {
    let a = alpha as u32;
    ((src as u32 * a + dst as u32 * (255 - a) + 127) / 255) as u8
}

/// Alpha-composite `src` onto `dest` at `destination`.
///
/// Nothing is written unless `destination` lies fully inside `dest` and
/// matches the size of `src`.
pub fn composite_over(
    dest: &mut RgbaImage,
    src: &RgbaImage,
    destination: Rect,
) -> Result<(), SkipReason> {
    if !destination.fits_within(dest.width(), dest.height()) {
        return Err(SkipReason::OutOfBounds { destination });
    }
    let expected = (destination.width as u32, destination.height as u32);
    if src.dimensions() != expected {
        return Err(SkipReason::SizeMismatch {
            expected,
            actual: src.dimensions(),
        });
    }

    let (ox, oy) = (destination.x as u32, destination.y as u32);
    for (x, y, overlay) in src.enumerate_pixels() {
        let alpha = overlay[3];
        if alpha == 0 {
            continue;
        }
        let target = dest.get_pixel_mut(ox + x, oy + y);
        let [dr, dg, db, da] = target.0;
        *target = Rgba([
            blend_channel(overlay[0], dr, alpha),
            blend_channel(overlay[1], dg, alpha),
            blend_channel(overlay[2], db, alpha),
            blend_channel(u8::MAX, da, alpha),
        ]);
    }
    Ok(())
}

/// Place the overlay on a single face, writing into `canvas` only on success.
fn place_face(
    canvas: &mut RgbaImage,
    detection: &FaceDetection,
    asset: &OverlayAsset,
    settings: &OverlaySettings,
) -> FaceOutcome {
    if !detection.face.fits_within(canvas.width(), canvas.height()) {
        return FaceOutcome::Skipped(SkipReason::FaceOutOfFrame);
    }

    let Some((left, right)) = select_eye_pair(&detection.eyes) else {
        return FaceOutcome::Skipped(SkipReason::TooFewEyes {
            found: detection.eyes.len(),
        });
    };

    let face_area = Rect::new(0, 0, detection.face.width, detection.face.height);
    if let Some(eye) = [left, right].into_iter().find(|e| !face_area.contains_rect(e)) {
        return FaceOutcome::Skipped(SkipReason::EyeOutOfFace { eye });
    }

    let placement = compute_placement(
        &detection.face,
        &left,
        &right,
        asset.width(),
        asset.height(),
        settings,
    );

    // `as` saturates and maps NaN to 0, which the degenerate check catches.
    let width = placement.width as i64;
    let height = placement.height as i64;
    if width <= 0 || height <= 0 {
        return FaceOutcome::Skipped(SkipReason::DegenerateScale { width, height });
    }

    // Rotation keeps the raster size, so the destination is known before
    // any resampling happens.
    let (x, y) = destination_origin(&placement.anchor, width, height);
    let fits = x >= 0
        && y >= 0
        && x + width <= canvas.width() as i64
        && y + height <= canvas.height() as i64;
    if !fits {
        let clamp = |v: i64| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        return FaceOutcome::Skipped(SkipReason::OutOfBounds {
            destination: Rect::new(clamp(x), clamp(y), clamp(width), clamp(height)),
        });
    }
    let destination = Rect::new(x as i32, y as i32, width as i32, height as i32);

    let scaled = scale_overlay(asset, width as u32, height as u32);
    let rotated = rotate_about_center(&scaled, placement.angle_degrees);

    match composite_over(canvas, &rotated, destination) {
        Ok(()) => FaceOutcome::Applied {
            placement,
            destination,
        },
        Err(reason) => FaceOutcome::Skipped(reason),
    }
}

/// Composite the overlay onto every qualifying face of `source`.
///
/// Returns a new raster; `source` is never modified. Faces that cannot take
/// an overlay are skipped and reported in [`OverlayOutput::outcomes`]. If no
/// face qualifies the output equals the input.
pub fn place_overlay(
    source: &RgbaImage,
    faces: &[FaceDetection],
    asset: &OverlayAsset,
    settings: &OverlaySettings,
) -> Result<OverlayOutput, OverlayError> {
    if source.width() == 0 || source.height() == 0 {
        return Err(OverlayError::EmptySource {
            width: source.width(),
            height: source.height(),
        });
    }

    let mut canvas = source.clone();
    let mut outcomes = Vec::with_capacity(faces.len());

    for detection in faces {
        let outcome = place_face(&mut canvas, detection, asset, settings);
        match &outcome {
            FaceOutcome::Applied {
                placement,
                destination,
            } => tracing::debug!(
                face = ?detection.face,
                angle = placement.angle_degrees,
                eye_distance = placement.eye_distance,
                destination = ?destination,
                "overlay applied"
            ),
            FaceOutcome::Skipped(reason) => tracing::debug!(
                face = ?detection.face,
                %reason,
                "overlay skipped"
            ),
        }
        outcomes.push(outcome);
    }

    Ok(OverlayOutput {
        image: canvas,
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid_asset(width: u32, height: u32, color: [u8; 4]) -> OverlayAsset {
        OverlayAsset::from_rgba(RgbaImage::from_pixel(width, height, Rgba(color))).unwrap()
    }

    /// Gradient source so that any write is detectable.
    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 251) as u8, (y % 241) as u8, ((x + y) % 239) as u8, 255])
        })
    }

    /// Face at (80, 80) with eye centres at frame (100, 100) and (140, 100).
    fn level_face() -> FaceDetection {
        FaceDetection {
            face: Rect::new(80, 80, 80, 80),
            eyes: vec![Rect::new(15, 15, 10, 10), Rect::new(55, 15, 10, 10)],
        }
    }

    #[test]
    fn test_select_eye_pair_needs_two() {
        assert!(select_eye_pair(&[]).is_none());
        assert!(select_eye_pair(&[Rect::new(0, 0, 5, 5)]).is_none());
    }

    #[test]
    fn test_select_eye_pair_sorts_by_x() {
        let eyes = [
            Rect::new(50, 10, 10, 10),
            Rect::new(5, 12, 10, 10),
            Rect::new(30, 40, 10, 10),
        ];
        let (left, right) = select_eye_pair(&eyes).unwrap();
        assert_eq!(left.x, 5);
        assert_eq!(right.x, 30);
    }

    #[test]
    fn test_select_eye_pair_ties_keep_input_order() {
        let eyes = [Rect::new(10, 1, 4, 4), Rect::new(10, 2, 4, 4), Rect::new(10, 3, 4, 4)];
        let (left, right) = select_eye_pair(&eyes).unwrap();
        assert_eq!(left.y, 1);
        assert_eq!(right.y, 2);
    }

    #[test]
    fn test_placement_known_geometry() {
        let face = level_face();
        let p = compute_placement(
            &face.face,
            &face.eyes[0],
            &face.eyes[1],
            200,
            100,
            &OverlaySettings::default(),
        );
        assert_eq!(p.left_eye, Point::new(100.0, 100.0));
        assert_eq!(p.right_eye, Point::new(140.0, 100.0));
        assert!((p.eye_distance - 40.0).abs() < 1e-9);
        assert!((p.width - 120.0).abs() < 1e-9);
        assert!((p.height - 60.0).abs() < 1e-9);
        assert_eq!(p.angle_degrees, 0.0);
        assert_eq!(p.anchor, Point::new(120.0, 100.0));
    }

    #[test]
    fn test_placement_angle_follows_tilt() {
        let face = Rect::new(0, 0, 100, 100);
        // Right eye 40 px right and 40 px lower.
        let p = compute_placement(
            &face,
            &Rect::new(10, 10, 10, 10),
            &Rect::new(50, 50, 10, 10),
            10,
            10,
            &OverlaySettings::default(),
        );
        assert!((p.angle_degrees - 45.0).abs() < 1e-9);

        // Right eye higher than the left eye gives a negative angle.
        let p = compute_placement(
            &face,
            &Rect::new(10, 50, 10, 10),
            &Rect::new(50, 10, 10, 10),
            10,
            10,
            &OverlaySettings::default(),
        );
        assert!((p.angle_degrees + 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_placement_width_multiplier_is_configurable() {
        let face = level_face();
        let settings = OverlaySettings {
            width_multiplier: 2.0,
        };
        let p = compute_placement(&face.face, &face.eyes[0], &face.eyes[1], 100, 50, &settings);
        assert!((p.width - 80.0).abs() < 1e-9);
        assert!((p.height - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_rotate_zero_is_identity() {
        let src = gradient(31, 17);
        assert_eq!(rotate_about_center(&src, 0.0), src);
    }

    #[test]
    fn test_rotate_fills_transparent() {
        let src = RgbaImage::from_pixel(40, 10, Rgba([255, 255, 255, 255]));
        let out = rotate_about_center(&src, 90.0);
        assert_eq!(out.dimensions(), (40, 10));
        // Corners of a wide strip rotated by 90 degrees come from outside the source.
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(out.get_pixel(39, 9).0, [0, 0, 0, 0]);
        // The centre stays opaque.
        assert_eq!(out.get_pixel(20, 5)[3], 255);
    }

    #[test]
    fn test_rotate_direction_turns_x_toward_y() {
        // A bright pixel right of centre must land below centre at +90 degrees.
        let mut src = RgbaImage::new(20, 20);
        src.put_pixel(15, 10, Rgba([255, 0, 0, 255]));
        let out = rotate_about_center(&src, 90.0);
        let below = out.get_pixel(10, 15)[3];
        let above = out.get_pixel(10, 5)[3];
        assert!(below > 100, "expected pixel below centre, alpha={below}");
        assert_eq!(above, 0);
    }

    #[test]
    fn test_composite_zero_alpha_is_noop() {
        let mut dest = gradient(50, 50);
        let before = dest.clone();
        let src = RgbaImage::from_pixel(20, 20, Rgba([9, 9, 9, 0]));
        composite_over(&mut dest, &src, Rect::new(10, 10, 20, 20)).unwrap();
        assert_eq!(dest, before);
    }

    #[test]
    fn test_composite_full_alpha_replaces() {
        let mut dest = gradient(50, 50);
        let src = gradient(20, 20);
        composite_over(&mut dest, &src, Rect::new(5, 7, 20, 20)).unwrap();
        for (x, y, p) in src.enumerate_pixels() {
            assert_eq!(dest.get_pixel(5 + x, 7 + y), p);
        }
        // Outside the rectangle nothing changes.
        assert_eq!(dest.get_pixel(0, 0), gradient(50, 50).get_pixel(0, 0));
    }

    #[test]
    fn test_composite_half_alpha_blends() {
        let mut dest = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let src = RgbaImage::from_pixel(2, 2, Rgba([200, 100, 50, 128]));
        composite_over(&mut dest, &src, Rect::new(1, 1, 2, 2)).unwrap();
        // (200 * 128 + 127) / 255 = 100
        assert_eq!(dest.get_pixel(1, 1).0, [100, 50, 25, 255]);
    }

    #[test]
    fn test_composite_rejects_out_of_bounds() {
        let mut dest = gradient(20, 20);
        let before = dest.clone();
        let src = RgbaImage::from_pixel(10, 10, Rgba([1, 2, 3, 255]));
        let err = composite_over(&mut dest, &src, Rect::new(15, 0, 10, 10)).unwrap_err();
        assert!(matches!(err, SkipReason::OutOfBounds { .. }));
        let err = composite_over(&mut dest, &src, Rect::new(-1, 0, 10, 10)).unwrap_err();
        assert!(matches!(err, SkipReason::OutOfBounds { .. }));
        assert_eq!(dest, before);
    }

    #[test]
    fn test_composite_rejects_size_mismatch() {
        let mut dest = gradient(20, 20);
        let src = RgbaImage::new(5, 5);
        let err = composite_over(&mut dest, &src, Rect::new(0, 0, 6, 5)).unwrap_err();
        assert!(matches!(err, SkipReason::SizeMismatch { .. }));
    }

    #[test]
    fn test_place_overlay_too_few_eyes_is_noop() {
        let source = gradient(300, 300);
        let asset = solid_asset(40, 20, [255, 0, 0, 255]);
        let faces = vec![
            FaceDetection {
                face: Rect::new(80, 80, 80, 80),
                eyes: vec![],
            },
            FaceDetection {
                face: Rect::new(80, 80, 80, 80),
                eyes: vec![Rect::new(10, 10, 10, 10)],
            },
        ];
        let out = place_overlay(&source, &faces, &asset, &OverlaySettings::default()).unwrap();
        assert_eq!(out.image, source);
        assert_eq!(
            out.outcomes,
            vec![
                FaceOutcome::Skipped(SkipReason::TooFewEyes { found: 0 }),
                FaceOutcome::Skipped(SkipReason::TooFewEyes { found: 1 }),
            ]
        );
    }

    #[test]
    fn test_place_overlay_opaque_asset_covers_destination() {
        let source = gradient(300, 300);
        let asset = solid_asset(40, 20, [255, 0, 0, 255]);
        let out = place_overlay(&source, &[level_face()], &asset, &OverlaySettings::default())
            .unwrap();

        assert_eq!(out.applied(), 1);
        let FaceOutcome::Applied { destination, .. } = &out.outcomes[0] else {
            panic!("expected overlay to be applied: {:?}", out.outcomes[0]);
        };
        // 120 x 60 centred on (120, 100)
        assert_eq!(*destination, Rect::new(60, 70, 120, 60));
        for y in 70..130 {
            for x in 60..180 {
                assert_eq!(out.image.get_pixel(x, y).0, [255, 0, 0, 255], "({x}, {y})");
            }
        }
        assert_eq!(out.image.get_pixel(59, 70), source.get_pixel(59, 70));
        assert_eq!(out.image.get_pixel(60, 130), source.get_pixel(60, 130));
    }

    #[test]
    fn test_place_overlay_transparent_asset_is_noop() {
        let source = gradient(300, 300);
        let asset = solid_asset(40, 20, [255, 0, 0, 0]);
        let out = place_overlay(&source, &[level_face()], &asset, &OverlaySettings::default())
            .unwrap();
        assert_eq!(out.applied(), 1);
        assert_eq!(out.image, source);
    }

    #[test]
    fn test_place_overlay_out_of_bounds_skips() {
        // The 120 px overlay would start at x = -20.
        let source = gradient(300, 300);
        let asset = solid_asset(40, 20, [255, 0, 0, 255]);
        let face = FaceDetection {
            face: Rect::new(0, 80, 80, 80),
            eyes: vec![Rect::new(15, 15, 10, 10), Rect::new(55, 15, 10, 10)],
        };
        let out = place_overlay(&source, &[face], &asset, &OverlaySettings::default()).unwrap();
        assert_eq!(out.image, source);
        assert!(matches!(
            out.outcomes[0],
            FaceOutcome::Skipped(SkipReason::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_place_overlay_face_out_of_frame_skips() {
        let source = gradient(100, 100);
        let asset = solid_asset(4, 2, [255, 0, 0, 255]);
        let face = FaceDetection {
            face: Rect::new(60, 60, 80, 80),
            eyes: vec![Rect::new(1, 1, 2, 2), Rect::new(5, 1, 2, 2)],
        };
        let out = place_overlay(&source, &[face], &asset, &OverlaySettings::default()).unwrap();
        assert_eq!(out.outcomes[0], FaceOutcome::Skipped(SkipReason::FaceOutOfFrame));
        assert_eq!(out.image, source);
    }

    #[test]
    fn test_place_overlay_eye_outside_face_skips() {
        let source = gradient(300, 300);
        let asset = solid_asset(40, 20, [255, 0, 0, 255]);
        let face = FaceDetection {
            face: Rect::new(150, 150, 40, 40),
            eyes: vec![Rect::new(-20, 5, 10, 10), Rect::new(45, 5, 10, 10)],
        };
        let out = place_overlay(&source, &[face], &asset, &OverlaySettings::default()).unwrap();
        assert_eq!(
            out.outcomes[0],
            FaceOutcome::Skipped(SkipReason::EyeOutOfFace {
                eye: Rect::new(-20, 5, 10, 10)
            })
        );
        assert_eq!(out.image, source);
    }

    #[test]
    fn test_place_overlay_rects_near_i32_max_skip() {
        let source = gradient(300, 300);
        let asset = solid_asset(40, 20, [255, 0, 0, 255]);
        let far = Rect::new(i32::MAX - 5, 0, 10, 10);
        let faces = vec![
            FaceDetection {
                face: far,
                eyes: vec![],
            },
            FaceDetection {
                face: Rect::new(80, 80, 80, 80),
                eyes: vec![Rect::new(15, 15, 10, 10), far],
            },
        ];
        let out = place_overlay(&source, &faces, &asset, &OverlaySettings::default()).unwrap();
        assert_eq!(
            out.outcomes,
            vec![
                FaceOutcome::Skipped(SkipReason::FaceOutOfFrame),
                FaceOutcome::Skipped(SkipReason::EyeOutOfFace { eye: far }),
            ]
        );
        assert_eq!(out.image, source);
    }

    #[test]
    fn test_place_overlay_degenerate_scale_skips() {
        let source = gradient(100, 100);
        let asset = solid_asset(40, 20, [255, 0, 0, 255]);
        // Identical eye rectangles: zero distance.
        let face = FaceDetection {
            face: Rect::new(10, 10, 50, 50),
            eyes: vec![Rect::new(5, 5, 10, 10), Rect::new(5, 5, 10, 10)],
        };
        let out = place_overlay(&source, &[face], &asset, &OverlaySettings::default()).unwrap();
        assert_eq!(
            out.outcomes[0],
            FaceOutcome::Skipped(SkipReason::DegenerateScale { width: 0, height: 0 })
        );
    }

    #[test]
    fn test_place_overlay_skip_does_not_block_other_faces() {
        let source = gradient(300, 300);
        let asset = solid_asset(40, 20, [0, 255, 0, 255]);
        let faces = vec![
            FaceDetection {
                face: Rect::new(0, 0, 40, 40),
                eyes: vec![Rect::new(1, 1, 4, 4)],
            },
            level_face(),
        ];
        let out = place_overlay(&source, &faces, &asset, &OverlaySettings::default()).unwrap();
        assert_eq!(out.applied(), 1);
        assert_eq!(out.skipped(), 1);
        assert!(out.outcomes[1].is_applied());
    }

    #[test]
    fn test_place_overlay_is_deterministic() {
        let source = gradient(300, 300);
        let asset = OverlayAsset::from_rgba(RgbaImage::from_fn(64, 24, |x, y| {
            Rgba([x as u8 * 4, y as u8 * 10, 77, ((x * y) % 256) as u8])
        }))
        .unwrap();
        let face = FaceDetection {
            face: Rect::new(70, 70, 120, 120),
            eyes: vec![Rect::new(20, 30, 14, 12), Rect::new(70, 38, 16, 14)],
        };
        let settings = OverlaySettings::default();
        let a = place_overlay(&source, &[face.clone()], &asset, &settings).unwrap();
        let b = place_overlay(&source, &[face], &asset, &settings).unwrap();
        assert_eq!(a.image.as_raw(), b.image.as_raw());
        assert_eq!(a.outcomes, b.outcomes);
    }

    #[test]
    fn test_place_overlay_empty_source_fails() {
        let asset = solid_asset(4, 2, [0, 0, 0, 255]);
        let err = place_overlay(&RgbaImage::new(0, 10), &[], &asset, &OverlaySettings::default())
            .unwrap_err();
        assert!(matches!(err, OverlayError::EmptySource { .. }));
    }

    #[test]
    fn test_asset_requires_alpha() {
        let rgb = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])));
        assert!(matches!(
            OverlayAsset::new(rgb),
            Err(OverlayError::MissingAlpha(_))
        ));
        let rgba = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
        assert!(OverlayAsset::new(rgba).is_ok());
        assert!(matches!(
            OverlayAsset::from_rgba(RgbaImage::new(0, 4)),
            Err(OverlayError::EmptyAsset)
        ));
    }
}
