use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in integer pixel coordinates.
///
/// Coordinates are relative to whatever region produced the rectangle: face
/// rectangles are relative to the full frame, eye rectangles to their face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Exclusive right edge. Widened so edges near `i32::MAX` cannot overflow.
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// True if `other` lies entirely inside `self`.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// True if the rectangle is non-empty and lies inside a `width × height` raster.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        !self.is_empty()
            && self.x >= 0
            && self.y >= 0
            && self.right() <= width as i64
            && self.bottom() <= height as i64
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }
}

/// A 2-D coordinate in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// A detected face together with the eyes found inside it.
///
/// `eyes` are relative to the face rectangle's origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub face: Rect,
    pub eyes: Vec<Rect>,
}

/// Derived overlay geometry for one face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    /// Left eye centre in frame coordinates.
    pub left_eye: Point,
    /// Right eye centre in frame coordinates.
    pub right_eye: Point,
    /// Angle of the left→right eye vector, in degrees.
    pub angle_degrees: f64,
    pub eye_distance: f64,
    /// Overlay width before truncation to whole pixels.
    pub width: f64,
    /// Overlay height before truncation to whole pixels.
    pub height: f64,
    /// Midpoint of the eye centres; the overlay is centred here.
    pub anchor: Point,
}

/// Tunables for overlay placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    /// Overlay width as a multiple of the inter-eye distance.
    pub width_multiplier: f64,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            width_multiplier: 3.0,
        }
    }
}
