// THEORY:
// The `frame` module holds the "dumb" data containers that flow between the
// stages of the detector. Nothing here knows how it was produced or what will
// consume it.
//
// - `Frame` is an 8-bit RGB image straight from the camera. It is never
//   mutated after capture; the overlay stage copies it before drawing.
// - `Mask` is an 8-bit single channel image. The background model writes 0
//   (background), 127 (shadow) or 255 (foreground) into it; the classifier
//   turns it into a strictly binary image.
// - `MotionVerdict` is the per-cycle answer: was there motion, and where.

use image::{GrayImage, RgbImage};
use imageproc::rect::Rect;

/// A captured camera frame (height x width x 3 channels, 8-bit).
pub type Frame = RgbImage;

/// A single channel foreground mask.
pub type Mask = GrayImage;

/// An axis-aligned box in pixel coordinates. `width`/`height` count pixels,
/// so a single-pixel region has a size of 1x1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn right(&self) -> u32 {
        self.x + self.width - 1
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height - 1
    }

    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.x <= other.x
            && self.y <= other.y
            && self.right() >= other.right()
            && self.bottom() >= other.bottom()
    }

    /// Converts into the drawing rectangle used by `imageproc`.
    pub fn to_rect(&self) -> Rect {
        Rect::at(self.x as i32, self.y as i32).of_size(self.width.max(1), self.height.max(1))
    }
}

/// One surviving motion contour.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionRegion {
    /// The box that encloses the contour.
    pub bounding_box: BoundingBox,
    /// The area enclosed by the contour polyline (shoelace formula).
    pub area: f64,
    /// The simplified outer boundary; only corner points are kept.
    pub outline: Vec<(i32, i32)>,
}

/// The per-cycle output of the motion classifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotionVerdict {
    pub is_motion: bool,
    /// Regions in contour discovery order (top-to-bottom, left-to-right).
    pub regions: Vec<MotionRegion>,
}

impl MotionVerdict {
    pub fn from_regions(regions: Vec<MotionRegion>) -> Self {
        Self {
            is_motion: !regions.is_empty(),
            regions,
        }
    }

    pub fn bounding_boxes(&self) -> impl Iterator<Item = &BoundingBox> {
        self.regions.iter().map(|r| &r.bounding_box)
    }
}
