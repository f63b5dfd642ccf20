//! Bounding-box model and clamping
//!
//! Detector output is float-valued and may poke outside the image; boxes are
//! corrected into bounds rather than rejected, and only dropped when nothing
//! of them survives clamping.

use image::DynamicImage;

/// A detector-native box: unclamped float coordinates plus confidence.
///
/// Confidence is carried for display and debugging; the pipeline applies no
/// threshold of its own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
    pub confidence: f32,
}

impl RawDetection {
    /// Clamp into `[0, width] x [0, height]` with truncation toward the image
    /// interior. Returns `None` when the clamped region is empty.
    ///
    /// The resulting box never indexes outside an image of the given size.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<PlateBox> {
        let x_min = self.x_min.floor().max(0.0) as u32;
        let y_min = self.y_min.floor().max(0.0) as u32;
        let x_max = self.x_max.floor().min(width as f32).max(0.0) as u32;
        let y_max = self.y_max.floor().min(height as f32).max(0.0) as u32;

        if x_min >= x_max || y_min >= y_max {
            return None;
        }

        Some(PlateBox {
            x_min,
            y_min,
            x_max,
            y_max,
        })
    }
}

/// An axis-aligned plate region in integer pixel coordinates.
///
/// Invariant: `0 <= x_min < x_max <= image width` and likewise for y, for
/// the image the box was clamped against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlateBox {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl PlateBox {
    pub fn width(&self) -> u32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> u32 {
        self.y_max - self.y_min
    }

    /// Crop this region out of the source image.
    pub fn crop_from(&self, image: &DynamicImage) -> DynamicImage {
        image.crop_imm(self.x_min, self.y_min, self.width(), self.height())
    }
}
