//! Overlay Geometry
//!
//! Maps the detected price box from captured-frame pixels into the pixel
//! space of the on-screen video element. The captured size is fixed per
//! frame but the rendered size follows the viewport, so the mapping is
//! recomputed on every resize and never cached here.

use crate::capture::frame::{Dimensions, PixelBox};

/// Rectangle in displayed-video pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl DisplayBox {
    pub const ZERO: DisplayBox = DisplayBox {
        left: 0.0,
        top: 0.0,
        width: 0.0,
        height: 0.0,
    };

    /// Approximate equality for comparisons after scaling
    pub fn approx_eq(&self, other: &DisplayBox, tolerance: f64) -> bool {
        (self.left - other.left).abs() <= tolerance
            && (self.top - other.top).abs() <= tolerance
            && (self.width - other.width).abs() <= tolerance
            && (self.height - other.height).abs() <= tolerance
    }
}

/// Scale `bbox` from `source` space into `target` space.
///
/// Each axis is scaled on its own. A degenerate source yields a zero box.
pub fn map(bbox: &PixelBox, source: Dimensions, target: Dimensions) -> DisplayBox {
    if source.is_degenerate() {
        return DisplayBox::ZERO;
    }

    let scale_x = target.width / source.width;
    let scale_y = target.height / source.height;

    DisplayBox {
        left: bbox.x0 * scale_x,
        top: bbox.y0 * scale_y,
        width: bbox.width() * scale_x,
        height: bbox.height() * scale_y,
    }
}

/// Inverse of [`map`]: bring a display box back into `source` space
pub fn unmap(display: &DisplayBox, source: Dimensions, target: Dimensions) -> PixelBox {
    if target.is_degenerate() {
        return PixelBox::new(0.0, 0.0, 0.0, 0.0);
    }

    let scale_x = source.width / target.width;
    let scale_y = source.height / target.height;

    PixelBox::from_xywh(
        display.left * scale_x,
        display.top * scale_y,
        display.width * scale_x,
        display.height * scale_y,
    )
}
