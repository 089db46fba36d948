//! Frame data structures for captured camera content

use std::time::Instant;

use crate::error::MediaAcquisitionError;

/// Width and height of a coordinate space in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

impl Dimensions {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// True when either side is zero, negative or not finite
    pub fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
    }
}

/// Axis-aligned rectangle in frame pixel coordinates.
///
/// Always satisfies `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl PixelBox {
    /// Create a box from two corners, in any order
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Create a box from its top-left corner and size
    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Clamp the box to `[0, width] x [0, height]`
    pub fn clamp_to(&self, dims: Dimensions) -> Self {
        Self::new(
            self.x0.clamp(0.0, dims.width),
            self.y0.clamp(0.0, dims.height),
            self.x1.clamp(0.0, dims.width),
            self.y1.clamp(0.0, dims.height),
        )
    }

    /// Shift the box by an offset
    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x0 + dx, self.y0 + dy, self.x1 + dx, self.y1 + dy)
    }
}

/// A still frame grabbed from the camera stream
#[derive(Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    timestamp: Instant,
}

impl Frame {
    /// Create a frame from raw RGBA pixels
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, MediaAcquisitionError> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(MediaAcquisitionError::Frame(format!(
                "expected {} bytes for {}x{} RGBA, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            timestamp: Instant::now(),
        })
    }

    /// Raw RGBA pixel data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// When the frame was grabbed
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width as f64, self.height as f64)
    }

    pub(crate) fn into_parts(self) -> (Vec<u8>, u32, u32) {
        (self.data, self.width, self.height)
    }
}

/// Binarized copy of a [`Frame`], same size as its source
#[derive(Debug, Clone)]
pub struct PreprocessedFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl PreprocessedFrame {
    pub(crate) fn from_parts(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 4);
        Self {
            data,
            width,
            height,
        }
    }

    /// RGBA pixel data, every color channel is 0 or 255
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width as f64, self.height as f64)
    }
}
