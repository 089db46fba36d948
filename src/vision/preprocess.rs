//! Image preprocessing for OCR
//!
//! Turns a camera frame into high-contrast black and white pixels. The OCR
//! engine only needs digit and currency-symbol shapes, so gray levels are
//! thrown away.

use tracing::debug;

use crate::capture::frame::{Frame, PreprocessedFrame};
use crate::config::PreprocessSettings;

/// Converts frames into a binarized form for recognition
#[derive(Debug, Clone)]
pub struct FramePreprocessor {
    contrast: f32,
    threshold: f32,
}

impl Default for FramePreprocessor {
    fn default() -> Self {
        Self::new(&PreprocessSettings::default())
    }
}

impl FramePreprocessor {
    pub fn new(settings: &PreprocessSettings) -> Self {
        Self {
            contrast: settings.contrast,
            threshold: settings.threshold,
        }
    }

    /// Produce a binarized copy of `frame`
    pub fn preprocess(&self, frame: &Frame) -> PreprocessedFrame {
        let mut data = frame.data().to_vec();
        self.preprocess_in_place(&mut data);
        debug!(
            "Preprocessed {}x{} frame (contrast={}, threshold={})",
            frame.width(),
            frame.height(),
            self.contrast,
            self.threshold
        );
        PreprocessedFrame::from_parts(data, frame.width(), frame.height())
    }

    /// Same as [`preprocess`](Self::preprocess) but consumes the frame and
    /// reuses its buffer
    pub fn preprocess_owned(&self, frame: Frame) -> PreprocessedFrame {
        let (mut data, width, height) = frame.into_parts();
        self.preprocess_in_place(&mut data);
        PreprocessedFrame::from_parts(data, width, height)
    }

    /// Binarize RGBA data in place. Alpha is left untouched.
    pub fn preprocess_in_place(&self, data: &mut [u8]) {
        let factor = contrast_factor(self.contrast);
        for chunk in data.chunks_exact_mut(4) {
            let gray = luma(chunk[0], chunk[1], chunk[2]);
            let adjusted = factor * (gray - 128.0) + 128.0;
            let value = if adjusted > self.threshold { 255 } else { 0 };
            chunk[0] = value;
            chunk[1] = value;
            chunk[2] = value;
        }
    }
}

/// Standard luminance weights
fn luma(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Contrast correction factor for a contrast level `c`
fn contrast_factor(c: f32) -> f32 {
    (259.0 * (c + 255.0)) / (255.0 * (259.0 - c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_from(pixels: &[[u8; 4]]) -> Frame {
        let data = pixels.iter().flatten().copied().collect();
        Frame::new(data, pixels.len() as u32, 1).unwrap()
    }

    #[test]
    fn test_contrast_factor() {
        // C = 1.5 is a very mild boost
        let f = contrast_factor(1.5);
        assert!((f - 1.0117).abs() < 0.001);
        assert!((contrast_factor(0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_outputs_are_binary() {
        let mut pixels = Vec::new();
        for r in (0..=255u16).step_by(17) {
            for g in (0..=255u16).step_by(51) {
                for b in (0..=255u16).step_by(85) {
                    pixels.push([r as u8, g as u8, b as u8, 200]);
                }
            }
        }
        let out = FramePreprocessor::default().preprocess(&frame_from(&pixels));

        for chunk in out.data().chunks_exact(4) {
            assert!(chunk[0] == 0 || chunk[0] == 255);
            assert_eq!(chunk[0], chunk[1]);
            assert_eq!(chunk[1], chunk[2]);
            assert_eq!(chunk[3], 200); // alpha unchanged
        }
    }

    #[test]
    fn test_threshold_split() {
        let out = FramePreprocessor::default().preprocess(&frame_from(&[
            [255, 255, 255, 255],
            [0, 0, 0, 255],
            [120, 120, 120, 255],
            [140, 140, 140, 255],
        ]));
        let px: Vec<u8> = out.data().chunks_exact(4).map(|c| c[0]).collect();
        assert_eq!(px, vec![255, 0, 0, 255]);
    }

    #[test]
    fn test_red_is_dark() {
        // luma(255, 0, 0) ~= 76
        let out = FramePreprocessor::default().preprocess(&frame_from(&[[255, 0, 0, 255]]));
        assert_eq!(&out.data()[..3], &[0, 0, 0]);
    }

    #[test]
    fn test_idempotent() {
        let pre = FramePreprocessor::default();
        let once = pre.preprocess(&frame_from(&[
            [12, 200, 90, 255],
            [250, 250, 10, 255],
            [60, 60, 60, 0],
        ]));
        let again = pre.preprocess(&Frame::new(once.data().to_vec(), 3, 1).unwrap());
        assert_eq!(once.data(), again.data());
    }

    #[test]
    fn test_dimensions_preserved() {
        let frame = Frame::new(vec![90; 5 * 3 * 4], 5, 3).unwrap();
        let out = FramePreprocessor::default().preprocess_owned(frame);
        assert_eq!((out.width(), out.height()), (5, 3));
        assert_eq!(out.data().len(), 5 * 3 * 4);
    }
}
