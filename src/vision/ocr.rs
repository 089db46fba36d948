//! OCR (Optical Character Recognition) module
//!
//! A fresh engine is created for every recognition call and dropped when the
//! call ends, so no dictionary or variable state leaks between sessions.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::capture::frame::{Dimensions, PixelBox, PreprocessedFrame};
use crate::config::{CaptureSettings, OcrSettings};
use crate::error::RecognitionError;

/// Digits, separators and the supported currency symbols
pub const DEFAULT_WHITELIST: &str = "0123456789.,₱$€£¥";

/// Tesseract page segmentation mode: a single uniform block of text
pub const PSM_SINGLE_BLOCK: u32 = 6;

/// Tesseract engine mode: LSTM neural net only
pub const OEM_LSTM_ONLY: u32 = 1;

/// Engine configuration passed to every new engine
#[derive(Debug, Clone, PartialEq)]
pub struct OcrParams {
    pub language: String,
    pub tessdata_path: Option<std::path::PathBuf>,
    pub whitelist: String,
    pub page_seg_mode: u32,
    pub engine_mode: u32,
    pub preserve_interword_spaces: bool,
}

impl Default for OcrParams {
    fn default() -> Self {
        Self::from_settings(&OcrSettings::default())
    }
}

impl OcrParams {
    pub fn from_settings(settings: &OcrSettings) -> Self {
        Self {
            language: settings.language.clone(),
            tessdata_path: settings.tessdata_path.clone(),
            whitelist: settings.whitelist.clone(),
            page_seg_mode: PSM_SINGLE_BLOCK,
            engine_mode: OEM_LSTM_ONLY,
            preserve_interword_spaces: true,
        }
    }
}

/// One recognized word
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    /// Position in preprocessed-frame pixels
    pub bbox: PixelBox,
}

/// Everything the engine read from a frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecognitionResult {
    /// Full text as joined by the engine
    pub text: String,
    /// Words in reading order
    pub tokens: Vec<Token>,
}

/// A configured OCR engine, used for exactly one recognition
pub trait OcrEngine: Send {
    /// Read text inside `roi`. Token boxes must be in `frame` coordinates.
    fn recognize(
        &mut self,
        frame: &PreprocessedFrame,
        roi: PixelBox,
    ) -> Result<RecognitionResult, RecognitionError>;
}

/// Creates engines on demand
pub trait OcrEngineFactory: Send + Sync {
    fn create(&self, params: &OcrParams) -> Result<Box<dyn OcrEngine>, RecognitionError>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Region of interest as fractions of the frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionOfInterest {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for RegionOfInterest {
    fn default() -> Self {
        Self::from_settings(&CaptureSettings::default())
    }
}

impl RegionOfInterest {
    pub fn from_settings(settings: &CaptureSettings) -> Self {
        Self {
            left: settings.roi_left,
            top: settings.roi_top,
            width: settings.roi_width,
            height: settings.roi_height,
        }
    }

    /// Pixel rectangle for a frame of the given size, clamped to the frame
    pub fn to_pixels(&self, dims: Dimensions) -> PixelBox {
        PixelBox::from_xywh(
            (dims.width * self.left).round(),
            (dims.height * self.top).round(),
            (dims.width * self.width).round(),
            (dims.height * self.height).round(),
        )
        .clamp_to(dims)
    }
}

/// Runs OCR over a region of a preprocessed frame
#[derive(Clone)]
pub struct TextRecognizer {
    factory: Arc<dyn OcrEngineFactory>,
    params: OcrParams,
    roi: RegionOfInterest,
}

impl TextRecognizer {
    pub fn new(factory: Arc<dyn OcrEngineFactory>, params: OcrParams) -> Self {
        Self {
            factory,
            params,
            roi: RegionOfInterest::default(),
        }
    }

    pub fn with_region(mut self, roi: RegionOfInterest) -> Self {
        self.roi = roi;
        self
    }

    pub fn params(&self) -> &OcrParams {
        &self.params
    }

    /// Default pixel region for a frame
    pub fn region_for(&self, frame: &PreprocessedFrame) -> PixelBox {
        self.roi.to_pixels(frame.dimensions())
    }

    /// Recognize text inside `roi`.
    ///
    /// The engine runs on the blocking pool. If `cancel` fires first the
    /// call returns [`RecognitionError::Aborted`]; the engine still finishes
    /// in the background and is dropped there.
    pub async fn recognize(
        &self,
        frame: PreprocessedFrame,
        roi: PixelBox,
        cancel: &CancellationToken,
    ) -> Result<RecognitionResult, RecognitionError> {
        if cancel.is_cancelled() {
            return Err(RecognitionError::Aborted);
        }

        let roi = roi.clamp_to(frame.dimensions());
        if roi.is_empty() {
            warn!("Empty region of interest, skipping OCR");
            return Ok(RecognitionResult::default());
        }

        let factory = self.factory.clone();
        let params = self.params.clone();
        let start = Instant::now();

        let task = tokio::task::spawn_blocking(move || {
            let mut engine = factory.create(&params)?;
            engine.recognize(&frame, roi)
        });

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("OCR cancelled after {:?}", start.elapsed());
                return Err(RecognitionError::Aborted);
            }
            joined = task => joined
                .map_err(|e| RecognitionError::Engine(format!("OCR task failed: {e}")))??,
        };

        debug!(
            "OCR ({}) finished in {:?}: {} tokens, text {:?}",
            self.factory.name(),
            start.elapsed(),
            result.tokens.len(),
            result.text
        );

        Ok(result)
    }
}
