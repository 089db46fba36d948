//! Vision Layer
//!
//! Turns a captured frame into a detected price:
//! - Contrast stretch and binarization ([`preprocess`])
//! - Text recognition behind a pluggable engine ([`ocr`])
//! - Tesseract backend, behind the `tesseract` feature
//! - Price pattern matching and token association ([`price`])

pub mod ocr;
pub mod preprocess;
pub mod price;
#[cfg(feature = "tesseract")]
pub mod tesseract;

pub use ocr::{OcrEngine, OcrEngineFactory, OcrParams, RecognitionResult, TextRecognizer, Token};
pub use preprocess::FramePreprocessor;
pub use price::DetectedPrice;
#[cfg(feature = "tesseract")]
pub use tesseract::TesseractFactory;
