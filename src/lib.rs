//! PriceLens - point a camera at a price tag and convert it
//!
//! The pipeline grabs one frame, cleans it up for OCR, finds the first
//! price-shaped string in the recognized text, and converts it through a
//! remote rate service once the user confirms.

pub mod capture;
pub mod config;
pub mod conversion;
pub mod error;
pub mod overlay;
pub mod session;
pub mod vision;

pub use config::AppConfig;
pub use conversion::{ConversionResult, CurrencyCode};
pub use error::PipelineError;
pub use session::{CaptureSessionController, SessionSnapshot, SessionState};
