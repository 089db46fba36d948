//! Error taxonomy for the capture pipeline
//!
//! Each stage has its own error type. The session controller is the only
//! place where they are turned into a user-facing failure reason.

use thiserror::Error;

/// The camera could not be acquired or stopped delivering frames
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaAcquisitionError {
    /// No camera matches the request, or permission was denied
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    /// The stream was acquired but a frame could not be read
    #[error("frame capture failed: {0}")]
    Frame(String),
    /// The stream has already been stopped
    #[error("camera stream already released")]
    Released,
}

/// OCR could not produce a result
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecognitionError {
    /// Engine could not be created or configured
    #[error("OCR engine failed to initialize: {0}")]
    Init(String),
    /// Engine ran but failed
    #[error("OCR engine error: {0}")]
    Engine(String),
    /// The call was cancelled before it finished
    #[error("OCR call aborted")]
    Aborted,
}

/// Why a conversion failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionFailure {
    NotFound,
    Network,
    MalformedResponse,
}

/// Rate service call failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ConversionError {
    pub reason: ConversionFailure,
    pub message: String,
}

impl ConversionError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            reason: ConversionFailure::NotFound,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            reason: ConversionFailure::Network,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            reason: ConversionFailure::MalformedResponse,
            message: message.into(),
        }
    }
}

/// Any stage failure, as seen by the session controller
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error(transparent)]
    MediaAcquisition(#[from] MediaAcquisitionError),
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    #[error("no price found")]
    NoPriceFound,
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl PipelineError {
    /// Reason shown to the user in the `Failed` state.
    ///
    /// Recognition failures read the same as an empty detection.
    pub fn user_reason(&self) -> String {
        match self {
            PipelineError::MediaAcquisition(e) => e.to_string(),
            PipelineError::Recognition(_) | PipelineError::NoPriceFound => {
                "no price found".to_string()
            }
            PipelineError::Conversion(e) => match e.reason {
                ConversionFailure::NotFound => "currency not supported".to_string(),
                ConversionFailure::Network => "conversion service unreachable".to_string(),
                ConversionFailure::MalformedResponse => {
                    "unexpected response from conversion service".to_string()
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognition_reads_as_no_price() {
        let err = PipelineError::from(RecognitionError::Init("no binary".into()));
        assert_eq!(err.user_reason(), "no price found");
        assert_eq!(PipelineError::NoPriceFound.user_reason(), "no price found");
    }

    #[test]
    fn test_conversion_reasons() {
        let err = PipelineError::from(ConversionError::not_found("XYZ"));
        assert_eq!(err.user_reason(), "currency not supported");
        let err = PipelineError::from(ConversionError::network("timeout"));
        assert_eq!(err.user_reason(), "conversion service unreachable");
    }

    #[test]
    fn test_media_reason_includes_detail() {
        let err = PipelineError::from(MediaAcquisitionError::Unavailable("denied".into()));
        assert_eq!(err.user_reason(), "camera unavailable: denied");
    }
}
