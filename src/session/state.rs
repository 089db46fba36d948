//! Session state shared with the display layer

use std::fmt;

use crate::conversion::ConversionResult;
use crate::overlay::DisplayBox;
use crate::vision::price::DetectedPrice;

/// Where the capture cycle currently is
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Capturing,
    Detecting,
    AwaitingConfirmation,
    Converting,
    ShowingResult,
    /// Cycle ended with a user-facing reason
    Failed(String),
    /// Camera released, controller no longer usable
    Disposed,
}

impl SessionState {
    /// True while a capture, detection or conversion is outstanding
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionState::Capturing | SessionState::Detecting | SessionState::Converting
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Capturing => f.write_str("capturing"),
            SessionState::Detecting => f.write_str("detecting"),
            SessionState::AwaitingConfirmation => f.write_str("awaiting confirmation"),
            SessionState::Converting => f.write_str("converting"),
            SessionState::ShowingResult => f.write_str("showing result"),
            SessionState::Failed(reason) => write!(f, "failed: {reason}"),
            SessionState::Disposed => f.write_str("disposed"),
        }
    }
}

/// Everything the display layer needs to render one moment of a session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Capture cycle counter, bumped on every accepted `capture()`
    pub cycle: u64,
    /// Detected price while awaiting confirmation and after
    pub price: Option<DetectedPrice>,
    /// Overlay rectangle in display pixels, once a viewport is known
    pub display_box: Option<DisplayBox>,
    /// Converted amount in `ShowingResult`
    pub result: Option<ConversionResult>,
}

impl SessionSnapshot {
    /// Text shown for the converted amount, e.g. "EUR 11.48"
    pub fn result_text(&self) -> Option<String> {
        self.result.as_ref().map(|r| r.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_states() {
        assert!(SessionState::Capturing.is_busy());
        assert!(SessionState::Converting.is_busy());
        assert!(!SessionState::AwaitingConfirmation.is_busy());
        assert!(!SessionState::Failed("x".into()).is_busy());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            SessionState::Failed("no price found".into()).to_string(),
            "failed: no price found"
        );
        assert_eq!(SessionState::default(), SessionState::Idle);
    }
}
