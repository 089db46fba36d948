//! Capture Session Controller
//!
//! Owns the camera and the session state machine, and runs one
//! capture → detect → confirm → convert cycle at a time.
//!
//! Every cycle gets a generation number and its own cancellation token.
//! Results from a cycle that was cancelled or superseded are dropped instead
//! of being applied.

pub mod state;

pub use state::{SessionSnapshot, SessionState};

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::frame::Dimensions;
use crate::capture::{CameraHandle, FacingMode, MediaSource};
use crate::config::AppConfig;
use crate::conversion::{
    ConversionGateway, ConversionOutcome, ConversionRequest, CurrencyCode, RateService,
};
use crate::error::{MediaAcquisitionError, PipelineError, RecognitionError};
use crate::overlay::{self, DisplayBox};
use crate::vision::ocr::{OcrEngineFactory, OcrParams, RegionOfInterest, TextRecognizer};
use crate::vision::preprocess::FramePreprocessor;
use crate::vision::price::{self, DetectedPrice};

/// A price found in the current cycle, with the size of the frame it came from
#[derive(Debug, Clone)]
struct Detection {
    price: DetectedPrice,
    source: Dimensions,
}

/// Mutable session data. Never held across an `.await`.
#[derive(Debug, Default)]
struct Inner {
    state: SessionState,
    generation: u64,
    cancel: Option<CancellationToken>,
    detection: Option<Detection>,
    display_box: Option<DisplayBox>,
    viewport: Option<Dimensions>,
    result: Option<crate::conversion::ConversionResult>,
}

impl Inner {
    /// Cancel any outstanding call of the current cycle
    fn cancel_in_flight(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }

    /// Drop everything the previous cycle produced
    fn clear_cycle(&mut self) {
        self.detection = None;
        self.display_box = None;
        self.result = None;
    }

    fn go_idle(&mut self) {
        self.cancel_in_flight();
        self.clear_cycle();
        self.state = SessionState::Idle;
    }

    fn fail(&mut self, error: &PipelineError) {
        self.cancel_in_flight();
        self.clear_cycle();
        self.state = SessionState::Failed(error.user_reason());
    }

    /// Whether a result from `generation` may still be applied
    fn is_current(&self, generation: u64, token: &CancellationToken) -> bool {
        self.generation == generation && !token.is_cancelled()
    }

    fn recompute_display_box(&mut self) {
        self.display_box = match (&self.detection, self.viewport) {
            (Some(d), Some(viewport)) => {
                Some(overlay::map(&d.price.source_box, d.source, viewport))
            }
            _ => None,
        };
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state.clone(),
            cycle: self.generation,
            price: self.detection.as_ref().map(|d| d.price.clone()),
            display_box: self.display_box,
            result: self.result.clone(),
        }
    }
}

/// Drives the detection-and-confirmation pipeline for one camera
pub struct CaptureSessionController {
    inner: Mutex<Inner>,
    camera: tokio::sync::Mutex<Option<CameraHandle>>,
    media: Arc<dyn MediaSource>,
    facing: FacingMode,
    preprocessor: FramePreprocessor,
    recognizer: TextRecognizer,
    gateway: ConversionGateway,
    default_from: CurrencyCode,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl CaptureSessionController {
    /// Create a controller in `Idle`. The camera is not touched until
    /// [`start`](Self::start).
    pub fn new(
        config: &AppConfig,
        media: Arc<dyn MediaSource>,
        ocr: Arc<dyn OcrEngineFactory>,
        rates: Arc<dyn RateService>,
    ) -> Result<Self, PipelineError> {
        let default_from = parse_code(&config.conversion.default_from)?;
        let recognizer = TextRecognizer::new(ocr, OcrParams::from_settings(&config.ocr))
            .with_region(RegionOfInterest::from_settings(&config.capture));
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());

        Ok(Self {
            inner: Mutex::new(Inner::default()),
            camera: tokio::sync::Mutex::new(None),
            media,
            facing: config.capture.facing,
            preprocessor: FramePreprocessor::new(&config.preprocess),
            recognizer,
            gateway: ConversionGateway::new(rates),
            default_from,
            snapshot_tx,
        })
    }

    /// Acquire the camera. On failure the session moves to `Failed` and
    /// stays there until the user retries.
    pub async fn start(&self) {
        if self.is_disposed() {
            return;
        }
        if let Err(e) = self.ensure_camera().await {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Disposed {
                return;
            }
            warn!("Camera acquisition failed: {}", e);
            inner.fail(&e);
            self.publish(&inner);
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.inner.lock().state.clone()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().snapshot()
    }

    /// Receive a snapshot every time the session changes
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Grab a frame and look for a price in it.
    ///
    /// Only valid in `Idle`; returns `false` and does nothing otherwise.
    pub async fn capture(&self) -> bool {
        let (generation, token) = {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Idle {
                debug!("capture() ignored in state {}", inner.state);
                return false;
            }
            inner.go_idle();
            inner.generation += 1;
            let token = CancellationToken::new();
            inner.cancel = Some(token.clone());
            inner.state = SessionState::Capturing;
            info!("Capture cycle {} started", inner.generation);
            self.publish(&inner);
            (inner.generation, token)
        };

        let outcome = self.detect(generation, &token).await;

        let mut inner = self.inner.lock();
        if !inner.is_current(generation, &token) {
            debug!("Dropping result of stale capture cycle {}", generation);
            return true;
        }

        match outcome {
            Ok(Some(detection)) => {
                info!(
                    "Detected {} ({:?}) in cycle {}",
                    detection.price.normalized_amount, detection.price.currency_hint, generation
                );
                inner.detection = Some(detection);
                inner.recompute_display_box();
                inner.state = SessionState::AwaitingConfirmation;
            }
            Ok(None) => return true,
            Err(e) => {
                warn!("Capture cycle {} failed: {}", generation, e);
                inner.fail(&e);
            }
        }
        self.publish(&inner);
        true
    }

    /// Confirm the detected price and convert it into `to`, using the
    /// detected currency (or the configured default) as the source
    pub async fn confirm(&self, to: CurrencyCode) -> bool {
        self.confirm_with(None, to).await
    }

    /// Confirm with an explicit source currency
    pub async fn confirm_with(&self, from: Option<CurrencyCode>, to: CurrencyCode) -> bool {
        let (generation, token, request) = {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::AwaitingConfirmation {
                debug!("confirm() ignored in state {}", inner.state);
                return false;
            }
            let Some(detection) = inner.detection.as_ref() else {
                return false;
            };

            let request = ConversionRequest {
                amount: detection.price.normalized_amount.clone(),
                from: from
                    .or(detection.price.currency_hint)
                    .unwrap_or(self.default_from),
                to,
            };

            inner.cancel_in_flight();
            let token = CancellationToken::new();
            inner.cancel = Some(token.clone());
            inner.state = SessionState::Converting;
            self.publish(&inner);
            (inner.generation, token, request)
        };

        let outcome = self.gateway.convert(&request, &token).await;

        let mut inner = self.inner.lock();
        if !inner.is_current(generation, &token) {
            debug!("Dropping result of stale conversion in cycle {}", generation);
            return true;
        }

        match outcome {
            Ok(ConversionOutcome::Converted(result)) => {
                inner.result = Some(result);
                inner.state = SessionState::ShowingResult;
            }
            Ok(ConversionOutcome::Cancelled) => return true,
            Err(e) => {
                let e = PipelineError::from(e);
                warn!("Conversion in cycle {} failed: {}", generation, e);
                inner.fail(&e);
            }
        }
        self.publish(&inner);
        true
    }

    /// Abandon the current cycle. Any outstanding OCR or conversion call is
    /// cancelled and its result is dropped.
    pub fn cancel(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Capturing
            | SessionState::Detecting
            | SessionState::AwaitingConfirmation
            | SessionState::Converting => {
                info!("Cycle {} cancelled in state {}", inner.generation, inner.state);
                inner.go_idle();
                self.publish(&inner);
                true
            }
            _ => false,
        }
    }

    /// Dismiss a shown result
    pub fn close(&self) -> bool {
        self.transition_to_idle(|s| *s == SessionState::ShowingResult)
    }

    /// Leave the failed state
    pub fn retry(&self) -> bool {
        self.transition_to_idle(|s| matches!(s, SessionState::Failed(_)))
    }

    /// Return to `Idle` from anywhere except `Disposed`
    pub fn reset(&self) -> bool {
        self.transition_to_idle(|s| *s != SessionState::Disposed)
    }

    /// Update the rendered video size and recompute the overlay box
    pub fn set_viewport(&self, viewport: Dimensions) {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Disposed {
            return;
        }
        inner.viewport = Some(viewport);
        inner.recompute_display_box();
        self.publish(&inner);
    }

    /// Tear down the session and release the camera. Further calls are
    /// no-ops.
    pub async fn dispose(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Disposed {
                return;
            }
            inner.cancel_in_flight();
            inner.clear_cycle();
            inner.state = SessionState::Disposed;
            self.publish(&inner);
        }

        if let Some(mut camera) = self.camera.lock().await.take() {
            camera.release();
        }
        info!("Capture session disposed");
    }

    fn transition_to_idle(&self, allowed: impl Fn(&SessionState) -> bool) -> bool {
        let mut inner = self.inner.lock();
        if !allowed(&inner.state) {
            return false;
        }
        inner.go_idle();
        self.publish(&inner);
        true
    }

    fn publish(&self, inner: &Inner) {
        self.snapshot_tx.send_replace(inner.snapshot());
    }

    /// Move to `Detecting` if the cycle is still current
    fn enter_detecting(&self, generation: u64, token: &CancellationToken) -> bool {
        let mut inner = self.inner.lock();
        if !inner.is_current(generation, token) {
            return false;
        }
        inner.state = SessionState::Detecting;
        self.publish(&inner);
        true
    }

    fn is_disposed(&self) -> bool {
        self.inner.lock().state == SessionState::Disposed
    }

    /// Acquire the camera unless it is already held. Never acquires once the
    /// session is disposed.
    async fn ensure_camera(&self) -> Result<(), PipelineError> {
        let mut camera = self.camera.lock().await;
        if self.is_disposed() {
            return Err(MediaAcquisitionError::Released.into());
        }
        if camera.as_ref().is_some_and(CameraHandle::is_active) {
            return Ok(());
        }

        let mut handle = CameraHandle::new(self.media.acquire(self.facing).await?);
        if self.is_disposed() {
            handle.release();
            return Err(MediaAcquisitionError::Released.into());
        }
        *camera = Some(handle);
        Ok(())
    }

    /// Frame → preprocess → OCR → extract. `Ok(None)` means the cycle was
    /// cancelled along the way.
    async fn detect(
        &self,
        generation: u64,
        token: &CancellationToken,
    ) -> Result<Option<Detection>, PipelineError> {
        let start = Instant::now();

        let frame = tokio::select! {
            _ = token.cancelled() => return Ok(None),
            frame = self.grab_frame() => frame?,
        };
        debug!(
            "Frame {}x{} grabbed in {:?}",
            frame.width(),
            frame.height(),
            start.elapsed()
        );

        if !self.enter_detecting(generation, token) {
            return Ok(None);
        }

        let preprocessor = self.preprocessor.clone();
        let preprocessed =
            tokio::task::spawn_blocking(move || preprocessor.preprocess_owned(frame))
                .await
                .map_err(|e| RecognitionError::Engine(format!("preprocess task failed: {e}")))?;

        let source = preprocessed.dimensions();
        let roi = self.recognizer.region_for(&preprocessed);

        let recognized = match self.recognizer.recognize(preprocessed, roi, token).await {
            Ok(result) => result,
            Err(_) if token.is_cancelled() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let price = price::extract(&recognized).ok_or(PipelineError::NoPriceFound)?;
        debug!("Detection pipeline finished in {:?}", start.elapsed());

        Ok(Some(Detection { price, source }))
    }

    async fn grab_frame(&self) -> Result<crate::capture::frame::Frame, PipelineError> {
        self.ensure_camera().await?;
        let mut camera = self.camera.lock().await;
        match camera.as_mut() {
            Some(handle) => Ok(handle.grab_frame().await?),
            None => Err(MediaAcquisitionError::Released.into()),
        }
    }
}

fn parse_code(code: &str) -> Result<CurrencyCode, PipelineError> {
    code.parse().map_err(|e: String| {
        PipelineError::Conversion(crate::error::ConversionError::not_found(e))
    })
}
