//! Capture Session State Machine
//!
//! One session runs a camera from acquisition to a confirmed (or
//! abandoned) label capture:
//!
//! `AwaitingCamera -> LiveFeed -> Capturing -> ResultsReady ->
//! {Confirmed | retake back to LiveFeed}` plus a terminal `Closed`.
//!
//! The camera stream is held exclusively and released on every path out
//! of a camera-holding state - capture, retake, confirm, close, and
//! drop. With multiple capture targets configured (part-number pass then
//! VIN pass) the Capturing step recurs per target, re-acquiring the
//! camera in between; an optional target may be skipped without
//! acquiring a frame.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::capture::{CameraDevice, CameraStream, Frame};
use crate::config::TargetConfig;
use crate::vision::CapturePipeline;

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No camera held; acquisition has not succeeded yet
    AwaitingCamera,
    /// Camera acquired, live feed running
    LiveFeed,
    /// A frame is frozen and being processed
    Capturing,
    /// Extracted text is ready and editable
    ResultsReady,
    /// Final result emitted, session over
    Confirmed,
    /// Cancelled by the user, session over
    Closed,
}

/// Final structured result of a confirmed session. Edited values win
/// over whatever OCR extracted.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    /// Text per bounding box id
    pub texts: HashMap<String, String>,
    /// PNG data URL of the last captured frame
    pub image_url: Option<String>,
    /// When the last frame was frozen, if one was
    pub captured_at: Option<DateTime<Utc>>,
}

/// A label-capture session over one camera device.
pub struct CaptureSession {
    camera: Arc<dyn CameraDevice>,
    pipeline: CapturePipeline,
    targets: Vec<TargetConfig>,
    target_idx: usize,
    state: SessionState,
    stream: Option<Box<dyn CameraStream>>,
    frame: Option<Frame>,
    texts: HashMap<String, String>,
    image_url: Option<String>,
}

impl CaptureSession {
    pub fn new(
        camera: Arc<dyn CameraDevice>,
        pipeline: CapturePipeline,
        targets: Vec<TargetConfig>,
    ) -> Result<Self> {
        if targets.is_empty() {
            bail!("capture session needs at least one target");
        }
        Ok(Self {
            camera,
            pipeline,
            targets,
            target_idx: 0,
            state: SessionState::AwaitingCamera,
            stream: None,
            frame: None,
            texts: HashMap::new(),
            image_url: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The capture target the session is currently on.
    pub fn current_target(&self) -> &TargetConfig {
        &self.targets[self.target_idx]
    }

    /// Extracted (and edited) text per box id.
    pub fn texts(&self) -> &HashMap<String, String> {
        &self.texts
    }

    /// Acquire the camera and enter the live feed. On failure the
    /// session stays in `AwaitingCamera`; calling `start` again is the
    /// user-triggered retry.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != SessionState::AwaitingCamera {
            bail!("session already started");
        }
        self.acquire_feed().await?;
        info!(target = %self.current_target().name, "capture session live");
        Ok(())
    }

    /// Freeze a frame, release the camera, and run the extraction
    /// pipeline for the current target's boxes. Ends in `ResultsReady`,
    /// or back in `LiveFeed` when another target remains.
    pub async fn capture(&mut self) -> Result<()> {
        if self.state != SessionState::LiveFeed {
            bail!("capture requires a live camera feed");
        }
        self.state = SessionState::Capturing;

        let mut stream = self.stream.take().context("camera stream missing")?;
        let display = stream.display_geometry();
        let grabbed = stream.grab_frame().await;
        // The live feed stops as soon as the frame is frozen
        stream.release();

        let frame = match grabbed {
            Ok(frame) => frame,
            Err(err) => {
                self.state = SessionState::AwaitingCamera;
                return Err(err.into());
            }
        };

        let target = &self.targets[self.target_idx];
        debug!(target = %target.name, boxes = target.boxes.len(), "processing captured frame");
        let results = self.pipeline.process(&frame, &display, &target.boxes).await;
        self.texts.extend(results);
        self.image_url = frame.to_data_url().ok();
        self.frame = Some(frame);

        if self.target_idx + 1 < self.targets.len() {
            // Next pass needs a fresh live feed
            self.target_idx += 1;
            self.acquire_feed().await?;
        } else {
            self.state = SessionState::ResultsReady;
        }
        Ok(())
    }

    /// Skip the current target without capturing a frame. Only allowed
    /// for targets configured as optional (the skippable VIN pass).
    pub fn skip_target(&mut self) -> Result<()> {
        if self.state != SessionState::LiveFeed {
            bail!("skip requires a live camera feed");
        }
        if !self.current_target().optional {
            bail!("target '{}' is not skippable", self.current_target().name);
        }
        debug!(target = %self.current_target().name, "target skipped");
        self.release_stream();
        self.state = SessionState::ResultsReady;
        Ok(())
    }

    /// Override extracted text for one box while results are editable.
    pub fn edit(&mut self, box_id: &str, text: impl Into<String>) -> Result<()> {
        if self.state != SessionState::ResultsReady {
            bail!("results are not editable in state {:?}", self.state);
        }
        let known = self
            .targets
            .iter()
            .flat_map(|t| &t.boxes)
            .any(|b| b.id == box_id);
        if !known {
            bail!("unknown region '{box_id}'");
        }
        self.texts.insert(box_id.to_string(), text.into());
        Ok(())
    }

    /// Discard the current target's frame and text and go back to the
    /// live feed for another attempt.
    pub async fn retake(&mut self) -> Result<()> {
        if self.state != SessionState::ResultsReady {
            bail!("retake requires results to be ready");
        }
        self.frame = None;
        self.image_url = None;
        for bbox in &self.targets[self.target_idx].boxes {
            self.texts.remove(&bbox.id);
        }
        debug!(target = %self.current_target().name, "retaking capture");
        self.acquire_feed().await
    }

    /// Emit the final structured result and tear the session down.
    pub fn confirm(&mut self) -> Result<CaptureOutcome> {
        if self.state != SessionState::ResultsReady {
            bail!("confirm requires results to be ready");
        }
        self.release_stream();
        self.state = SessionState::Confirmed;
        info!("capture session confirmed");
        Ok(CaptureOutcome {
            texts: std::mem::take(&mut self.texts),
            image_url: self.image_url.take(),
            captured_at: self.frame.take().map(|f| f.captured_at()),
        })
    }

    /// Cancel the session from any state. Idempotent.
    pub fn close(&mut self) {
        self.release_stream();
        self.frame = None;
        self.texts.clear();
        if self.state != SessionState::Confirmed && self.state != SessionState::Closed {
            info!("capture session closed");
            self.state = SessionState::Closed;
        }
    }

    async fn acquire_feed(&mut self) -> Result<()> {
        match self.camera.acquire().await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.state = SessionState::LiveFeed;
                Ok(())
            }
            Err(err) => {
                self.state = SessionState::AwaitingCamera;
                Err(err.into())
            }
        }
    }

    fn release_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        // Abnormal teardown must not leak an acquired stream
        self.release_stream();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::capture::DisplayGeometry;
    use crate::config::{BoundingBox, BoxUnits, PreprocessSettings};
    use crate::error::ScanError;
    use crate::vision::ocr::ScriptedRecognizer;
    use crate::vision::REGION_ERROR_SENTINEL;

    /// Camera double counting acquisitions and releases.
    struct CountingCamera {
        acquires: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
        fail_acquire: bool,
    }

    struct CountingStream {
        releases: Arc<AtomicUsize>,
        released: bool,
    }

    #[async_trait]
    impl CameraDevice for CountingCamera {
        async fn acquire(&self) -> Result<Box<dyn CameraStream>, ScanError> {
            if self.fail_acquire {
                return Err(ScanError::CameraUnavailable("denied".to_string()));
            }
            self.acquires.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingStream {
                releases: self.releases.clone(),
                released: false,
            }))
        }
    }

    #[async_trait]
    impl CameraStream for CountingStream {
        async fn grab_frame(&mut self) -> Result<Frame, ScanError> {
            Ok(Frame::new(vec![200u8; 100 * 100 * 4], 100, 100))
        }

        fn display_geometry(&self) -> DisplayGeometry {
            // Identity mapping against the 100x100 frame
            DisplayGeometry {
                width: 100,
                height: 100,
            }
        }

        fn release(&mut self) {
            if !self.released {
                self.released = true;
                self.releases.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn bbox(id: &str, x: f64, y: f64, w: f64, h: f64) -> BoundingBox {
        BoundingBox {
            id: id.to_string(),
            x,
            y,
            width: w,
            height: h,
            units: BoxUnits::Pixels,
        }
    }

    fn label_target() -> TargetConfig {
        TargetConfig {
            name: "label".to_string(),
            optional: false,
            boxes: vec![
                bbox("part_number", 10.0, 10.0, 40.0, 20.0),
                bbox("vin", 10.0, 50.0, 80.0, 20.0),
            ],
        }
    }

    fn pipeline(recognizer: ScriptedRecognizer) -> CapturePipeline {
        CapturePipeline::new(
            Arc::new(recognizer),
            PreprocessSettings {
                enabled: false,
                ..PreprocessSettings::default()
            },
            Duration::from_secs(5),
        )
    }

    fn counting_session(
        recognizer: ScriptedRecognizer,
        targets: Vec<TargetConfig>,
    ) -> (CaptureSession, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let acquires = Arc::new(AtomicUsize::new(0));
        let releases = Arc::new(AtomicUsize::new(0));
        let camera = Arc::new(CountingCamera {
            acquires: acquires.clone(),
            releases: releases.clone(),
            fail_acquire: false,
        });
        let session = CaptureSession::new(camera, pipeline(recognizer), targets).unwrap();
        (session, acquires, releases)
    }

    #[tokio::test]
    async fn test_happy_path_reaches_confirmed() {
        let recognizer = ScriptedRecognizer::new([
            ("part_number", "LP-9999"),
            ("vin", "1HGCM82633A123456"),
        ]);
        let (mut session, _, _) = counting_session(recognizer, vec![label_target()]);

        assert_eq!(session.state(), SessionState::AwaitingCamera);
        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::LiveFeed);
        session.capture().await.unwrap();
        assert_eq!(session.state(), SessionState::ResultsReady);

        let outcome = session.confirm().unwrap();
        assert_eq!(session.state(), SessionState::Confirmed);
        assert_eq!(outcome.texts["part_number"], "LP-9999");
        assert_eq!(outcome.texts["vin"], "1HGCM82633A123456");
        assert!(outcome.image_url.unwrap().starts_with("data:image/png"));
        assert!(outcome.captured_at.is_some());
    }

    #[tokio::test]
    async fn test_retake_cycle_balances_acquires_and_releases() {
        let recognizer = ScriptedRecognizer::new([("part_number", "LP-1")]);
        let (mut session, acquires, releases) =
            counting_session(recognizer, vec![label_target()]);

        // acquire -> capture -> retake -> capture -> confirm
        session.start().await.unwrap();
        session.capture().await.unwrap();
        session.retake().await.unwrap();
        session.capture().await.unwrap();
        session.confirm().unwrap();
        drop(session);

        assert_eq!(acquires.load(Ordering::SeqCst), 2);
        assert_eq!(releases.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_close_from_live_feed_releases_once() {
        let recognizer = ScriptedRecognizer::new([("part_number", "LP-1")]);
        let (mut session, acquires, releases) =
            counting_session(recognizer, vec![label_target()]);

        session.start().await.unwrap();
        session.close();
        session.close(); // idempotent
        drop(session);

        assert_eq!(session_counts(&acquires, &releases), (1, 1));
    }

    fn session_counts(
        acquires: &Arc<AtomicUsize>,
        releases: &Arc<AtomicUsize>,
    ) -> (usize, usize) {
        (
            acquires.load(Ordering::SeqCst),
            releases.load(Ordering::SeqCst),
        )
    }

    #[tokio::test]
    async fn test_camera_denied_stays_awaiting_and_retries() {
        let releases = Arc::new(AtomicUsize::new(0));
        let camera = Arc::new(CountingCamera {
            acquires: Arc::new(AtomicUsize::new(0)),
            releases,
            fail_acquire: true,
        });
        let recognizer = ScriptedRecognizer::new([("part_number", "LP-1")]);
        let mut session =
            CaptureSession::new(camera, pipeline(recognizer), vec![label_target()]).unwrap();

        let err = session.start().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScanError>(),
            Some(ScanError::CameraUnavailable(_))
        ));
        assert_eq!(session.state(), SessionState::AwaitingCamera);

        // User-triggered retry re-enters acquisition (and fails again here)
        assert!(session.start().await.is_err());
        assert_eq!(session.state(), SessionState::AwaitingCamera);
    }

    #[tokio::test]
    async fn test_empty_ocr_still_reaches_results_ready() {
        let recognizer = ScriptedRecognizer::new::<[(&str, &str); 0], _, _>([]);
        let (mut session, _, _) = counting_session(recognizer, vec![label_target()]);

        session.start().await.unwrap();
        session.capture().await.unwrap();

        assert_eq!(session.state(), SessionState::ResultsReady);
        assert_eq!(session.texts()["part_number"], "");
        assert_eq!(session.texts()["vin"], "");
    }

    #[tokio::test]
    async fn test_edits_win_over_extracted_text() {
        let recognizer = ScriptedRecognizer::new([("part_number", "LP-gargled")]);
        let (mut session, _, _) = counting_session(recognizer, vec![label_target()]);

        session.start().await.unwrap();
        session.capture().await.unwrap();
        session.edit("part_number", "LP-9999").unwrap();
        assert!(session.edit("bogus_box", "x").is_err());

        let outcome = session.confirm().unwrap();
        assert_eq!(outcome.texts["part_number"], "LP-9999");
    }

    #[tokio::test]
    async fn test_failed_region_carries_sentinel_but_step_completes() {
        let mut target = label_target();
        // VIN box pushed off the frame
        target.boxes[1] = bbox("vin", 90.0, 90.0, 40.0, 20.0);
        let recognizer = ScriptedRecognizer::new([("part_number", "LP-1")]);
        let (mut session, _, _) = counting_session(recognizer, vec![target]);

        session.start().await.unwrap();
        session.capture().await.unwrap();

        assert_eq!(session.state(), SessionState::ResultsReady);
        assert_eq!(session.texts()["part_number"], "LP-1");
        assert_eq!(session.texts()["vin"], REGION_ERROR_SENTINEL);
    }

    #[tokio::test]
    async fn test_two_step_capture_recurs_then_completes() {
        let part_target = TargetConfig {
            name: "part-number".to_string(),
            optional: false,
            boxes: vec![bbox("part_number", 10.0, 10.0, 40.0, 20.0)],
        };
        let vin_target = TargetConfig {
            name: "vin".to_string(),
            optional: true,
            boxes: vec![bbox("vin", 10.0, 50.0, 80.0, 20.0)],
        };
        let recognizer = ScriptedRecognizer::new([
            ("part_number", "LP-9999"),
            ("vin", "1HGCM82633A123456"),
        ]);
        let (mut session, acquires, releases) =
            counting_session(recognizer, vec![part_target, vin_target]);

        session.start().await.unwrap();
        session.capture().await.unwrap();
        // First pass done: back on the live feed for the VIN pass
        assert_eq!(session.state(), SessionState::LiveFeed);
        assert_eq!(session.current_target().name, "vin");

        session.capture().await.unwrap();
        assert_eq!(session.state(), SessionState::ResultsReady);

        let outcome = session.confirm().unwrap();
        assert_eq!(outcome.texts["part_number"], "LP-9999");
        assert_eq!(outcome.texts["vin"], "1HGCM82633A123456");
        assert_eq!(session_counts(&acquires, &releases), (2, 2));
    }

    #[tokio::test]
    async fn test_optional_vin_pass_is_skippable() {
        let part_target = TargetConfig {
            name: "part-number".to_string(),
            optional: false,
            boxes: vec![bbox("part_number", 10.0, 10.0, 40.0, 20.0)],
        };
        let vin_target = TargetConfig {
            name: "vin".to_string(),
            optional: true,
            boxes: vec![bbox("vin", 10.0, 50.0, 80.0, 20.0)],
        };
        let recognizer = ScriptedRecognizer::new([("part_number", "LP-9999")]);
        let (mut session, acquires, releases) =
            counting_session(recognizer, vec![part_target, vin_target]);

        session.start().await.unwrap();
        // Required first pass cannot be skipped
        assert!(session.skip_target().is_err());
        session.capture().await.unwrap();
        session.skip_target().unwrap();

        assert_eq!(session.state(), SessionState::ResultsReady);
        let outcome = session.confirm().unwrap();
        assert_eq!(outcome.texts["part_number"], "LP-9999");
        assert!(!outcome.texts.contains_key("vin"));
        assert_eq!(session_counts(&acquires, &releases), (2, 2));
    }

    #[tokio::test]
    async fn test_capture_requires_live_feed() {
        let recognizer = ScriptedRecognizer::new([("part_number", "LP-1")]);
        let (mut session, _, _) = counting_session(recognizer, vec![label_target()]);

        assert!(session.capture().await.is_err());
        assert!(session.confirm().is_err());
    }
}
