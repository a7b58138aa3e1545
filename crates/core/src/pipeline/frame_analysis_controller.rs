//! Live frame admission and the still-capture sequence.
//!
//! The camera delivers frames on its own thread. At most one frame is ever
//! being analyzed: [`FrameAnalysisController::on_frame`] admits a frame only
//! by winning a compare-and-set on the in-flight flag, then hands it to a
//! dedicated analysis worker. Frames that lose are released on the spot.
//! A separate admission gate lets a still capture pause the live path. The
//! gate stays closed while the captured still is on screen and reopens when
//! the user dismisses it.
//!
//! Both flags are released by guards, so every exit path (success,
//! detector failure, cancellation, a dead worker) reopens them. Both use
//! sequentially consistent ordering: a capture that closes the gate and then
//! sees no analysis in flight must never be overtaken by a frame that won
//! the in-flight flag in between.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

use crate::camera::domain::camera_frame::CameraFrame;
use crate::camera::domain::frame_sink::FrameSink;
use crate::camera::domain::still_camera::{CaptureError, StillCamera};
use crate::detection::domain::detection_result::DetectionResult;
use crate::detection::domain::mode::{ModeCell, VisionMode};
use crate::detection::infrastructure::detector_adapter::DetectionError;
use crate::overlay::overlay_state::OverlayState;
use crate::pipeline::image_processor::ImageProcessor;
use crate::pipeline::pipeline_logger::SharedLogger;
use crate::pipeline::ui_context::UiHandle;
use crate::shared::callback::{await_callback, CallbackError};
use crate::shared::cancellation::CancellationToken;
use crate::shared::constants::{CALLBACK_POLL_INTERVAL, CAPTURE_POLL_INTERVAL};

/// What happened to one delivered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameDisposition {
    /// Admission is paused for a still capture, or the controller has shut down.
    Gated,
    /// The selected mode has no live detector.
    Skipped,
    /// Another frame is still being analyzed.
    Dropped,
    /// Handed to the analysis worker.
    Admitted,
}

impl FrameDisposition {
    pub const ALL: &[FrameDisposition] = &[
        FrameDisposition::Admitted,
        FrameDisposition::Dropped,
        FrameDisposition::Skipped,
        FrameDisposition::Gated,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FrameDisposition::Gated => "gated",
            FrameDisposition::Skipped => "skipped",
            FrameDisposition::Dropped => "dropped",
            FrameDisposition::Admitted => "admitted",
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum CaptureFlowError {
    #[error("a still capture is already in progress")]
    InProgress,
    #[error("a captured still is still shown; dismiss it first")]
    StillShown,
    #[error("still capture cancelled")]
    Cancelled,
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Detection(DetectionError),
}

impl From<DetectionError> for CaptureFlowError {
    fn from(e: DetectionError) -> Self {
        match e {
            DetectionError::Cancelled => CaptureFlowError::Cancelled,
            other => CaptureFlowError::Detection(other),
        }
    }
}

/// Clears the in-flight flag when dropped.
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Reopens the admission gate when dropped.
struct GateGuard {
    open: Arc<AtomicBool>,
}

impl GateGuard {
    fn close(open: &Arc<AtomicBool>) -> Option<Self> {
        open.compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { open: open.clone() })
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.open.store(true, Ordering::SeqCst);
    }
}

struct AnalysisJob {
    frame: CameraFrame,
    mode: VisionMode,
    in_flight: InFlightGuard,
}

pub struct FrameAnalysisController {
    mode: ModeCell,
    in_flight: Arc<AtomicBool>,
    admitting: Arc<AtomicBool>,
    /// Holds the gate while a captured still is displayed.
    shown_still: Arc<Mutex<Option<GateGuard>>>,
    cancel: CancellationToken,
    ui: UiHandle,
    processor: Arc<ImageProcessor>,
    logger: SharedLogger,
    capture_poll_interval: Duration,
    callback_poll_interval: Duration,
    job_tx: Sender<AnalysisJob>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FrameAnalysisController {
    /// Spawns the analysis worker. `mode` must be the cell the UI context writes.
    pub fn new(processor: ImageProcessor, mode: ModeCell, ui: UiHandle, logger: SharedLogger) -> Self {
        let processor = Arc::new(processor);
        let cancel = CancellationToken::new();
        let (job_tx, job_rx) = crossbeam_channel::bounded::<AnalysisJob>(1);

        let worker = spawn_worker(job_rx, processor.clone(), logger.clone(), cancel.clone());

        Self {
            mode,
            in_flight: Arc::new(AtomicBool::new(false)),
            admitting: Arc::new(AtomicBool::new(true)),
            shown_still: Arc::new(Mutex::new(None)),
            cancel,
            ui,
            processor,
            logger,
            capture_poll_interval: CAPTURE_POLL_INTERVAL,
            callback_poll_interval: CALLBACK_POLL_INTERVAL,
            job_tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn with_capture_poll_interval(mut self, interval: Duration) -> Self {
        self.capture_poll_interval = interval;
        self
    }

    pub fn with_callback_poll_interval(mut self, interval: Duration) -> Self {
        self.callback_poll_interval = interval;
        self
    }

    /// True while a live frame is being analyzed.
    pub fn is_analyzing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// False while a still capture runs or its result is displayed.
    pub fn is_admitting(&self) -> bool {
        self.admitting.load(Ordering::SeqCst)
    }

    /// True once a captured still has been applied to the UI and not yet
    /// dismissed.
    pub fn is_showing_still(&self) -> bool {
        self.shown_still
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Decides the fate of one live frame. Never blocks on analysis.
    pub fn on_frame(&self, frame: CameraFrame) -> FrameDisposition {
        let index = frame.index();
        let disposition = self.admit(frame);
        log::debug!("Frame {index}: {}", disposition.label());
        self.logger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .disposition(disposition);
        disposition
    }

    fn is_gated(&self) -> bool {
        self.cancel.is_cancelled() || !self.is_admitting()
    }

    fn admit(&self, frame: CameraFrame) -> FrameDisposition {
        if self.is_gated() {
            frame.close();
            return FrameDisposition::Gated;
        }

        let mode = self.mode.get();
        if !mode.runs_detector() {
            self.clear_live_overlay(OverlayState::clear_all);
            frame.close();
            return FrameDisposition::Skipped;
        }

        let Some(in_flight) = InFlightGuard::acquire(&self.in_flight) else {
            frame.close();
            return FrameDisposition::Dropped;
        };
        // A capture that closed the gate since the first check only waits
        // for analyses it can see in flight.
        if self.is_gated() {
            drop(in_flight);
            frame.close();
            return FrameDisposition::Gated;
        }

        if mode == VisionMode::FaceDetection {
            self.clear_live_overlay(OverlayState::clear_points);
        } else {
            self.clear_live_overlay(OverlayState::clear_box);
        }

        // The slot is free whenever the flag was: the worker takes the job
        // before it can drop the guard.
        match self.job_tx.try_send(AnalysisJob {
            frame,
            mode,
            in_flight,
        }) {
            Ok(()) => FrameDisposition::Admitted,
            Err(e) => {
                log::warn!("Analysis worker unavailable; dropping frame {}", e.into_inner().frame.index());
                FrameDisposition::Dropped
            }
        }
    }

    /// Posts a live-path overlay clear that is skipped if a still has taken
    /// over the overlay by the time the UI context applies it.
    fn clear_live_overlay(&self, clear: fn(&mut OverlayState)) {
        let open = self.admitting.clone();
        self.ui.post(move |state| {
            if open.load(Ordering::SeqCst) {
                clear(state.overlay_mut());
            }
        });
    }

    /// Runs the still-capture sequence and returns the detection result.
    ///
    /// Blocks the calling thread: pauses live admission, waits for the
    /// in-flight analysis to finish, resets overlays and the counter, takes
    /// the picture, then analyzes it once with the current mode. Live
    /// admission stays paused while the still is displayed and resumes on
    /// [`dismiss_capture`](Self::dismiss_capture), or as soon as any step
    /// fails. Call from a worker thread, never from the thread that drains
    /// the UI context.
    pub fn capture_still(&self, camera: &dyn StillCamera) -> Result<DetectionResult, CaptureFlowError> {
        let Some(gate) = GateGuard::close(&self.admitting) else {
            return Err(if self.is_showing_still() {
                CaptureFlowError::StillShown
            } else {
                CaptureFlowError::InProgress
            });
        };
        self.log_info("Still capture requested; live analysis paused");

        while self.is_analyzing() {
            if self.cancel.is_cancelled() {
                return Err(CaptureFlowError::Cancelled);
            }
            std::thread::sleep(self.capture_poll_interval);
        }

        self.ui.post(|state| state.reset_for_capture());

        let mode = self.mode.get();
        let frame = await_callback(&self.cancel, self.callback_poll_interval, |done| {
            camera.take_picture(done)
        })
        .map_err(|e| match e {
            CallbackError::Failed(e) => {
                log::error!("Still capture failed: {e}");
                CaptureFlowError::Capture(e)
            }
            CallbackError::Cancelled => CaptureFlowError::Cancelled,
            CallbackError::Abandoned => {
                log::error!("Camera dropped the capture request");
                CaptureFlowError::Capture(CaptureError::Failed(
                    "camera dropped the capture request".into(),
                ))
            }
        })?;

        let started = Instant::now();
        let image = Arc::new(frame.into_upright());
        let normalize_ms = elapsed_ms(started);

        let started = Instant::now();
        let result = self.processor.process(image, mode, &self.cancel)?;
        {
            let mut logger = self.logger.lock().unwrap_or_else(PoisonError::into_inner);
            logger.timing("normalize", normalize_ms);
            logger.timing("detect", elapsed_ms(started));
        }

        let image = result.annotated_image().clone();
        let count = result.count();
        let cancel = self.cancel.clone();
        let shown_still = self.shown_still.clone();
        let posted = self.ui.post(move |state| {
            if cancel.is_cancelled() {
                return;
            }
            state.show_captured(image, count);
            *shown_still.lock().unwrap_or_else(PoisonError::into_inner) = Some(gate);
        });
        if !posted {
            log::warn!("UI context gone; captured result not shown");
        }
        self.log_info(&format!("Still capture finished in {mode}: {count} face(s)"));
        Ok(result)
    }

    /// Returns from a shown still to the live preview.
    ///
    /// Refused (returns false) while a capture is still running. Live
    /// admission resumes once the UI context has cleared the still.
    pub fn dismiss_capture(&self) -> bool {
        let gate = self
            .shown_still
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if gate.is_none() && !self.is_admitting() {
            return false;
        }
        self.ui.post(move |state| {
            state.dismiss_capture();
            drop(gate);
        })
    }

    /// Cancels pending work and joins the analysis worker.
    ///
    /// A detection still pending resolves as cancelled and writes nothing.
    /// Frames delivered afterwards are gated.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Analysis worker panicked");
            }
        }
    }

    fn log_info(&self, message: &str) {
        self.logger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .info(message);
    }
}

impl FrameSink for FrameAnalysisController {
    fn on_frame(&self, frame: CameraFrame) {
        FrameAnalysisController::on_frame(self, frame);
    }
}

impl Drop for FrameAnalysisController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(
    job_rx: Receiver<AnalysisJob>,
    processor: Arc<ImageProcessor>,
    logger: SharedLogger,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    std::thread::spawn(move || loop {
        match job_rx.recv_timeout(CAPTURE_POLL_INTERVAL) {
            Ok(job) => analyze(job, &processor, &logger, &cancel),
            Err(RecvTimeoutError::Timeout) => {
                if cancel.is_cancelled() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    })
}

fn analyze(
    job: AnalysisJob,
    processor: &ImageProcessor,
    logger: &SharedLogger,
    cancel: &CancellationToken,
) {
    let AnalysisJob {
        frame,
        mode,
        in_flight,
    } = job;
    let index = frame.index();

    let started = Instant::now();
    let image = Arc::new(frame.into_upright());
    let normalize_ms = elapsed_ms(started);

    let started = Instant::now();
    let outcome = processor.process(image, mode, cancel);
    let detect_ms = elapsed_ms(started);

    {
        let mut logger = logger.lock().unwrap_or_else(PoisonError::into_inner);
        logger.timing("normalize", normalize_ms);
        logger.timing("detect", detect_ms);
        if let Ok(result) = &outcome {
            logger.metric("faces", result.count() as f64);
        }
    }

    match outcome {
        Ok(result) => log::debug!("Frame {index}: {} face(s) in {mode}", result.count()),
        Err(DetectionError::Cancelled) => log::debug!("Frame {index}: analysis cancelled"),
        Err(e) => log::warn!("Frame {index}: live analysis failed: {e}"),
    }

    drop(in_flight);
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
