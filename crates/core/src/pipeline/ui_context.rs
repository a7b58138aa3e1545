//! The single execution context that owns UI-visible state.
//!
//! Other threads never touch [`UiState`] directly. They post closures
//! through a [`UiHandle`]; the owner of the [`UiLoop`] drains and applies
//! them in posting order on its own thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::detection::domain::mode::{ModeCell, VisionMode};
use crate::overlay::overlay_state::OverlayState;
use crate::shared::frame::Frame;

pub type UiTask = Box<dyn FnOnce(&mut UiState) + Send>;

/// Everything the UI renders: selected mode, face counter, captured still
/// and the overlay.
#[derive(Debug)]
pub struct UiState {
    mode: ModeCell,
    face_count: usize,
    captured_image: Option<Arc<Frame>>,
    overlay: OverlayState,
}

impl UiState {
    pub fn new(mode: ModeCell, view_width: f64, view_height: f64) -> Self {
        Self {
            mode,
            face_count: 0,
            captured_image: None,
            overlay: OverlayState::new(view_width, view_height),
        }
    }

    pub fn mode(&self) -> VisionMode {
        self.mode.get()
    }

    /// User selection. Overlays are left alone here; the next admitted
    /// frame clears whichever one the new mode does not own.
    pub fn select_mode(&mut self, mode: VisionMode) {
        if self.mode.get() != mode {
            log::info!("Mode changed to {mode}");
            self.mode.set(mode);
        }
    }

    pub fn face_count(&self) -> usize {
        self.face_count
    }

    pub fn captured_image(&self) -> Option<&Arc<Frame>> {
        self.captured_image.as_ref()
    }

    pub fn overlay(&self) -> &OverlayState {
        &self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut OverlayState {
        &mut self.overlay
    }

    /// Clears both overlays and the counter ahead of a still capture.
    pub fn reset_for_capture(&mut self) {
        self.overlay.clear_all();
        self.face_count = 0;
    }

    pub fn show_captured(&mut self, image: Arc<Frame>, face_count: usize) {
        self.captured_image = Some(image);
        self.face_count = face_count;
    }

    /// Drops the captured still and returns to an empty live preview.
    pub fn dismiss_capture(&mut self) {
        self.captured_image = None;
        self.overlay.clear_all();
        self.face_count = 0;
    }
}

/// Posts work onto the UI context from any thread.
#[derive(Clone)]
pub struct UiHandle {
    tx: Sender<UiTask>,
}

impl UiHandle {
    /// Queues `task`; returns false when the UI loop is gone, in which case
    /// the task is dropped unrun.
    pub fn post<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut UiState) + Send + 'static,
    {
        self.tx.send(Box::new(task)).is_ok()
    }

    pub fn select_mode(&self, mode: VisionMode) -> bool {
        self.post(move |state| state.select_mode(mode))
    }
}

/// Owner side of the UI context.
pub struct UiLoop {
    rx: Receiver<UiTask>,
    state: UiState,
}

impl UiLoop {
    pub fn new(mode: ModeCell, view_width: f64, view_height: f64) -> (Self, UiHandle) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let ui_loop = Self {
            rx,
            state: UiState::new(mode, view_width, view_height),
        };
        (ui_loop, UiHandle { tx })
    }

    /// Applies every task already queued; returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        loop {
            match self.rx.try_recv() {
                Ok(task) => {
                    task(&mut self.state);
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return ran,
            }
        }
    }

    /// Applies tasks as they arrive until `timeout` elapses.
    pub fn run_for(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut ran = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(task) => {
                    task(&mut self.state);
                    ran += 1;
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return ran
                }
            }
        }
    }

    pub fn state(&self) -> &UiState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut UiState {
        &mut self.state
    }
}
