mod render;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use clap::Parser;

use facelens_core::camera::infrastructure::image_sequence_camera::ImageSequenceCamera;
use facelens_core::detection::domain::detection_result::DetectionResult;
use facelens_core::detection::domain::face_detector::{
    DetectionCallback, DetectorError, DetectorProfile, FaceDetectorService,
};
use facelens_core::detection::domain::mode::{ModeCell, VisionMode};
use facelens_core::detection::infrastructure::detector_adapter::AsyncDetectorAdapter;
use facelens_core::detection::infrastructure::onnx_face_detector::OnnxFaceDetector;
use facelens_core::pipeline::frame_analysis_controller::{
    CaptureFlowError, FrameAnalysisController,
};
use facelens_core::pipeline::image_processor::ImageProcessor;
use facelens_core::pipeline::pipeline_logger::{PipelineLogger, StdoutPipelineLogger};
use facelens_core::pipeline::ui_context::{UiLoop, UiState};
use facelens_core::shared::constants::IMAGE_EXTENSIONS;
use facelens_core::shared::frame::{Frame, Rotation};
use facelens_core::shared::settings::AppSettings;

/// How long the main thread waits for UI work before checking on the camera.
const UI_TICK: Duration = Duration::from_millis(15);

/// Poll interval while waiting for the feed to reach the capture frame.
const DRIVER_POLL: Duration = Duration::from_millis(5);

/// Replays still images as a live front-camera feed through face analysis.
#[derive(Parser)]
#[command(name = "facelens")]
struct Cli {
    /// Image files or directories of images, played in order as camera frames.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// YOLO face model (ONNX, 5 landmarks). Required for face and contour modes.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Vision mode: none, face, contour, mesh or selfie.
    #[arg(long)]
    mode: Option<VisionMode>,

    /// Playback rate of the simulated camera.
    #[arg(long, default_value = "30")]
    fps: f64,

    /// Sensor rotation attached to every frame (0, 90, 180 or 270).
    #[arg(long, default_value = "0")]
    rotation: u32,

    /// Width of the hosting view in pixels.
    #[arg(long)]
    view_width: Option<u32>,

    /// Height of the hosting view in pixels.
    #[arg(long)]
    view_height: Option<u32>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Take a still picture once this many frames have been shown.
    #[arg(long)]
    capture_after: Option<usize>,

    /// Write the captured still, as the view shows it, to this PNG.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Keep replaying the inputs until the capture completes.
    #[arg(long = "loop")]
    looping: bool,

    /// Store the effective settings as the new defaults.
    #[arg(long)]
    save_settings: bool,
}

/// Stand-in detector when no model is configured; only modes that never
/// call the detector can run with it.
struct NoModel;

impl FaceDetectorService for NoModel {
    fn process(&self, _image: Arc<Frame>, _profile: DetectorProfile, on_complete: DetectionCallback) {
        on_complete(Err(DetectorError::ModelLoad("no face model configured".into())));
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = effective_settings(&cli, AppSettings::load());
    validate(&cli, &settings)?;

    if cli.save_settings {
        settings.save()?;
        if let Some(path) = AppSettings::config_path() {
            log::info!("Settings saved to {}", path.display());
        }
    }

    let rotation = Rotation::try_from(cli.rotation)?;
    let frames = collect_frames(&cli.inputs)?;
    let detector = build_detector(&settings)?;

    let mode = ModeCell::new(settings.default_mode);
    let (mut ui_loop, ui) = UiLoop::new(
        mode.clone(),
        f64::from(settings.view_width),
        f64::from(settings.view_height),
    );
    let adapter =
        AsyncDetectorAdapter::new(detector).with_poll_interval(settings.callback_poll_interval());
    let logger = Arc::new(Mutex::new(StdoutPipelineLogger::new()));
    let controller = Arc::new(
        FrameAnalysisController::new(
            ImageProcessor::new(adapter, ui.clone()),
            mode,
            ui,
            logger.clone(),
        )
        .with_capture_poll_interval(settings.capture_poll_interval())
        .with_callback_poll_interval(settings.callback_poll_interval()),
    );

    let camera = ImageSequenceCamera::open(&frames, rotation, cli.fps)?.looping(cli.looping);
    log::info!(
        "Playing {} frame(s) at {} fps in {} mode",
        frames.len(),
        cli.fps,
        settings.default_mode
    );

    let driver = spawn_driver(camera, controller.clone(), cli.capture_after);
    while !driver.is_finished() {
        ui_loop.run_for(UI_TICK);
    }
    let outcome = driver.join().map_err(|_| "camera driver thread panicked")?;

    // Apply the captured result before shutdown cancels anything still queued.
    ui_loop.run_pending();
    controller.shutdown();
    ui_loop.run_pending();

    {
        let logger = logger.lock().map_err(|_| "pipeline logger poisoned")?;
        logger.summary();
    }

    if let Some(result) = outcome? {
        log::info!("Captured still: {} face(s)", result.count());
        if let Some(output) = &cli.output {
            export_capture(ui_loop.state(), output)?;
            log::info!("Output written to {}", output.display());
        }
    }

    Ok(())
}

/// Layers command-line overrides over the stored settings.
fn effective_settings(cli: &Cli, mut settings: AppSettings) -> AppSettings {
    if let Some(mode) = cli.mode {
        settings.default_mode = mode;
    }
    if let Some(confidence) = cli.confidence {
        settings.confidence = confidence;
    }
    if let Some(w) = cli.view_width {
        settings.view_width = w;
    }
    if let Some(h) = cli.view_height {
        settings.view_height = h;
    }
    if let Some(model) = &cli.model {
        settings.model_path = Some(model.clone());
    }
    settings
}

fn validate(cli: &Cli, settings: &AppSettings) -> Result<(), Box<dyn std::error::Error>> {
    for input in &cli.inputs {
        if !input.exists() {
            return Err(format!("Input not found: {}", input.display()).into());
        }
    }
    if !(0.0..=1.0).contains(&settings.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            settings.confidence
        )
        .into());
    }
    if !(cli.fps.is_finite() && cli.fps > 0.0) {
        return Err(format!("Frame rate must be positive, got {}", cli.fps).into());
    }
    if settings.view_width == 0 || settings.view_height == 0 {
        return Err("View width and height must be positive".into());
    }
    Rotation::try_from(cli.rotation)?;
    if settings.default_mode.runs_detector() && settings.model_path.is_none() {
        return Err(format!("--model is required for {} mode", settings.default_mode).into());
    }
    if let Some(model) = &settings.model_path {
        if !model.exists() {
            return Err(format!("Model file not found: {}", model.display()).into());
        }
    }
    if cli.capture_after.is_none() {
        if cli.output.is_some() {
            return Err("--output requires --capture-after".into());
        }
        if cli.looping {
            return Err("--loop requires --capture-after".into());
        }
    }
    Ok(())
}

/// Expands directories into their images, sorted by file name.
fn collect_frames(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut frames = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file() && is_image(path))
                .collect();
            entries.sort();
            frames.extend(entries);
        } else {
            frames.push(input.clone());
        }
    }
    if frames.is_empty() {
        return Err("No images found in the given inputs".into());
    }
    Ok(frames)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn build_detector(
    settings: &AppSettings,
) -> Result<Arc<dyn FaceDetectorService>, Box<dyn std::error::Error>> {
    match &settings.model_path {
        Some(path) => Ok(Arc::new(OnnxFaceDetector::new(path, settings.confidence)?)),
        None => Ok(Arc::new(NoModel)),
    }
}

/// Plays the feed and, when asked, takes one still once enough frames
/// have been shown. Runs off the main thread, which drains the UI context.
fn spawn_driver(
    mut camera: ImageSequenceCamera,
    controller: Arc<FrameAnalysisController>,
    capture_after: Option<usize>,
) -> JoinHandle<Result<Option<DetectionResult>, CaptureFlowError>> {
    std::thread::spawn(move || {
        camera.start(controller.clone());
        let outcome = match capture_after {
            Some(n) => {
                while camera.delivered_frames() < n && !camera.is_finished() {
                    std::thread::sleep(DRIVER_POLL);
                }
                controller.capture_still(&camera).map(Some)
            }
            None => {
                camera.wait_until_finished();
                Ok(None)
            }
        };
        camera.stop();
        log::info!(
            "Camera delivered {} frame(s), {} buffer(s) released",
            camera.delivered_frames(),
            camera.released_frames()
        );
        outcome
    })
}

fn export_capture(state: &UiState, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let image = state
        .captured_image()
        .ok_or("No captured image to export")?;
    let canvas = render::compose(image, state.overlay())
        .ok_or("Cannot render capture: view or image has no area")?;
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    canvas.save(output)?;
    Ok(())
}
