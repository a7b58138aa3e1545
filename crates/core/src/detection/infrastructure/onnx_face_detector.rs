//! YOLO face detector service backed by ONNX Runtime via `ort`.
//!
//! Inference runs on a dedicated worker thread that owns the session;
//! callers enqueue requests through [`FaceDetectorService::process`] and
//! receive results through the request's completion callback.

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;

use crate::detection::domain::face_detector::{
    DetectedFace, DetectionCallback, DetectorError, DetectorProfile, FaceContour,
    FaceDetectorService,
};
use crate::shared::frame::Frame;
use crate::shared::geometry::{BoundingBox, Point};

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Keypoints per detection: 5 landmarks × (x, y, conf).
const NUM_KEYPOINTS: usize = 5;
const NUM_KEYPOINT_VALUES: usize = NUM_KEYPOINTS * 3;

/// Minimum keypoint confidence to report a landmark.
const KEYPOINT_CONF_THRESH: f64 = 0.5;

struct DetectJob {
    image: Arc<Frame>,
    profile: DetectorProfile,
    on_complete: DetectionCallback,
}

pub struct OnnxFaceDetector {
    job_tx: Option<Sender<DetectJob>>,
    worker: Option<JoinHandle<()>>,
}

impl OnnxFaceDetector {
    /// Loads the model and starts the inference worker.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, DetectorError> {
        let model = YoloFaceModel::load(model_path, confidence)
            .map_err(|e| DetectorError::ModelLoad(format!("{}: {e}", model_path.display())))?;
        log::info!(
            "Loaded face model {} (input {}px)",
            model_path.display(),
            model.input_size
        );
        Ok(Self::spawn(model))
    }

    fn spawn(mut model: YoloFaceModel) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<DetectJob>();
        let worker = std::thread::spawn(move || {
            for job in job_rx {
                let outcome = model
                    .detect(&job.image, job.profile)
                    .map_err(|e| DetectorError::Inference(e.to_string()));
                (job.on_complete)(outcome);
            }
        });
        Self {
            job_tx: Some(job_tx),
            worker: Some(worker),
        }
    }
}

impl FaceDetectorService for OnnxFaceDetector {
    fn process(&self, image: Arc<Frame>, profile: DetectorProfile, on_complete: DetectionCallback) {
        let Some(tx) = &self.job_tx else {
            on_complete(Err(DetectorError::ShutDown));
            return;
        };
        let job = DetectJob {
            image,
            profile,
            on_complete,
        };
        if let Err(crossbeam_channel::SendError(job)) = tx.send(job) {
            (job.on_complete)(Err(DetectorError::ShutDown));
        }
    }
}

impl Drop for OnnxFaceDetector {
    fn drop(&mut self) {
        // Closing the queue lets the worker finish pending jobs and exit.
        self.job_tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Face detector worker panicked");
            }
        }
    }
}

struct YoloFaceModel {
    session: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl YoloFaceModel {
    /// The input resolution is read from the model's input shape (NCHW),
    /// falling back to 640 when the shape is dynamic.
    fn load(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }

    fn detect(
        &mut self,
        frame: &Frame,
        profile: DetectorProfile,
    ) -> Result<Vec<DetectedFace>, Box<dyn std::error::Error>> {
        if frame.channels() != 3 {
            return Err(format!("expected RGB input, got {} channels", frame.channels()).into());
        }
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }

        let (input_tensor, letterbox) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("face model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let mut raw = decode_rows(data, &shape, self.confidence, &letterbox)?;
        let kept = nms(&mut raw, NMS_IOU_THRESH);

        Ok(kept
            .into_iter()
            .map(|d| to_face(d, profile))
            .collect())
    }
}

/// Hardware acceleration where the platform offers it; CPU otherwise.
fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn to_image(self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

/// Letterbox-resize a frame to `target_size` × `target_size` NCHW float32.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padding uses the 114/255 gray the YOLO family is trained with.
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    )
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
    keypoints: Vec<(f64, f64)>,
}

impl RawDetection {
    fn bbox(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Parses model output rows `[cx, cy, w, h, conf, kp0_x, kp0_y, kp0_conf, ...]`
/// into image-space detections above `confidence`.
///
/// Accepts both `[1, features, detections]` and `[1, detections, features]`.
fn decode_rows(
    data: &[f32],
    shape: &[usize],
    confidence: f64,
    letterbox: &Letterbox,
) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
    if shape.len() != 3 {
        return Err(format!("Unexpected face model output shape: {shape:?}").into());
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if data.len() < num_dets * num_feats {
        return Err("face model output shorter than its shape".into());
    }

    let mut dets = Vec::new();
    for i in 0..num_dets {
        let row: Vec<f32> = if transposed {
            (0..num_feats).map(|f| data[f * num_dets + i]).collect()
        } else {
            data[i * num_feats..(i + 1) * num_feats].to_vec()
        };
        if row.len() < 5 {
            continue;
        }
        let conf = row[4] as f64;
        if conf < confidence {
            continue;
        }

        let (cx, cy, w, h) = (row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64);
        let (x1, y1) = letterbox.to_image(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_image(cx + w / 2.0, cy + h / 2.0);

        let mut keypoints = Vec::new();
        if row.len() >= 5 + NUM_KEYPOINT_VALUES {
            for k in 0..NUM_KEYPOINTS {
                let base = 5 + k * 3;
                if row[base + 2] as f64 >= KEYPOINT_CONF_THRESH {
                    keypoints.push(letterbox.to_image(row[base] as f64, row[base + 1] as f64));
                }
            }
        }

        dets.push(RawDetection {
            x1,
            y1,
            x2,
            y2,
            confidence: conf,
            keypoints,
        });
    }
    Ok(dets)
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if !suppressed[j] && bbox_iou(&dets[i].bbox(), &dets[j].bbox()) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

/// IoU between two boxes represented as `[x1, y1, x2, y2]`.
fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

fn to_face(det: RawDetection, profile: DetectorProfile) -> DetectedFace {
    let face = DetectedFace::new(BoundingBox::new(det.x1, det.y1, det.x2, det.y2));
    if !profile.includes_contours() || det.keypoints.is_empty() {
        return face;
    }
    let landmarks = FaceContour {
        points: det
            .keypoints
            .iter()
            .map(|&(x, y)| Point::new(x, y))
            .collect(),
    };
    face.with_contours(vec![landmarks])
}
