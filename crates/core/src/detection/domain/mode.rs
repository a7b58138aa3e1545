use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// The user-selected analysis applied to live and captured frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VisionMode {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "face")]
    FaceDetection,
    #[serde(rename = "contour")]
    ContourDetection,
    #[serde(rename = "mesh")]
    MeshDetection,
    #[serde(rename = "selfie")]
    SelfieSegmentation,
}

impl VisionMode {
    pub const ALL: &[VisionMode] = &[
        VisionMode::None,
        VisionMode::FaceDetection,
        VisionMode::ContourDetection,
        VisionMode::MeshDetection,
        VisionMode::SelfieSegmentation,
    ];

    /// Modes whose live path dispatches frames to the face detector.
    pub fn runs_detector(self) -> bool {
        matches!(self, VisionMode::FaceDetection | VisionMode::ContourDetection)
    }

    /// Short identifier used in settings files and on the command line.
    pub fn key(self) -> &'static str {
        match self {
            VisionMode::None => "none",
            VisionMode::FaceDetection => "face",
            VisionMode::ContourDetection => "contour",
            VisionMode::MeshDetection => "mesh",
            VisionMode::SelfieSegmentation => "selfie",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            VisionMode::None => 0,
            VisionMode::FaceDetection => 1,
            VisionMode::ContourDetection => 2,
            VisionMode::MeshDetection => 3,
            VisionMode::SelfieSegmentation => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => VisionMode::FaceDetection,
            2 => VisionMode::ContourDetection,
            3 => VisionMode::MeshDetection,
            4 => VisionMode::SelfieSegmentation,
            _ => VisionMode::None,
        }
    }
}

impl std::fmt::Display for VisionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisionMode::None => write!(f, "None"),
            VisionMode::FaceDetection => write!(f, "Face Detection"),
            VisionMode::ContourDetection => write!(f, "Contour Detection"),
            VisionMode::MeshDetection => write!(f, "Mesh Detection"),
            VisionMode::SelfieSegmentation => write!(f, "Selfie Segmentation"),
        }
    }
}

impl FromStr for VisionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        VisionMode::ALL
            .iter()
            .copied()
            .find(|m| m.key() == wanted)
            .ok_or_else(|| {
                let keys: Vec<&str> = VisionMode::ALL.iter().map(|m| m.key()).collect();
                format!("unknown mode '{s}' (expected one of: {})", keys.join(", "))
            })
    }
}

/// Currently selected mode, shared between the UI and frame delivery.
///
/// Written only from the UI context; the frame callback only reads it.
#[derive(Clone, Debug, Default)]
pub struct ModeCell {
    value: Arc<AtomicU8>,
}

impl ModeCell {
    pub fn new(mode: VisionMode) -> Self {
        Self {
            value: Arc::new(AtomicU8::new(mode.to_u8())),
        }
    }

    pub fn get(&self) -> VisionMode {
        VisionMode::from_u8(self.value.load(Ordering::Acquire))
    }

    pub fn set(&self, mode: VisionMode) {
        self.value.store(mode.to_u8(), Ordering::Release);
    }
}
