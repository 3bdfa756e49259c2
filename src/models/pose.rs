// Data models for pose landmark detection: options, results, errors

use serde::{Deserialize, Serialize};

/// Number of landmarks the pose landmarker reports for every detected pose
pub const POSE_LANDMARK_COUNT: usize = 33;

// ==============================================================================
// Landmark Set (Unified Result)
// ==============================================================================

/// Landmarks produced by one completed inference call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandmarkSet {
    pub timestamp_ms: i64, // Capture timestamp of the processed frame
    pub poses: Vec<Pose>,  // Detection order, not a ranking
}

impl LandmarkSet {
    pub fn new(timestamp_ms: i64, poses: Vec<Pose>) -> Self {
        Self { timestamp_ms, poses }
    }

    /// Build a landmark set from raw engine output, filling omitted
    /// presence/visibility scores with 0.0
    pub fn from_engine(timestamp_ms: i64, raw_poses: Vec<Vec<RawLandmark>>) -> Self {
        let poses = raw_poses
            .into_iter()
            .map(|raw| Pose {
                landmarks: raw
                    .into_iter()
                    .enumerate()
                    .map(|(index, lm)| Landmark {
                        index,
                        x: lm.x,
                        y: lm.y,
                        z: lm.z,
                        presence: lm.presence.unwrap_or(0.0),
                        visibility: lm.visibility.unwrap_or(0.0),
                    })
                    .collect(),
            })
            .collect();

        Self { timestamp_ms, poses }
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}

/// One detected pose: an ordered list of body landmarks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pose {
    pub landmarks: Vec<Landmark>,
}

impl Pose {
    /// Look up a landmark by its body part
    pub fn landmark(&self, part: BodyLandmark) -> Option<&Landmark> {
        self.landmarks.get(part as usize)
    }
}

/// A single body keypoint measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub index: usize,
    pub x: f32, // Normalized [0, 1] image coordinates
    pub y: f32,
    pub z: f32, // Depth relative to the hip midpoint
    pub presence: f32,
    pub visibility: f32,
}

impl Landmark {
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility >= threshold
    }
}

/// Landmark as reported by the engine, before defaults are applied
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub presence: Option<f32>,
    pub visibility: Option<f32>,
}

/// MediaPipe Pose Landmark indices (33 total)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BodyLandmark {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl BodyLandmark {
    const ALL: [BodyLandmark; POSE_LANDMARK_COUNT] = [
        BodyLandmark::Nose,
        BodyLandmark::LeftEyeInner,
        BodyLandmark::LeftEye,
        BodyLandmark::LeftEyeOuter,
        BodyLandmark::RightEyeInner,
        BodyLandmark::RightEye,
        BodyLandmark::RightEyeOuter,
        BodyLandmark::LeftEar,
        BodyLandmark::RightEar,
        BodyLandmark::MouthLeft,
        BodyLandmark::MouthRight,
        BodyLandmark::LeftShoulder,
        BodyLandmark::RightShoulder,
        BodyLandmark::LeftElbow,
        BodyLandmark::RightElbow,
        BodyLandmark::LeftWrist,
        BodyLandmark::RightWrist,
        BodyLandmark::LeftPinky,
        BodyLandmark::RightPinky,
        BodyLandmark::LeftIndex,
        BodyLandmark::RightIndex,
        BodyLandmark::LeftThumb,
        BodyLandmark::RightThumb,
        BodyLandmark::LeftHip,
        BodyLandmark::RightHip,
        BodyLandmark::LeftKnee,
        BodyLandmark::RightKnee,
        BodyLandmark::LeftAnkle,
        BodyLandmark::RightAnkle,
        BodyLandmark::LeftHeel,
        BodyLandmark::RightHeel,
        BodyLandmark::LeftFootIndex,
        BodyLandmark::RightFootIndex,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

// ==============================================================================
// Detection Options
// ==============================================================================

/// Model variant, trading speed for accuracy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseModel {
    Lite,
    #[default]
    Full,
    Heavy,
}

impl PoseModel {
    /// File name of the bundled model asset
    pub fn asset_file_name(&self) -> &'static str {
        match self {
            PoseModel::Lite => "pose_landmarker_lite.task",
            PoseModel::Full => "pose_landmarker_full.task",
            PoseModel::Heavy => "pose_landmarker_heavy.task",
        }
    }

    pub fn to_string(&self) -> &'static str {
        match self {
            PoseModel::Lite => "lite",
            PoseModel::Full => "full",
            PoseModel::Heavy => "heavy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionTarget {
    #[default]
    #[serde(rename = "cpu", alias = "CPU")]
    Cpu,
    #[serde(rename = "accelerated", alias = "GPU", alias = "gpu")]
    Accelerated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunningMode {
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "stream", alias = "liveStream")]
    Stream,
}

impl RunningMode {
    pub fn to_string(&self) -> &'static str {
        match self {
            RunningMode::Image => "image",
            RunningMode::Stream => "stream",
        }
    }
}

/// Per-request detection options; fixed once the engine has been built from them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionOptions {
    #[serde(default)]
    pub model: PoseModel,
    #[serde(default, alias = "delegate")]
    pub execution_target: ExecutionTarget,
    #[serde(default = "default_confidence", alias = "minPoseDetectionConfidence")]
    pub min_detection_confidence: f32,
    #[serde(default = "default_confidence", alias = "minPosePresenceConfidence")]
    pub min_presence_confidence: f32,
    #[serde(default = "default_confidence")]
    pub min_tracking_confidence: f32,
    #[serde(default = "default_num_poses")]
    pub num_poses: u32,
    pub mode: RunningMode,
}

fn default_confidence() -> f32 {
    0.5
}

fn default_num_poses() -> u32 {
    1
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            model: PoseModel::Full,
            execution_target: ExecutionTarget::Cpu,
            min_detection_confidence: default_confidence(),
            min_presence_confidence: default_confidence(),
            min_tracking_confidence: default_confidence(),
            num_poses: default_num_poses(),
            mode: RunningMode::Image,
        }
    }
}

impl DetectionOptions {
    pub fn streaming() -> Self {
        Self {
            mode: RunningMode::Stream,
            ..Self::default()
        }
    }

    /// Validate option values
    pub fn validate(&self) -> BridgeResult<()> {
        let thresholds = [
            ("minDetectionConfidence", self.min_detection_confidence),
            ("minPresenceConfidence", self.min_presence_confidence),
            ("minTrackingConfidence", self.min_tracking_confidence),
        ];

        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(BridgeError::InvalidArgument(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }

        if self.num_poses == 0 {
            return Err(BridgeError::InvalidArgument(
                "numPoses must be a positive integer".to_string(),
            ));
        }

        Ok(())
    }

    /// Parse options from the host's JSON representation
    pub fn from_value(value: serde_json::Value) -> BridgeResult<Self> {
        let options: DetectionOptions = serde_json::from_value(value)
            .map_err(|e| BridgeError::InvalidArgument(format!("Invalid options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }
}

// ==============================================================================
// Statistics
// ==============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatistics {
    pub frames_submitted: u64,
    pub frames_superseded: u64,
    pub inferences_started: u64,
    pub results_delivered: u64,
    pub inference_failures: u64,
    pub results_discarded: u64,
}

// ==============================================================================
// Error Types
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Engine initialization failed: {0}")]
    EngineInit(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Pose detector has been closed")]
    EngineClosed,
}

impl BridgeError {
    /// Wire code reported to the host
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::InvalidArgument(_) => "INVALID_ARGUMENTS",
            BridgeError::EngineInit(_) => "ENGINE_INIT_ERROR",
            BridgeError::Inference(_) => "INFERENCE_ERROR",
            BridgeError::EngineClosed => "ENGINE_CLOSED",
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Structured error returned across the host boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl From<BridgeError> for ErrorPayload {
    fn from(err: BridgeError) -> Self {
        err.to_payload()
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
