// MediaPipe pose landmarker integration
// Defines the seam a native landmarker implements (sync detect for single images,
// detect_async + listener for live streams) and a CPU placeholder backend

use crate::models::image::NormalizedFrame;
use crate::models::pose::{DetectionOptions, ExecutionTarget, RawLandmark, RunningMode};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Fully resolved landmarker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkerConfig {
    pub model_asset_path: PathBuf,
    pub execution_target: ExecutionTarget,
    pub min_detection_confidence: f32,
    pub min_presence_confidence: f32,
    pub min_tracking_confidence: f32,
    pub num_poses: u32,
    pub running_mode: RunningMode,
}

impl LandmarkerConfig {
    pub fn from_options(options: &DetectionOptions, model_asset_path: PathBuf) -> Self {
        Self {
            model_asset_path,
            execution_target: options.execution_target,
            min_detection_confidence: options.min_detection_confidence,
            min_presence_confidence: options.min_presence_confidence,
            min_tracking_confidence: options.min_tracking_confidence,
            num_poses: options.num_poses,
            running_mode: options.mode,
        }
    }
}

/// Raw landmarker output: one landmark list per detected pose
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkerOutput {
    pub poses: Vec<Vec<RawLandmark>>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Unsupported configuration: {0}")]
    Unsupported(String),

    #[error("Frame rejected: {0}")]
    Rejected(String),

    #[error("Landmarker failed: {0}")]
    Failed(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Receives live-stream completions. Called at most once per submitted frame,
/// on whatever thread the landmarker completes on.
pub trait LiveStreamListener: Send + Sync {
    fn on_result(&self, output: LandmarkerOutput, timestamp_ms: i64);

    fn on_error(&self, error: EngineError);
}

/// A constructed pose landmarker
pub trait PoseLandmarker: Send + Sync {
    /// Blocking detection, image running mode only
    fn detect(&self, frame: &NormalizedFrame) -> EngineResult<LandmarkerOutput>;

    /// Submit a frame for live-stream detection. An `Err` means the frame was
    /// rejected and no listener callback will follow.
    fn detect_async(&self, frame: NormalizedFrame) -> EngineResult<()>;

    /// Release native resources
    fn close(&self);

    /// Get model info
    fn model_info(&self) -> String;
}

/// Builds landmarkers; the listener is only supplied for stream running mode
pub trait LandmarkerFactory: Send + Sync {
    fn create(
        &self,
        config: &LandmarkerConfig,
        listener: Option<Arc<dyn LiveStreamListener>>,
    ) -> EngineResult<Box<dyn PoseLandmarker>>;
}

// ==============================================================================
// Dummy Implementation (no native landmarker linked)
// ==============================================================================

/// Placeholder backend that validates configuration and reports no poses
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyLandmarkerFactory;

impl LandmarkerFactory for DummyLandmarkerFactory {
    fn create(
        &self,
        config: &LandmarkerConfig,
        listener: Option<Arc<dyn LiveStreamListener>>,
    ) -> EngineResult<Box<dyn PoseLandmarker>> {
        if config.execution_target == ExecutionTarget::Accelerated {
            return Err(EngineError::Unsupported(
                "accelerated execution is not available without a native landmarker".to_string(),
            ));
        }

        if config.running_mode == RunningMode::Stream && listener.is_none() {
            return Err(EngineError::Unsupported(
                "stream running mode requires a result listener".to_string(),
            ));
        }

        tracing::warn!(
            "Using dummy pose landmarker for {:?} (no inference)",
            config.model_asset_path
        );

        Ok(Box::new(DummyLandmarker {
            config: config.clone(),
            listener,
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct DummyLandmarker {
    config: LandmarkerConfig,
    listener: Option<Arc<dyn LiveStreamListener>>,
    closed: AtomicBool,
}

impl DummyLandmarker {
    fn check_open(&self) -> EngineResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::Failed("landmarker is closed".to_string()));
        }
        Ok(())
    }
}

impl PoseLandmarker for DummyLandmarker {
    fn detect(&self, _frame: &NormalizedFrame) -> EngineResult<LandmarkerOutput> {
        self.check_open()?;
        if self.config.running_mode != RunningMode::Image {
            return Err(EngineError::Rejected(
                "detect requires image running mode".to_string(),
            ));
        }
        Ok(LandmarkerOutput::default())
    }

    fn detect_async(&self, frame: NormalizedFrame) -> EngineResult<()> {
        self.check_open()?;
        let listener = self.listener.as_ref().ok_or_else(|| {
            EngineError::Rejected("detect_async requires stream running mode".to_string())
        })?;

        listener.on_result(LandmarkerOutput::default(), frame.timestamp_ms());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn model_info(&self) -> String {
        format!(
            "Dummy pose landmarker ({:?}, {} mode) - link a native landmarker for inference",
            self.config.model_asset_path,
            self.config.running_mode.to_string()
        )
    }
}

pub type DefaultLandmarkerFactory = DummyLandmarkerFactory;
