// Pose landmarker platform integration
// Provides the landmarker seam and the default backend

pub mod mediapipe_bridge;

pub use mediapipe_bridge::{
    DefaultLandmarkerFactory, DummyLandmarkerFactory, EngineError, EngineResult, LandmarkerConfig,
    LandmarkerFactory, LandmarkerOutput, LiveStreamListener, PoseLandmarker,
};
