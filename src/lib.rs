pub mod core;
pub mod models;
pub mod platform;

pub use crate::core::config::{BridgeConfig, ConfigError};
pub use crate::core::method_channel::{MethodCall, MethodChannel, MethodResult};
pub use crate::core::pose_bridge::{BridgeRegistry, BridgeState, PoseBridge, StartOutcome};
pub use crate::core::result_channel::{Dispatcher, InlineDispatcher, ResultStream, SerialDispatcher};
pub use crate::models::image::{ImageData, ImageMetadata, NormalizedFrame, PixelFormat};
pub use crate::models::pose::{
    BodyLandmark, BridgeError, BridgeResult, BridgeStatistics, DetectionOptions, ErrorPayload,
    Landmark, LandmarkSet, Pose, PoseModel, RunningMode,
};

use crate::platform::pose::{DefaultLandmarkerFactory, LandmarkerFactory};
use std::sync::Arc;
use tracing::Level;

/// Install the fmt subscriber. Later calls are no-ops.
pub fn init_logging(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}

// Application state
pub struct AppState {
    pub config: BridgeConfig,
    pub channel: MethodChannel,
}

impl AppState {
    pub fn new(
        config: BridgeConfig,
        factory: Arc<dyn LandmarkerFactory>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let registry = Arc::new(BridgeRegistry::new(config.clone(), factory, dispatcher));
        Self {
            channel: MethodChannel::new(registry),
            config,
        }
    }

    /// Load the persisted configuration, start logging and build the state
    /// with the default landmarker backend
    pub fn load(dispatcher: Arc<dyn Dispatcher>) -> Result<Self, ConfigError> {
        let config = BridgeConfig::load()?;
        init_logging(&config.log_level);
        tracing::info!("Pose bridge using model assets in {:?}", config.asset_dir);

        Ok(Self::with_default_backend(config, dispatcher))
    }

    /// Build the state around the landmarker backend linked into this build
    pub fn with_default_backend(config: BridgeConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self::new(config, Arc::new(DefaultLandmarkerFactory::default()), dispatcher)
    }

    pub async fn handle(&self, call: MethodCall) -> MethodResult {
        self.channel.handle(call).await
    }

    /// Close every detector
    pub async fn shutdown(&self) {
        self.channel.registry().close_all().await;
    }
}
