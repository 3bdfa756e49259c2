// Streams synthetic camera frames through a pose bridge backed by a slow
// simulated landmarker, showing that only the latest frame is processed.
//
// cargo run --example stream_demo

use pose_bridge_lib::models::pose::RawLandmark;
use pose_bridge_lib::platform::pose::{
    EngineResult, LandmarkerConfig, LandmarkerFactory, LandmarkerOutput, LiveStreamListener,
    PoseLandmarker,
};
use pose_bridge_lib::{
    init_logging, BodyLandmark, BridgeConfig, DetectionOptions, ImageData, ImageMetadata,
    InlineDispatcher, NormalizedFrame, PixelFormat, PoseBridge, PoseModel,
};
use std::sync::Arc;
use std::time::Duration;

const INFERENCE_LATENCY: Duration = Duration::from_millis(60);
const FRAME_INTERVAL: Duration = Duration::from_millis(15);

/// Pretends to run a model: completes on its own thread after a fixed latency
struct SimulatedLandmarker {
    listener: Arc<dyn LiveStreamListener>,
}

impl PoseLandmarker for SimulatedLandmarker {
    fn detect(&self, _frame: &NormalizedFrame) -> EngineResult<LandmarkerOutput> {
        Ok(LandmarkerOutput::default())
    }

    fn detect_async(&self, frame: NormalizedFrame) -> EngineResult<()> {
        let listener = self.listener.clone();
        let timestamp_ms = frame.timestamp_ms();
        std::thread::spawn(move || {
            std::thread::sleep(INFERENCE_LATENCY);
            let pose = (0..33)
                .map(|i| RawLandmark {
                    x: 0.5,
                    y: i as f32 / 33.0,
                    z: 0.0,
                    presence: Some(0.95),
                    visibility: Some(0.9),
                })
                .collect();
            listener.on_result(LandmarkerOutput { poses: vec![pose] }, timestamp_ms);
        });
        Ok(())
    }

    fn close(&self) {}

    fn model_info(&self) -> String {
        "Simulated landmarker".to_string()
    }
}

struct SimulatedFactory;

impl LandmarkerFactory for SimulatedFactory {
    fn create(
        &self,
        config: &LandmarkerConfig,
        listener: Option<Arc<dyn LiveStreamListener>>,
    ) -> EngineResult<Box<dyn PoseLandmarker>> {
        tracing::info!("Loading {:?}", config.model_asset_path);
        let listener = listener.ok_or_else(|| {
            pose_bridge_lib::platform::pose::EngineError::Unsupported(
                "demo only supports streaming".to_string(),
            )
        })?;
        Ok(Box::new(SimulatedLandmarker { listener }))
    }
}

fn camera_frame(n: u8) -> ImageData {
    let (width, height) = (64u32, 48u32);
    ImageData::Bytes {
        bytes: vec![n; (width * height * 4) as usize],
        metadata: ImageMetadata {
            width,
            height,
            rotation: Some(90),
            pixel_format: Some(PixelFormat::Bgra8888),
            bytes_per_row: None,
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info");

    let asset_dir = std::env::temp_dir().join("pose_bridge_demo_assets");
    std::fs::create_dir_all(&asset_dir)?;
    std::fs::write(asset_dir.join(PoseModel::Lite.asset_file_name()), b"demo")?;

    let bridge = PoseBridge::new(
        "demo",
        BridgeConfig::with_asset_dir(&asset_dir),
        Arc::new(SimulatedFactory),
        Arc::new(InlineDispatcher),
    );
    let mut results = bridge.subscribe();

    let consumer = tokio::spawn(async move {
        while let Some(set) = results.recv().await {
            if set.is_empty() {
                tracing::info!("Result for frame {}ms, no pose", set.timestamp_ms);
                continue;
            }
            let nose = set
                .poses
                .first()
                .and_then(|pose| pose.landmark(BodyLandmark::Nose))
                .filter(|lm| lm.is_visible(0.5))
                .map(|lm| (lm.x, lm.y));
            tracing::info!("Result for frame {}ms, nose at {:?}", set.timestamp_ms, nose);
        }
    });

    let options = DetectionOptions {
        model: PoseModel::Lite,
        ..DetectionOptions::streaming()
    };

    for n in 0..40u8 {
        bridge.start(camera_frame(n), options.clone()).await?;
        tokio::time::sleep(FRAME_INTERVAL).await;
    }
    tokio::time::sleep(INFERENCE_LATENCY * 2).await;

    bridge.close();
    consumer.await?;

    let stats = bridge.statistics();
    tracing::info!(
        "Submitted {} frames, {} superseded, {} inferences, {} results delivered",
        stats.frames_submitted,
        stats.frames_superseded,
        stats.inferences_started,
        stats.results_delivered
    );

    std::fs::remove_dir_all(&asset_dir)?;
    Ok(())
}
