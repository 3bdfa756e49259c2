// Request router for pose detection
// One PoseBridge per named detector: one-shot requests run synchronously
// through the adapter, streaming requests go through the frame slot and the
// polling driver.

use crate::core::config::BridgeConfig;
use crate::core::engine_adapter::{AdapterState, EngineAdapter};
use crate::core::frame_clock::FrameClock;
use crate::core::frame_slot::FrameSlot;
use crate::core::image_converter;
use crate::core::inference_gate::InferenceGate;
use crate::core::polling_driver::{DriverContext, PollingDriver};
use crate::core::result_channel::{Dispatcher, ResultChannel, ResultStream};
use crate::core::statistics::BridgeCounters;
use crate::models::image::{ImageData, NormalizedFrame};
use crate::models::pose::{
    BridgeError, BridgeResult, BridgeStatistics, DetectionOptions, LandmarkSet, RunningMode,
};
use crate::platform::pose::LandmarkerFactory;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Router state of a bridge instance
pub type BridgeState = AdapterState;

/// Reply to a start request
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// One-shot result
    Landmarks(LandmarkSet),
    /// Frame accepted; the result arrives on the event stream
    Accepted,
}

// ==============================================================================
// Pose Bridge
// ==============================================================================

pub struct PoseBridge {
    name: String,
    session_id: Uuid, // Distinguishes recreated instances of the same name
    config: BridgeConfig,
    clock: FrameClock,
    slot: Arc<FrameSlot>,
    gate: Arc<InferenceGate>,
    wake: Arc<Notify>,
    adapter: Arc<EngineAdapter>,
    results: Arc<ResultChannel>,
    counters: Arc<BridgeCounters>,
    shutdown: Arc<AtomicBool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl PoseBridge {
    pub fn new(
        name: impl Into<String>,
        config: BridgeConfig,
        factory: Arc<dyn LandmarkerFactory>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let counters = Arc::new(BridgeCounters::new());
        let results = ResultChannel::new(dispatcher, counters.clone());
        let adapter = Arc::new(EngineAdapter::new(
            factory,
            config.asset_dir.clone(),
            results.clone(),
            counters.clone(),
        ));
        let wake = Arc::new(Notify::new());

        Self {
            name: name.into(),
            session_id: Uuid::new_v4(),
            clock: FrameClock::new(),
            slot: Arc::new(FrameSlot::new()),
            gate: InferenceGate::new(wake.clone()),
            wake,
            adapter,
            results,
            counters,
            shutdown: Arc::new(AtomicBool::new(false)),
            driver: Mutex::new(None),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> BridgeState {
        self.adapter.state()
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Handle a start request.
    /// Image mode returns the landmarks; stream mode acknowledges and
    /// delivers the result on the event stream.
    pub async fn start(
        &self,
        image_data: ImageData,
        options: DetectionOptions,
    ) -> BridgeResult<StartOutcome> {
        if self.is_closed() {
            return Err(BridgeError::EngineClosed);
        }
        options.validate()?;

        // Cheap mode check before decoding; ensure_ready re-checks under its lock
        if let AdapterState::Ready(mode) = self.adapter.state() {
            if mode != options.mode {
                return Err(BridgeError::InvalidArgument(format!(
                    "Detector '{}' is configured for {} mode",
                    self.name,
                    mode.to_string()
                )));
            }
        }

        let image = tokio::task::spawn_blocking(move || image_converter::normalize(&image_data))
            .await
            .map_err(|e| BridgeError::Inference(format!("Image conversion task failed: {}", e)))??;

        let adapter = self.adapter.clone();
        let ready_options = options.clone();
        tokio::task::spawn_blocking(move || adapter.ensure_ready(&ready_options))
            .await
            .map_err(|e| BridgeError::EngineInit(format!("Engine setup task failed: {}", e)))??;

        match options.mode {
            RunningMode::Image => {
                let permit = self.gate.try_acquire().ok_or_else(|| {
                    BridgeError::Inference("inference already in progress".to_string())
                })?;

                let frame = NormalizedFrame::new(image, self.clock.next_timestamp());
                let adapter = self.adapter.clone();
                let result = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    adapter.detect_sync(&frame)
                })
                .await
                .map_err(|e| BridgeError::Inference(format!("Inference task failed: {}", e)))??;

                Ok(StartOutcome::Landmarks(result))
            }
            RunningMode::Stream => {
                self.ensure_driver()?;

                // Timestamped at hand-off, not on arrival: a slow decode must
                // not let an older request overtake a newer one
                let (_, superseded) = self.slot.submit_stamped(image, &self.clock);
                self.counters.record_frame_submitted(superseded);

                if self.is_closed() {
                    self.slot.clear();
                    return Err(BridgeError::EngineClosed);
                }

                self.wake.notify_one();
                Ok(StartOutcome::Accepted)
            }
        }
    }

    fn ensure_driver(&self) -> BridgeResult<()> {
        let mut driver = self.driver.lock().unwrap_or_else(|p| p.into_inner());
        if self.is_closed() {
            return Err(BridgeError::EngineClosed);
        }

        if driver.is_none() {
            *driver = Some(PollingDriver::spawn(DriverContext {
                slot: self.slot.clone(),
                gate: self.gate.clone(),
                adapter: self.adapter.clone(),
                wake: self.wake.clone(),
                shutdown: self.shutdown.clone(),
                poll_interval: self.config.poll_interval(),
                stall_warning: self.config.stall_warning(),
            }));
            tracing::debug!(
                "Started polling driver for detector '{}' ({})",
                self.name,
                self.session_id
            );
        }
        Ok(())
    }

    /// Attach the host's listener to the event stream
    pub fn subscribe(&self) -> ResultStream {
        self.results.subscribe()
    }

    pub fn unsubscribe(&self) {
        self.results.unsubscribe();
    }

    /// Tear down the bridge. Idempotent and never waits for in-flight work.
    pub fn close(&self) {
        let driver = {
            let mut driver = self.driver.lock().unwrap_or_else(|p| p.into_inner());
            if self.shutdown.swap(true, Ordering::AcqRel) {
                return;
            }
            driver.take()
        };

        self.results.close();
        self.adapter.close();
        self.slot.clear();
        self.wake.notify_one();

        // The driver exits on its own once it observes the shutdown flag
        drop(driver);

        tracing::info!("Closed pose detector '{}' ({})", self.name, self.session_id);
    }

    pub fn statistics(&self) -> BridgeStatistics {
        self.counters.snapshot()
    }

    pub fn model_info(&self) -> Option<String> {
        self.adapter.model_info()
    }
}

impl Drop for PoseBridge {
    fn drop(&mut self) {
        self.close();
    }
}

// ==============================================================================
// Bridge Registry
// ==============================================================================

/// Named bridge instances. A closed bridge stays closed until explicitly recreated.
pub struct BridgeRegistry {
    config: BridgeConfig,
    factory: Arc<dyn LandmarkerFactory>,
    dispatcher: Arc<dyn Dispatcher>,
    bridges: RwLock<HashMap<String, Arc<PoseBridge>>>,
}

impl BridgeRegistry {
    pub fn new(
        config: BridgeConfig,
        factory: Arc<dyn LandmarkerFactory>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            config,
            factory,
            dispatcher,
            bridges: RwLock::new(HashMap::new()),
        }
    }

    fn create(&self, name: &str) -> Arc<PoseBridge> {
        Arc::new(PoseBridge::new(
            name,
            self.config.clone(),
            self.factory.clone(),
            self.dispatcher.clone(),
        ))
    }

    pub async fn get(&self, name: &str) -> Option<Arc<PoseBridge>> {
        self.bridges.read().await.get(name).cloned()
    }

    /// Get a bridge by name, creating it on first use
    pub async fn get_or_create(&self, name: &str) -> Arc<PoseBridge> {
        if let Some(bridge) = self.get(name).await {
            return bridge;
        }

        let mut bridges = self.bridges.write().await;
        bridges
            .entry(name.to_string())
            .or_insert_with(|| self.create(name))
            .clone()
    }

    /// Replace a bridge with a fresh instance, closing the old one
    pub async fn recreate(&self, name: &str) -> Arc<PoseBridge> {
        let bridge = self.create(name);
        let previous = self
            .bridges
            .write()
            .await
            .insert(name.to_string(), bridge.clone());

        if let Some(previous) = previous {
            previous.close();
        }
        tracing::info!("Recreated pose detector '{}'", name);
        bridge
    }

    /// Close and forget a bridge
    pub async fn remove(&self, name: &str) -> bool {
        match self.bridges.write().await.remove(name) {
            Some(bridge) => {
                bridge.close();
                true
            }
            None => false,
        }
    }

    pub async fn close_all(&self) {
        for bridge in self.bridges.read().await.values() {
            bridge.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::result_channel::{InlineDispatcher, SerialDispatcher};
    use crate::core::test_support::{Completion, ScriptedEngine, TempAssets};
    use crate::models::image::{ImageMetadata, PixelFormat};
    use crate::models::pose::POSE_LANDMARK_COUNT;
    use std::time::Duration;

    fn rgba_image() -> ImageData {
        ImageData::Bytes {
            bytes: vec![0; 4 * 4 * 4],
            metadata: ImageMetadata {
                width: 4,
                height: 4,
                rotation: None,
                pixel_format: Some(PixelFormat::Rgba8888),
                bytes_per_row: None,
            },
        }
    }

    fn bridge(engine: &ScriptedEngine, assets: &TempAssets) -> PoseBridge {
        let mut config = BridgeConfig::with_asset_dir(assets.path());
        config.poll_interval_ms = 5;
        PoseBridge::new("test", config, engine.factory(), Arc::new(InlineDispatcher))
    }

    async fn next_result(stream: &mut ResultStream) -> LandmarkSet {
        tokio::time::timeout(Duration::from_secs(2), stream.recv())
            .await
            .expect("timed out waiting for result")
            .expect("stream ended")
    }

    #[tokio::test]
    async fn test_one_shot_returns_single_pose_with_defaults() {
        let assets = TempAssets::new();
        let engine = ScriptedEngine::new(Completion::Immediate);
        engine.omit_scores(true);
        let bridge = bridge(&engine, &assets);

        let outcome = bridge
            .start(rgba_image(), DetectionOptions::default())
            .await
            .unwrap();

        let set = match outcome {
            StartOutcome::Landmarks(set) => set,
            other => panic!("expected landmarks, got {:?}", other),
        };
        assert_eq!(set.poses.len(), 1);
        assert_eq!(set.poses[0].landmarks.len(), POSE_LANDMARK_COUNT);
        assert!(set.poses[0]
            .landmarks
            .iter()
            .all(|lm| lm.presence == 0.0 && lm.visibility == 0.0));
        assert_eq!(bridge.state(), BridgeState::Ready(RunningMode::Image));
        assert!(!bridge.gate.is_busy());
    }

    #[tokio::test]
    async fn test_one_shot_rejected_while_gate_busy() {
        let assets = TempAssets::new();
        let engine = ScriptedEngine::new(Completion::Immediate);
        let bridge = bridge(&engine, &assets);

        let permit = bridge.gate.try_acquire().unwrap();
        let result = bridge.start(rgba_image(), DetectionOptions::default()).await;
        assert!(matches!(result, Err(BridgeError::Inference(_))));

        drop(permit);
        assert!(bridge.start(rgba_image(), DetectionOptions::default()).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stream_then_image_request_is_invalid() {
        let assets = TempAssets::new();
        let engine = ScriptedEngine::new(Completion::Immediate);
        let bridge = bridge(&engine, &assets);

        let outcome = bridge
            .start(rgba_image(), DetectionOptions::streaming())
            .await
            .unwrap();
        assert_eq!(outcome, StartOutcome::Accepted);

        let result = bridge.start(rgba_image(), DetectionOptions::default()).await;
        assert!(matches!(result, Err(BridgeError::InvalidArgument(_))));
        assert_eq!(bridge.state(), BridgeState::Ready(RunningMode::Stream));
        assert_eq!(engine.created_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_three_rapid_frames_deliver_only_the_last() {
        let assets = TempAssets::new();
        let engine = ScriptedEngine::new(Completion::Immediate);
        let bridge = bridge(&engine, &assets);
        let mut stream = bridge.subscribe();

        // Simulate an inference still running from an earlier frame
        let permit = bridge.gate.try_acquire().unwrap();
        for _ in 0..3 {
            bridge
                .start(rgba_image(), DetectionOptions::streaming())
                .await
                .unwrap();
        }
        drop(permit);

        let set = next_result(&mut stream).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let submitted = engine.submitted();
        assert_eq!(submitted, vec![set.timestamp_ms]);
        assert!(stream.try_recv().is_err());

        let stats = bridge.statistics();
        assert_eq!(stats.frames_submitted, 3);
        assert_eq!(stats.frames_superseded, 2);
        assert_eq!(stats.results_delivered, 1);
    }

    fn nv21_image(width: u32, height: u32) -> ImageData {
        let luma = (width * height) as usize;
        let chroma = 2 * (width.div_ceil(2) * height.div_ceil(2)) as usize;
        ImageData::Bytes {
            bytes: vec![128; luma + chroma],
            metadata: ImageMetadata {
                width,
                height,
                rotation: None,
                pixel_format: None,
                bytes_per_row: None,
            },
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_starts_reach_engine_in_timestamp_order() {
        let assets = TempAssets::new();
        let engine = ScriptedEngine::new(Completion::Immediate);
        let bridge = bridge(&engine, &assets);
        let mut stream = bridge.subscribe();

        bridge
            .start(rgba_image(), DetectionOptions::streaming())
            .await
            .unwrap();
        engine.wait_for_submissions(1).await;

        // The large frame arrives first but finishes decoding last
        let large = bridge.start(nv21_image(2000, 2000), DetectionOptions::streaming());
        let small = async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            bridge
                .start(nv21_image(2, 2), DetectionOptions::streaming())
                .await
        };
        let (large, small) = tokio::join!(large, small);
        large.unwrap();
        small.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let submitted = engine.submitted();
        assert!(
            submitted.windows(2).all(|pair| pair[0] < pair[1]),
            "engine saw timestamps out of order: {:?}",
            submitted
        );

        let mut delivered = Vec::new();
        while let Ok(set) = stream.try_recv() {
            delivered.push(set.timestamp_ms);
        }
        assert_eq!(delivered, submitted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_engine_drops_intermediate_frames() {
        let assets = TempAssets::new();
        let engine = ScriptedEngine::new(Completion::Delayed(Duration::from_millis(100)));
        let bridge = bridge(&engine, &assets);
        let mut stream = bridge.subscribe();

        bridge
            .start(rgba_image(), DetectionOptions::streaming())
            .await
            .unwrap();
        engine.wait_for_submissions(1).await;

        // Three frames arrive while the first inference is still running
        for _ in 0..3 {
            bridge
                .start(rgba_image(), DetectionOptions::streaming())
                .await
                .unwrap();
        }

        let first = next_result(&mut stream).await;
        let second = next_result(&mut stream).await;
        let submitted = engine.submitted();

        assert_eq!(submitted.len(), 2);
        assert_eq!(first.timestamp_ms, submitted[0]);
        assert_eq!(second.timestamp_ms, submitted[1]);
        assert!(second.timestamp_ms > first.timestamp_ms);
        assert_eq!(bridge.statistics().frames_superseded, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_streaming_survives_engine_errors() {
        let assets = TempAssets::new();
        let engine = ScriptedEngine::new(Completion::Immediate);
        let bridge = bridge(&engine, &assets);
        let mut stream = bridge.subscribe();

        engine.fail_inference(true);
        bridge
            .start(rgba_image(), DetectionOptions::streaming())
            .await
            .unwrap();
        engine.wait_for_submissions(1).await;

        engine.fail_inference(false);
        bridge
            .start(rgba_image(), DetectionOptions::streaming())
            .await
            .unwrap();

        let set = next_result(&mut stream).await;
        assert_eq!(set.timestamp_ms, engine.submitted()[1]);
        assert_eq!(bridge.statistics().inference_failures, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_during_inflight_inference() {
        let assets = TempAssets::new();
        let engine = ScriptedEngine::new(Completion::Manual);
        let bridge = bridge(&engine, &assets);
        let mut stream = bridge.subscribe();

        bridge
            .start(rgba_image(), DetectionOptions::streaming())
            .await
            .unwrap();
        engine.wait_for_submissions(1).await;

        bridge.close();
        bridge.close();
        assert!(engine.complete_next());

        assert!(stream.recv().await.is_none());
        assert_eq!(bridge.statistics().results_delivered, 0);
        assert_eq!(bridge.statistics().results_discarded, 1);
        assert!(engine.is_closed());

        let result = bridge.start(rgba_image(), DetectionOptions::streaming()).await;
        assert!(matches!(result, Err(BridgeError::EngineClosed)));
        assert_eq!(bridge.state(), BridgeState::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_while_model_loads_fails_pending_start() {
        let assets = TempAssets::new();
        let engine = ScriptedEngine::new(Completion::Immediate);
        let bridge = Arc::new(bridge(&engine, &assets));
        let release = engine.block_creation();

        let starting = {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                bridge
                    .start(rgba_image(), DetectionOptions::streaming())
                    .await
            })
        };
        while engine.creation_started() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let closing = tokio::task::spawn_blocking({
            let bridge = bridge.clone();
            move || bridge.close()
        });
        tokio::time::timeout(Duration::from_secs(1), closing)
            .await
            .expect("close waited for the model load")
            .unwrap();

        release.send(()).unwrap();
        let result = starting.await.unwrap();
        assert!(matches!(result, Err(BridgeError::EngineClosed)));
        assert!(engine.is_closed());
        assert!(engine.submitted().is_empty());
        assert_eq!(bridge.state(), BridgeState::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_with_serial_dispatcher_discards_queued_delivery() {
        let assets = TempAssets::new();
        let engine = ScriptedEngine::new(Completion::Manual);
        let bridge = PoseBridge::new(
            "serial",
            BridgeConfig::with_asset_dir(assets.path()),
            engine.factory(),
            Arc::new(SerialDispatcher::spawn()),
        );
        let mut stream = bridge.subscribe();

        bridge
            .start(rgba_image(), DetectionOptions::streaming())
            .await
            .unwrap();
        engine.wait_for_submissions(1).await;
        assert!(engine.complete_next());
        bridge.close();

        // The result is either delivered before close or discarded, never after
        let stats = bridge.statistics();
        let mut received = 0;
        while let Some(_set) = stream.recv().await {
            received += 1;
        }
        assert!(received <= 1);
        assert_eq!(received as u64, stats.results_delivered);
    }

    #[tokio::test]
    async fn test_engine_init_failure_allows_retry() {
        let assets = TempAssets::new();
        let engine = ScriptedEngine::new(Completion::Immediate);
        engine.fail_creation(true);
        let bridge = bridge(&engine, &assets);

        let result = bridge.start(rgba_image(), DetectionOptions::default()).await;
        assert!(matches!(result, Err(BridgeError::EngineInit(_))));
        assert_eq!(bridge.state(), BridgeState::Uninitialized);

        engine.fail_creation(false);
        assert!(bridge.start(rgba_image(), DetectionOptions::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_image_data_is_rejected() {
        let assets = TempAssets::new();
        let engine = ScriptedEngine::new(Completion::Immediate);
        let bridge = bridge(&engine, &assets);

        let image = ImageData::Bytes {
            bytes: vec![0; 3],
            metadata: ImageMetadata {
                width: 4,
                height: 4,
                rotation: None,
                pixel_format: Some(PixelFormat::Rgba8888),
                bytes_per_row: None,
            },
        };
        let result = bridge.start(image, DetectionOptions::default()).await;
        assert!(matches!(result, Err(BridgeError::InvalidArgument(_))));
        assert_eq!(engine.created_count(), 0);
    }

    #[tokio::test]
    async fn test_registry_keeps_closed_bridge_until_recreated() {
        let assets = TempAssets::new();
        let engine = ScriptedEngine::new(Completion::Immediate);
        let registry = BridgeRegistry::new(
            BridgeConfig::with_asset_dir(assets.path()),
            engine.factory(),
            Arc::new(InlineDispatcher),
        );

        let bridge = registry.get_or_create("main").await;
        assert!(Arc::ptr_eq(&bridge, &registry.get_or_create("main").await));

        bridge.close();
        let same = registry.get_or_create("main").await;
        let result = same.start(rgba_image(), DetectionOptions::default()).await;
        assert!(matches!(result, Err(BridgeError::EngineClosed)));

        let fresh = registry.recreate("main").await;
        assert!(!fresh.is_closed());
        assert_ne!(fresh.session_id(), bridge.session_id());
        assert!(fresh.start(rgba_image(), DetectionOptions::default()).await.is_ok());

        assert!(registry.remove("main").await);
        assert!(fresh.is_closed());
        assert!(registry.get("main").await.is_none());
    }
}
