// Detection engine adapter
// Owns the landmarker handle, builds it lazily from the first valid options,
// and guarantees the inference gate is released on every exit path.

use crate::core::inference_gate::GatePermit;
use crate::core::result_channel::ResultChannel;
use crate::core::statistics::BridgeCounters;
use crate::models::image::NormalizedFrame;
use crate::models::pose::{BridgeError, BridgeResult, DetectionOptions, LandmarkSet, RunningMode};
use crate::platform::pose::{
    EngineError, LandmarkerConfig, LandmarkerFactory, LandmarkerOutput, LiveStreamListener,
    PoseLandmarker,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Lifecycle of the adapter's engine handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Uninitialized,
    Ready(RunningMode),
    Closed,
}

enum EngineSlot {
    Unconstructed,
    Ready {
        landmarker: Arc<dyn PoseLandmarker>,
        options: DetectionOptions,
    },
    Closed,
}

/// Gate permit parked while a streaming inference is in flight
#[derive(Debug, Default)]
struct InFlight {
    permit: Mutex<Option<GatePermit>>,
}

impl InFlight {
    fn park(&self, permit: GatePermit) {
        let previous = self
            .permit
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .replace(permit);
        if previous.is_some() {
            tracing::error!("Parked a gate permit while another was in flight");
        }
    }

    /// Take and drop the parked permit, releasing the gate
    fn release(&self) -> bool {
        let permit = self.permit.lock().unwrap_or_else(|p| p.into_inner()).take();
        permit.is_some()
    }
}

/// Completion listener registered with a streaming landmarker
struct StreamListener {
    in_flight: Arc<InFlight>,
    results: Arc<ResultChannel>,
    counters: Arc<BridgeCounters>,
}

impl LiveStreamListener for StreamListener {
    fn on_result(&self, output: LandmarkerOutput, timestamp_ms: i64) {
        self.results
            .deliver(LandmarkSet::from_engine(timestamp_ms, output.poses));
        self.in_flight.release();
    }

    fn on_error(&self, error: EngineError) {
        tracing::warn!("Streaming inference failed, continuing: {}", error);
        self.counters.record_inference_failure();
        self.in_flight.release();
    }
}

pub struct EngineAdapter {
    factory: Arc<dyn LandmarkerFactory>,
    asset_dir: PathBuf,
    engine: Mutex<EngineSlot>,
    building: Mutex<()>,
    in_flight: Arc<InFlight>,
    results: Arc<ResultChannel>,
    counters: Arc<BridgeCounters>,
}

impl EngineAdapter {
    pub fn new(
        factory: Arc<dyn LandmarkerFactory>,
        asset_dir: impl Into<PathBuf>,
        results: Arc<ResultChannel>,
        counters: Arc<BridgeCounters>,
    ) -> Self {
        Self {
            factory,
            asset_dir: asset_dir.into(),
            engine: Mutex::new(EngineSlot::Unconstructed),
            building: Mutex::new(()),
            in_flight: Arc::new(InFlight::default()),
            results,
            counters,
        }
    }

    fn lock_engine(&self) -> MutexGuard<'_, EngineSlot> {
        self.engine.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> AdapterState {
        match &*self.lock_engine() {
            EngineSlot::Unconstructed => AdapterState::Uninitialized,
            EngineSlot::Ready { options, .. } => AdapterState::Ready(options.mode),
            EngineSlot::Closed => AdapterState::Closed,
        }
    }

    /// Resolve the model asset file for a variant
    pub fn resolve_model_asset(asset_dir: &Path, options: &DetectionOptions) -> BridgeResult<PathBuf> {
        let path = asset_dir.join(options.model.asset_file_name());
        if !path.is_file() {
            return Err(BridgeError::EngineInit(format!(
                "Model asset not found: {}",
                path.display()
            )));
        }
        Ok(path)
    }

    /// Build the landmarker on first use; later calls reuse it.
    /// Blocks while the model loads. The engine lock is not held during the
    /// load, so `close` never waits on it.
    pub fn ensure_ready(&self, options: &DetectionOptions) -> BridgeResult<()> {
        let _building = self.building.lock().unwrap_or_else(|p| p.into_inner());
        if Self::check_configured(&self.lock_engine(), options)? {
            return Ok(());
        }

        let model_path = Self::resolve_model_asset(&self.asset_dir, options)?;
        let config = LandmarkerConfig::from_options(options, model_path);

        let listener: Option<Arc<dyn LiveStreamListener>> = match options.mode {
            RunningMode::Image => None,
            RunningMode::Stream => Some(Arc::new(StreamListener {
                in_flight: self.in_flight.clone(),
                results: self.results.clone(),
                counters: self.counters.clone(),
            })),
        };

        let landmarker: Arc<dyn PoseLandmarker> = self
            .factory
            .create(&config, listener)
            .map_err(|e| BridgeError::EngineInit(e.to_string()))?
            .into();

        let mut engine = self.lock_engine();
        if matches!(*engine, EngineSlot::Closed) {
            tracing::debug!("Adapter closed while the landmarker was loading");
            drop(engine);
            landmarker.close();
            return Err(BridgeError::EngineClosed);
        }

        tracing::info!(
            "Pose landmarker ready: model={}, target={:?}, mode={}",
            options.model.to_string(),
            options.execution_target,
            options.mode.to_string()
        );

        *engine = EngineSlot::Ready {
            landmarker,
            options: options.clone(),
        };
        Ok(())
    }

    /// `Ok(true)` when a compatible landmarker is already installed
    fn check_configured(engine: &EngineSlot, options: &DetectionOptions) -> BridgeResult<bool> {
        match engine {
            EngineSlot::Closed => Err(BridgeError::EngineClosed),
            EngineSlot::Unconstructed => Ok(false),
            EngineSlot::Ready { options: configured, .. } => {
                if configured.mode != options.mode {
                    return Err(BridgeError::InvalidArgument(format!(
                        "Detector is configured for {} mode, cannot run in {} mode",
                        configured.mode.to_string(),
                        options.mode.to_string()
                    )));
                }
                if configured != options {
                    tracing::debug!("Ignoring changed detection options, landmarker is already built");
                }
                Ok(true)
            }
        }
    }

    fn landmarker_for(&self, mode: RunningMode) -> BridgeResult<Arc<dyn PoseLandmarker>> {
        match &*self.lock_engine() {
            EngineSlot::Closed => Err(BridgeError::EngineClosed),
            EngineSlot::Unconstructed => Err(BridgeError::Inference(
                "Pose landmarker has not been initialized".to_string(),
            )),
            EngineSlot::Ready { landmarker, options } => {
                if options.mode != mode {
                    return Err(BridgeError::InvalidArgument(format!(
                        "Detector is configured for {} mode",
                        options.mode.to_string()
                    )));
                }
                Ok(landmarker.clone())
            }
        }
    }

    /// Blocking single-image detection. The caller holds the gate for the duration.
    pub fn detect_sync(&self, frame: &NormalizedFrame) -> BridgeResult<LandmarkSet> {
        let landmarker = self.landmarker_for(RunningMode::Image)?;
        self.counters.record_inference_started();

        match landmarker.detect(frame) {
            Ok(output) => Ok(LandmarkSet::from_engine(frame.timestamp_ms(), output.poses)),
            Err(e) => {
                self.counters.record_inference_failure();
                Err(BridgeError::Inference(e.to_string()))
            }
        }
    }

    /// Submit a frame for streaming detection. The permit stays parked until
    /// the completion listener fires, or is released here if the engine
    /// rejects the frame outright.
    pub fn detect_async(&self, frame: NormalizedFrame, permit: GatePermit) -> BridgeResult<()> {
        let landmarker = self.landmarker_for(RunningMode::Stream)?;
        let timestamp_ms = frame.timestamp_ms();

        self.in_flight.park(permit);
        self.counters.record_inference_started();

        if let Err(e) = landmarker.detect_async(frame) {
            self.in_flight.release();
            self.counters.record_inference_failure();
            return Err(BridgeError::Inference(format!(
                "Frame {}ms rejected: {}",
                timestamp_ms, e
            )));
        }
        Ok(())
    }

    /// Release the engine. Does not wait for in-flight work.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.lock_engine(), EngineSlot::Closed);
        if let EngineSlot::Ready { landmarker, .. } = previous {
            landmarker.close();
        }
        if self.in_flight.release() {
            tracing::debug!("Released gate held by in-flight inference on close");
        }
    }

    pub fn model_info(&self) -> Option<String> {
        match &*self.lock_engine() {
            EngineSlot::Ready { landmarker, .. } => Some(landmarker.model_info()),
            _ => None,
        }
    }
}
