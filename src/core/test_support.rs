// Scripted landmarker and temporary assets for unit tests

use crate::models::image::NormalizedFrame;
use crate::models::pose::{PoseModel, RawLandmark, RunningMode, POSE_LANDMARK_COUNT};
use crate::platform::pose::{
    EngineError, EngineResult, LandmarkerConfig, LandmarkerFactory, LandmarkerOutput,
    LiveStreamListener, PoseLandmarker,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

/// When a streaming submission completes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Completion {
    /// Listener is called before detect_async returns
    Immediate,
    /// Listener is called from a foreign thread after the latency
    Delayed(Duration),
    /// Test drives completion with `complete_next`
    Manual,
}

type PendingCompletion = (i64, Arc<dyn LiveStreamListener>);

struct ScriptState {
    completion: Completion,
    reject_submissions: AtomicBool,
    fail_inference: AtomicBool,
    fail_creation: AtomicBool,
    omit_scores: AtomicBool,
    submitted: Mutex<Vec<i64>>,
    pending: Mutex<Vec<PendingCompletion>>,
    creating: AtomicUsize,
    creation_gate: Mutex<Option<mpsc::Receiver<()>>>,
    created: AtomicUsize,
    closed: AtomicBool,
    last_config: Mutex<Option<LandmarkerConfig>>,
}

/// Shared handle to a scripted engine; clones observe the same state
#[derive(Clone)]
pub struct ScriptedEngine {
    state: Arc<ScriptState>,
}

impl ScriptedEngine {
    pub fn new(completion: Completion) -> Self {
        Self {
            state: Arc::new(ScriptState {
                completion,
                reject_submissions: AtomicBool::new(false),
                fail_inference: AtomicBool::new(false),
                fail_creation: AtomicBool::new(false),
                omit_scores: AtomicBool::new(false),
                submitted: Mutex::new(Vec::new()),
                pending: Mutex::new(Vec::new()),
                creating: AtomicUsize::new(0),
                creation_gate: Mutex::new(None),
                created: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                last_config: Mutex::new(None),
            }),
        }
    }

    pub fn factory(&self) -> Arc<dyn LandmarkerFactory> {
        Arc::new(self.clone())
    }

    /// Hold the next `create` until the returned sender fires or is dropped
    pub fn block_creation(&self) -> mpsc::Sender<()> {
        let (tx, rx) = mpsc::channel();
        *self.state.creation_gate.lock().unwrap() = Some(rx);
        tx
    }

    /// Number of `create` calls entered, including blocked ones
    pub fn creation_started(&self) -> usize {
        self.state.creating.load(Ordering::SeqCst)
    }

    pub fn reject_submissions(&self, on: bool) {
        self.state.reject_submissions.store(on, Ordering::SeqCst);
    }

    pub fn fail_inference(&self, on: bool) {
        self.state.fail_inference.store(on, Ordering::SeqCst);
    }

    pub fn fail_creation(&self, on: bool) {
        self.state.fail_creation.store(on, Ordering::SeqCst);
    }

    pub fn omit_scores(&self, on: bool) {
        self.state.omit_scores.store(on, Ordering::SeqCst);
    }

    /// Timestamps of every frame passed to detect_async
    pub fn submitted(&self) -> Vec<i64> {
        self.state.submitted.lock().unwrap().clone()
    }

    pub fn pending_count(&self) -> usize {
        self.state.pending.lock().unwrap().len()
    }

    pub fn created_count(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn last_config(&self) -> Option<LandmarkerConfig> {
        self.state.last_config.lock().unwrap().clone()
    }

    /// Complete the oldest manual submission. Returns false if none is pending.
    pub fn complete_next(&self) -> bool {
        let next = {
            let mut pending = self.state.pending.lock().unwrap();
            if pending.is_empty() {
                None
            } else {
                Some(pending.remove(0))
            }
        };

        match next {
            Some((timestamp_ms, listener)) => {
                self.finish(timestamp_ms, listener.as_ref());
                true
            }
            None => false,
        }
    }

    /// Wait until `count` frames have been submitted
    pub async fn wait_for_submissions(&self, count: usize) {
        for _ in 0..500 {
            if self.submitted().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("expected {} submissions, saw {:?}", count, self.submitted());
    }

    fn output(&self) -> LandmarkerOutput {
        let omit = self.state.omit_scores.load(Ordering::SeqCst);
        let pose = (0..POSE_LANDMARK_COUNT)
            .map(|i| RawLandmark {
                x: i as f32 / POSE_LANDMARK_COUNT as f32,
                y: 0.5,
                z: -0.1,
                presence: if omit { None } else { Some(0.9) },
                visibility: if omit { None } else { Some(0.8) },
            })
            .collect();
        LandmarkerOutput { poses: vec![pose] }
    }

    fn finish(&self, timestamp_ms: i64, listener: &dyn LiveStreamListener) {
        if self.state.fail_inference.load(Ordering::SeqCst) {
            listener.on_error(EngineError::Failed(format!("scripted failure at {}ms", timestamp_ms)));
        } else {
            listener.on_result(self.output(), timestamp_ms);
        }
    }
}

impl LandmarkerFactory for ScriptedEngine {
    fn create(
        &self,
        config: &LandmarkerConfig,
        listener: Option<Arc<dyn LiveStreamListener>>,
    ) -> EngineResult<Box<dyn PoseLandmarker>> {
        if self.state.fail_creation.load(Ordering::SeqCst) {
            return Err(EngineError::Unsupported("scripted creation failure".to_string()));
        }

        self.state.creating.fetch_add(1, Ordering::SeqCst);
        let gate = self.state.creation_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }

        self.state.created.fetch_add(1, Ordering::SeqCst);
        *self.state.last_config.lock().unwrap() = Some(config.clone());

        Ok(Box::new(ScriptedLandmarker {
            engine: self.clone(),
            listener,
            mode: config.running_mode,
        }))
    }
}

struct ScriptedLandmarker {
    engine: ScriptedEngine,
    listener: Option<Arc<dyn LiveStreamListener>>,
    mode: RunningMode,
}

impl PoseLandmarker for ScriptedLandmarker {
    fn detect(&self, _frame: &NormalizedFrame) -> EngineResult<LandmarkerOutput> {
        assert_eq!(self.mode, RunningMode::Image);
        if self.engine.state.fail_inference.load(Ordering::SeqCst) {
            return Err(EngineError::Failed("scripted failure".to_string()));
        }
        Ok(self.engine.output())
    }

    fn detect_async(&self, frame: NormalizedFrame) -> EngineResult<()> {
        let timestamp_ms = frame.timestamp_ms();
        self.engine.state.submitted.lock().unwrap().push(timestamp_ms);

        if self.engine.state.reject_submissions.load(Ordering::SeqCst) {
            return Err(EngineError::Rejected("scripted rejection".to_string()));
        }

        let listener = self
            .listener
            .clone()
            .ok_or_else(|| EngineError::Rejected("not in stream mode".to_string()))?;

        match self.engine.state.completion {
            Completion::Immediate => self.engine.finish(timestamp_ms, listener.as_ref()),
            Completion::Delayed(latency) => {
                let engine = self.engine.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(latency);
                    engine.finish(timestamp_ms, listener.as_ref());
                });
            }
            Completion::Manual => {
                self.engine.state.pending.lock().unwrap().push((timestamp_ms, listener));
            }
        }
        Ok(())
    }

    fn close(&self) {
        self.engine.state.closed.store(true, Ordering::SeqCst);
    }

    fn model_info(&self) -> String {
        "Scripted pose landmarker".to_string()
    }
}

/// Temporary model asset directory holding all three variants
pub struct TempAssets {
    dir: PathBuf,
}

impl TempAssets {
    pub fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("pose_bridge_assets_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for model in [PoseModel::Lite, PoseModel::Full, PoseModel::Heavy] {
            std::fs::write(dir.join(model.asset_file_name()), b"model").unwrap();
        }
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl Drop for TempAssets {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// Small solid-color RGBA frame
pub fn test_frame(timestamp_ms: i64) -> NormalizedFrame {
    NormalizedFrame::new(image::RgbaImage::new(8, 8), timestamp_ms)
}
