// Non-blocking mutual exclusion around the pose landmarker

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Idle/busy flag guarding the engine. Acquiring never waits; the returned
/// permit is the only way to hold the gate and releases it when dropped.
#[derive(Debug)]
pub struct InferenceGate {
    busy: AtomicBool,
    busy_since: Mutex<Option<Instant>>,
    wake: Arc<Notify>,
}

impl InferenceGate {
    /// Create an idle gate that signals `wake` whenever it is released
    pub fn new(wake: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            busy: AtomicBool::new(false),
            busy_since: Mutex::new(None),
            wake,
        })
    }

    /// Transition idle -> busy. Returns None if the gate is already busy.
    pub fn try_acquire(self: &Arc<Self>) -> Option<GatePermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        *self.busy_since.lock().unwrap_or_else(|p| p.into_inner()) = Some(Instant::now());
        Some(GatePermit { gate: self.clone() })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// How long the current holder has kept the gate, if busy
    pub fn busy_for(&self) -> Option<Duration> {
        self.busy_since
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .map(|since| since.elapsed())
    }

    fn release(&self) {
        *self.busy_since.lock().unwrap_or_else(|p| p.into_inner()) = None;
        self.busy.store(false, Ordering::Release);
        self.wake.notify_one();
    }
}

/// Proof of holding the gate. Dropping it releases the gate exactly once.
#[derive(Debug)]
pub struct GatePermit {
    gate: Arc<InferenceGate>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}
