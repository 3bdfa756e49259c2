// Shared bridge counters

use crate::models::pose::BridgeStatistics;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated from the router, driver and completion paths
#[derive(Debug, Default)]
pub struct BridgeCounters {
    frames_submitted: AtomicU64,
    frames_superseded: AtomicU64,
    inferences_started: AtomicU64,
    results_delivered: AtomicU64,
    inference_failures: AtomicU64,
    results_discarded: AtomicU64,
}

impl BridgeCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame_submitted(&self, superseded: bool) {
        self.frames_submitted.fetch_add(1, Ordering::Relaxed);
        if superseded {
            self.frames_superseded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_inference_started(&self) {
        self.inferences_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_result_delivered(&self) {
        self.results_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference_failure(&self) {
        self.inference_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_result_discarded(&self) {
        self.results_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BridgeStatistics {
        BridgeStatistics {
            frames_submitted: self.frames_submitted.load(Ordering::Relaxed),
            frames_superseded: self.frames_superseded.load(Ordering::Relaxed),
            inferences_started: self.inferences_started.load(Ordering::Relaxed),
            results_delivered: self.results_delivered.load(Ordering::Relaxed),
            inference_failures: self.inference_failures.load(Ordering::Relaxed),
            results_discarded: self.results_discarded.load(Ordering::Relaxed),
        }
    }
}
