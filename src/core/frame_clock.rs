// Capture timestamps for submitted frames

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// Milliseconds since the owning bridge was created, strictly increasing
/// across calls so the landmarker never sees a repeated timestamp.
#[derive(Debug)]
pub struct FrameClock {
    origin: Instant,
    last_ms: AtomicI64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_ms: AtomicI64::new(-1),
        }
    }

    pub fn next_timestamp(&self) -> i64 {
        let now = self.origin.elapsed().as_millis() as i64;
        let previous = self
            .last_ms
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }
}
