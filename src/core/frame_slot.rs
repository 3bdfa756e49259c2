// Single-capacity frame mailbox: the most recent frame always wins

use crate::core::frame_clock::FrameClock;
use crate::models::image::NormalizedFrame;
use image::RgbaImage;
use std::sync::{Mutex, MutexGuard};

/// Holds at most one pending frame. Submitting while occupied replaces the
/// pending frame; superseded frames are dropped and never processed.
#[derive(Debug, Default)]
pub struct FrameSlot {
    pending: Mutex<Option<NormalizedFrame>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<NormalizedFrame>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a frame, replacing any pending one.
    /// Returns true if a pending frame was superseded.
    pub fn submit(&self, frame: NormalizedFrame) -> bool {
        Self::store(&mut self.lock(), frame)
    }

    /// Stamp an image with the next capture timestamp and store it.
    /// Stamping happens under the slot lock, so the pending frame always
    /// carries the newest timestamp handed out for this slot.
    /// Returns the timestamp and whether a pending frame was superseded.
    pub fn submit_stamped(&self, image: RgbaImage, clock: &FrameClock) -> (i64, bool) {
        let mut pending = self.lock();
        let timestamp_ms = clock.next_timestamp();
        let superseded = Self::store(&mut pending, NormalizedFrame::new(image, timestamp_ms));
        (timestamp_ms, superseded)
    }

    fn store(pending: &mut Option<NormalizedFrame>, frame: NormalizedFrame) -> bool {
        match pending.replace(frame) {
            Some(old) => {
                tracing::debug!("Superseded pending frame captured at {}ms", old.timestamp_ms());
                true
            }
            None => false,
        }
    }

    /// Take the pending frame, leaving the slot empty
    pub fn take_if_present(&self) -> Option<NormalizedFrame> {
        self.lock().take()
    }

    pub fn is_occupied(&self) -> bool {
        self.lock().is_some()
    }

    /// Drop any pending frame. Returns true if one was discarded.
    pub fn clear(&self) -> bool {
        self.lock().take().is_some()
    }
}
