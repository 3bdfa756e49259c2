// Background loop draining the frame slot into the landmarker

use crate::core::engine_adapter::EngineAdapter;
use crate::core::frame_slot::FrameSlot;
use crate::core::inference_gate::InferenceGate;
use crate::models::pose::BridgeError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Shared state the driver works on
pub struct DriverContext {
    pub slot: Arc<FrameSlot>,
    pub gate: Arc<InferenceGate>,
    pub adapter: Arc<EngineAdapter>,
    pub wake: Arc<Notify>,
    pub shutdown: Arc<AtomicBool>,
    pub poll_interval: Duration,
    pub stall_warning: Duration,
}

pub struct PollingDriver;

impl PollingDriver {
    /// Spawn the driver on the current tokio runtime. It runs until
    /// `shutdown` is set and `wake` is notified.
    pub fn spawn(ctx: DriverContext) -> JoinHandle<()> {
        tokio::spawn(async move {
            Self::run(ctx).await;
        })
    }

    async fn run(ctx: DriverContext) {
        tracing::debug!("Polling driver started");
        let mut stall_reported = false;

        loop {
            if ctx.shutdown.load(Ordering::Acquire) {
                break;
            }

            // Only touch the gate when there is work, so an idle driver never spins
            if ctx.slot.is_occupied() {
                if let Some(permit) = ctx.gate.try_acquire() {
                    stall_reported = false;
                    if let Some(frame) = ctx.slot.take_if_present() {
                        let timestamp_ms = frame.timestamp_ms();
                        match ctx.adapter.detect_async(frame, permit) {
                            Ok(()) => {}
                            Err(BridgeError::EngineClosed) => break,
                            Err(e) => {
                                tracing::error!("Dropping frame {}ms: {}", timestamp_ms, e);
                            }
                        }
                    }
                    continue;
                }
            }

            match ctx.gate.busy_for() {
                Some(held) if held >= ctx.stall_warning => {
                    if !stall_reported {
                        tracing::warn!(
                            "Inference has held the gate for {}ms; frames are being dropped until it completes",
                            held.as_millis()
                        );
                        stall_reported = true;
                    }
                }
                _ => stall_reported = false,
            }

            tokio::select! {
                _ = ctx.wake.notified() => {}
                _ = tokio::time::sleep(ctx.poll_interval) => {}
            }
        }

        if ctx.slot.clear() {
            tracing::debug!("Discarded pending frame on shutdown");
        }
        tracing::debug!("Polling driver stopped");
    }
}
