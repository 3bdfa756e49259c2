// Result delivery for streaming sessions
// Completions arrive on arbitrary engine threads and are re-marshalled through a
// host-supplied dispatcher before reaching the event stream.

use crate::core::statistics::BridgeCounters;
use crate::models::pose::LandmarkSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

pub type DispatchTask = Box<dyn FnOnce() + Send + 'static>;

/// Event stream handed to the host; ends when the bridge closes or a new
/// subscriber replaces it
pub type ResultStream = mpsc::UnboundedReceiver<LandmarkSet>;

/// Runs delivery tasks on the execution context the host transport requires.
/// Implementations must run tasks in the order they were dispatched.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, task: DispatchTask);
}

/// Delivers on the thread that completed the inference
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, task: DispatchTask) {
        task();
    }
}

/// Funnels every delivery through one tokio task, like a UI main loop
#[derive(Debug, Clone)]
pub struct SerialDispatcher {
    tx: mpsc::UnboundedSender<DispatchTask>,
}

impl SerialDispatcher {
    /// Must be called from within a tokio runtime
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<DispatchTask>();

        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                task();
            }
            tracing::debug!("Serial dispatcher stopped");
        });

        Self { tx }
    }
}

impl Dispatcher for SerialDispatcher {
    fn dispatch(&self, task: DispatchTask) {
        if self.tx.send(task).is_err() {
            tracing::warn!("Serial dispatcher is gone, dropping delivery");
        }
    }
}

// ==============================================================================
// Result Channel
// ==============================================================================

pub struct ResultChannel {
    subscriber: Mutex<Option<mpsc::UnboundedSender<LandmarkSet>>>,
    closed: AtomicBool,
    dispatcher: Arc<dyn Dispatcher>,
    counters: Arc<BridgeCounters>,
}

impl ResultChannel {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, counters: Arc<BridgeCounters>) -> Arc<Self> {
        Arc::new(Self {
            subscriber: Mutex::new(None),
            closed: AtomicBool::new(false),
            dispatcher,
            counters,
        })
    }

    fn lock_subscriber(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<LandmarkSet>>> {
        self.subscriber.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Attach the host's listener. Any previous stream is terminated.
    /// After close the returned stream is already finished.
    pub fn subscribe(&self) -> ResultStream {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.is_closed() {
            *self.lock_subscriber() = Some(tx);
        }
        rx
    }

    /// Detach the current listener; results are discarded until the next subscribe
    pub fn unsubscribe(&self) {
        self.lock_subscriber().take();
    }

    /// Queue a completed result for delivery on the dispatcher's context.
    /// The closed check happens at delivery time.
    pub fn deliver(self: &Arc<Self>, result: LandmarkSet) {
        let channel = Arc::clone(self);
        self.dispatcher.dispatch(Box::new(move || channel.send_now(result)));
    }

    fn send_now(&self, result: LandmarkSet) {
        if self.is_closed() {
            tracing::debug!(
                "Discarding result for frame {}ms, bridge is closed",
                result.timestamp_ms
            );
            self.counters.record_result_discarded();
            return;
        }

        let mut subscriber = self.lock_subscriber();
        match subscriber.as_ref() {
            Some(tx) => {
                if tx.send(result).is_ok() {
                    self.counters.record_result_delivered();
                } else {
                    tracing::debug!("Listener dropped its stream, detaching");
                    *subscriber = None;
                }
            }
            None => {
                tracing::debug!("No listener attached, result for {}ms dropped", result.timestamp_ms);
            }
        }
    }

    /// Stop delivering and terminate the current stream. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.lock_subscriber().take();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
