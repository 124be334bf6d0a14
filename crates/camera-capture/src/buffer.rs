//! Single-slot latest-frame mailbox

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::Frame;

/// Drop-oldest mailbox between the acquisition loop and its consumers
///
/// Holds at most one frame. `publish` replaces, never queues; consumers that
/// fall behind simply see fewer distinct frames. The lock only guards the
/// swap/copy of an `Arc`, so no image work ever happens inside it.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    latest: Mutex<Option<Arc<Frame>>>,
    published: AtomicU64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<Frame>>> {
        // A panic elsewhere cannot leave a half-written Arc behind
        self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the stored frame (producer only)
    pub fn publish(&self, frame: Frame) {
        let frame = Arc::new(frame);
        let previous = {
            let mut slot = self.slot();
            slot.replace(frame)
        };
        // The old frame is freed outside the critical section
        drop(previous);
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Latest frame, or `None` if nothing was published yet
    pub fn try_read(&self) -> Option<Arc<Frame>> {
        self.slot().clone()
    }

    /// Number of frames published since creation
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.slot().is_none()
    }
}
