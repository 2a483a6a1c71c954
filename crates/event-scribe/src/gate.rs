use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One-way active/inactive switch shared by the event handler and whoever
/// stops the sink.
///
/// Starts active. [`deactivate`](Self::deactivate) flips it exactly once;
/// there is no way back.
#[derive(Debug, Clone)]
pub struct Gate {
    active: Arc<AtomicBool>,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Close the gate. Returns `true` only for the call that performed the
    /// transition.
    pub fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}
