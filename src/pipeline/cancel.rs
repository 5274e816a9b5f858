use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop signal observed once per loop iteration by every pipeline thread
///
/// Cancellation is cooperative: raising it never interrupts a thread, the
/// thread notices on its next check. Each run gets a fresh token so threads
/// left over from an earlier run can never be revived by a restart.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
