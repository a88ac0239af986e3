use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::SqueezeError;

/// Cooperative cancellation flag shared between a caller and a running job.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> crate::error::Result<()> {
        if self.is_cancelled() {
            Err(SqueezeError::Cancelled)
        } else {
            Ok(())
        }
    }
}
