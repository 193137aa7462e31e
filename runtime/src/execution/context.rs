use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::annotations::Annotations;
use crate::runtime_error::{RuntimeError, RuntimeResult};

/// Lets another thread cancel a running query.
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle(Arc<AtomicBool>);

impl CancellationHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Per-query state passed to every operator call.
#[derive(Debug, Default)]
pub struct QueryContext {
    cancelled: CancellationHandle,
    deadline: Option<Instant>,
    annotations: Annotations,
    trace_enabled: bool,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.trace_enabled = enabled;
        self
    }

    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancelled.clone()
    }

    pub fn cancel(&self) {
        self.cancelled.cancel()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Called by operators at every pull boundary.
    pub fn check_cancelled(&self) -> RuntimeResult<()> {
        if self.cancelled.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(RuntimeError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    #[inline]
    pub fn trace_enabled(&self) -> bool {
        self.trace_enabled
    }
}
