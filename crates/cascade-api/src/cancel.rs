//! Caller-supplied cancellation token.
//!
//! The engine holds no locks and runs no internal parallelism, so
//! cancellation is cooperative: the resolver and controller check the token
//! between store accesses and abort the invocation promptly when it trips.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Clone-able cancellation flag shared between a host and an invocation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
