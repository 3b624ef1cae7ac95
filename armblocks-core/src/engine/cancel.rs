//! Cooperative cancellation token
//!
//! The engine polls the token before every block and races it against every
//! delay. Cancelling never interrupts a bus transaction already in flight.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Shared cancellation flag with an async wake-up
pub struct CancelToken {
    cancelled: AtomicBool,
    wake: Signal<CriticalSectionRawMutex, ()>,
}

impl CancelToken {
    pub const fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            wake: Signal::new(),
        }
    }

    /// Request cancellation (idempotent)
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.wake.signal(());
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Re-arm for another run
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
        self.wake.reset();
    }

    /// Resolve once cancellation has been requested
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.wake.wait().await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
