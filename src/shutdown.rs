//! # shutdown
//!
//! The one flag every stage watches.  Set once (by the Supervisor or the OS
//! signal handler), read by everyone between bounded waits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Returns `true` only for the call that actually set it.
    pub fn trigger(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolve once the flag is raised, polling every `every`.
    pub async fn wait(&self, every: Duration) {
        while !self.is_triggered() {
            tokio::time::sleep(every).await;
        }
    }

    /// Sleep for `total`, waking early if shutdown is requested.
    /// Returns `false` when interrupted by shutdown.
    pub async fn sleep(&self, total: Duration) -> bool {
        let step = Duration::from_millis(50);
        let deadline = tokio::time::Instant::now() + total;
        loop {
            if self.is_triggered() {
                return false;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep((deadline - now).min(step)).await;
        }
    }
}
