//! # queue
//!
//! [`StageQueue`]: FIFO hand-off between a receiving stage (single producer)
//! and the Strategy Engine (single consumer).
//!
//! * `push` never blocks: on a bounded queue at capacity it returns
//!   [`BrainError::QueueFull`] and the caller drops the item.
//! * `pop_timeout` is the only suspension point and is always bounded, so the
//!   consumer keeps observing the shutdown flag.
//! * `len` / `drain` let the Supervisor watch depth and discard leftovers.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::BrainError;

pub struct StageQueue<T> {
    name:     &'static str,
    items:    Mutex<VecDeque<T>>,
    /// 0 = unbounded
    capacity: usize,
    ready:    Notify,
}

impl<T> StageQueue<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            items: Mutex::new(VecDeque::new()),
            capacity,
            ready: Notify::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> Option<usize> {
        (self.capacity > 0).then_some(self.capacity)
    }

    pub fn push(&self, item: T) -> Result<(), BrainError> {
        {
            let mut items = self.items.lock();
            if self.capacity > 0 && items.len() >= self.capacity {
                return Err(BrainError::QueueFull(self.name));
            }
            items.push_back(item);
        }
        self.ready.notify_one();
        Ok(())
    }

    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Wait at most `wait` for an item.
    pub async fn pop_timeout(&self, wait: Duration) -> Option<T> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            // A push between try_pop and here leaves a stored permit, so no wakeup is lost.
            if tokio::time::timeout(deadline - now, self.ready.notified()).await.is_err() {
                return self.try_pop();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Discard everything queued; returns how many items were dropped.
    pub fn drain(&self) -> usize {
        let mut items = self.items.lock();
        let count = items.len();
        items.clear();
        count
    }
}
