use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Unbounded FIFO handing decoded notifications from the consumer thread to the UI.
///
/// Clones share the same underlying queue. The consumer thread only pushes and
/// the UI thread only pops, so the lock is never held for more than one
/// `VecDeque` operation.
#[derive(Debug, Clone, Default)]
pub struct DeliveryQueue {
    inner: Arc<Mutex<VecDeque<String>>>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message at the back of the queue.
    pub fn push(&self, message: String) {
        self.lock().push_back(message);
    }

    /// Remove and return the oldest message, never blocking on an empty queue.
    pub fn pop(&self) -> Option<String> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every queued message, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut queue = self.lock();
        let discarded = queue.len();
        queue.clear();
        discarded
    }

    // A panic on the other side of the lock must not take the UI down with it.
    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
