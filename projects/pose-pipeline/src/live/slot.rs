use crossbeam::queue::ArrayQueue;
use std::sync::Arc;

/// Size-1 hand-off holding only the newest unread value.
///
/// Publishing replaces an unread value instead of waiting, so a slow reader
/// only ever sees bounded staleness and never slows the producer down.
#[derive(Debug)]
pub struct LatestSlot<T> {
    queue: Arc<ArrayQueue<T>>,
}

impl<T> Clone for LatestSlot<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(1)),
        }
    }

    /// Stores `value`, returning the unread value it displaced, if any.
    pub fn publish(&self, value: T) -> Option<T> {
        self.queue.force_push(value)
    }

    /// Non-blocking read of the newest value.
    pub fn take(&self) -> Option<T> {
        self.queue.pop()
    }
}
