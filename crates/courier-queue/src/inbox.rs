//! In-process drain-and-clear buffer.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Bounded FIFO buffer that is emptied in one step.
///
/// `push` and `drain` are each atomic with respect to one another: a drain
/// returns exactly the items pushed before it, and an item pushed
/// concurrently lands either in this drain or the next one, never both and
/// never neither. When full, the oldest item is evicted.
#[derive(Debug)]
pub struct Inbox<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
}

impl<T> Inbox<T> {
    /// Creates an inbox holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Creates an inbox with no practical bound.
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // A panicking pusher cannot leave the deque half-updated.
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends an item, returning the evicted oldest item if full.
    pub fn push(&self, item: T) -> Option<T> {
        let mut items = self.lock();
        let evicted = if items.len() >= self.capacity {
            items.pop_front()
        } else {
            None
        };
        items.push_back(item);
        evicted
    }

    /// Takes every buffered item in arrival order.
    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T> Default for Inbox<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_drain_clears() {
        let inbox = Inbox::new(10);
        inbox.push(1);
        inbox.push(2);

        assert_eq!(inbox.drain(), vec![1, 2]);
        assert!(inbox.is_empty());
        assert!(inbox.drain().is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let inbox = Inbox::new(2);
        assert_eq!(inbox.push("a"), None);
        assert_eq!(inbox.push("b"), None);
        assert_eq!(inbox.push("c"), Some("a"));
        assert_eq!(inbox.drain(), vec!["b", "c"]);
    }

    #[test]
    fn test_concurrent_push_and_drain_loses_nothing() {
        let inbox = Arc::new(Inbox::unbounded());
        let producers: Vec<_> = (0..4)
            .map(|t| {
                let inbox = Arc::clone(&inbox);
                thread::spawn(move || {
                    for i in 0..250 {
                        inbox.push(t * 1000 + i);
                    }
                })
            })
            .collect();

        let mut seen = Vec::new();
        while producers.iter().any(|p| !p.is_finished()) {
            seen.extend(inbox.drain());
        }
        for p in producers {
            p.join().unwrap();
        }
        seen.extend(inbox.drain());

        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 1000);
    }
}
