//! Inbound control queue.
//!
//! Unbounded FIFO shared between the background receive task (producer) and
//! the simulation tick (consumer). Neither side ever waits on the other:
//! `push` never drops and `try_pop` returns `None` immediately when empty.

use crate::protocol::ControlMessage;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cloneable handle to a shared control FIFO.
#[derive(Debug, Clone, Default)]
pub struct ControlQueue {
    inner: Arc<Mutex<VecDeque<ControlMessage>>>,
}

impl ControlQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message at the back.
    pub fn push(&self, msg: ControlMessage) {
        self.lock().push_back(msg);
    }

    /// Oldest unconsumed message, or `None` if the queue is empty.
    pub fn try_pop(&self) -> Option<ControlMessage> {
        self.lock().pop_front()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // The critical sections cannot panic midway, so a poisoned lock still
    // guards a consistent deque.
    fn lock(&self) -> MutexGuard<'_, VecDeque<ControlMessage>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ControlAction;
    use std::time::{Duration, Instant};

    #[test]
    fn pops_in_push_order() {
        let queue = ControlQueue::new();
        queue.push(ControlMessage::new(ControlAction::Pause));
        queue.push(ControlMessage::keyboard("left"));
        queue.push(ControlMessage::new(ControlAction::Pause));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_pop().unwrap().action, ControlAction::Pause);
        assert_eq!(queue.try_pop().unwrap().key(), Some("left"));
        assert_eq!(queue.try_pop().unwrap().action, ControlAction::Pause);
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn empty_pop_returns_immediately() {
        let queue = ControlQueue::new();
        let start = Instant::now();
        for _ in 0..100 {
            assert!(queue.try_pop().is_none());
        }
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[test]
    fn clones_share_storage() {
        let producer = ControlQueue::new();
        let consumer = producer.clone();
        producer.push(ControlMessage::new(ControlAction::Reset));
        assert!(!consumer.is_empty());
        assert_eq!(consumer.len(), 1);
        assert!(consumer.try_pop().is_some());
        assert!(producer.is_empty());
    }

    #[test]
    fn cross_thread_producer_keeps_order() {
        let queue = ControlQueue::new();
        let producer = queue.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..500 {
                producer.push(ControlMessage::keyboard(format!("k{i}")));
            }
        });

        let mut seen = Vec::new();
        while seen.len() < 500 {
            if let Some(msg) = queue.try_pop() {
                seen.push(msg.key().unwrap().to_string());
            }
        }
        handle.join().expect("producer thread");

        let expected: Vec<String> = (0..500).map(|i| format!("k{i}")).collect();
        assert_eq!(seen, expected);
    }
}
