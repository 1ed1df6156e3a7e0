//! Tick queue between the timing loop and consumers.
//!
//! A mutex-and-condvar FIFO: the timing loop pushes without ever blocking,
//! consumers block until a tick is available. The queue is either unbounded
//! or bounded with a drop-newest overflow policy - when full, a new tick is
//! discarded rather than stalling the producer, which would change the
//! delivery cadence.
//!
//! This type is crate-private; callers only see the four operations exposed
//! on the `Metronome` surface, never the buffer itself.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::time::Duration;

use minstant::Instant;
use parking_lot::{Condvar, Mutex};

use crate::time::Tick;

/// Thread-safe FIFO of ticks with optional capacity.
pub(crate) struct TickQueue {
    inner: Mutex<VecDeque<Tick>>,
    available: Condvar,
    capacity: Option<NonZeroUsize>,
}

impl TickQueue {
    /// Creates an empty queue. `None` capacity means unbounded.
    pub(crate) fn new(capacity: Option<NonZeroUsize>) -> Self {
        let initial = capacity.map_or(0, NonZeroUsize::get);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(initial)),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Enqueues a tick without blocking.
    ///
    /// Returns `false` if the queue is bounded and full; the tick is dropped.
    pub(crate) fn push(&self, tick: Tick) -> bool {
        let mut queue = self.inner.lock();
        if let Some(cap) = self.capacity
            && queue.len() >= cap.get()
        {
            return false;
        }
        queue.push_back(tick);
        drop(queue);
        self.available.notify_one();
        true
    }

    /// Removes and returns the oldest tick, blocking while the queue is empty.
    pub(crate) fn pop(&self) -> Tick {
        let mut queue = self.inner.lock();
        loop {
            if let Some(tick) = queue.pop_front() {
                return tick;
            }
            self.available.wait(&mut queue);
        }
    }

    /// Like [`pop`](Self::pop), but gives up after `timeout`.
    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Option<Tick> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.inner.lock();
        loop {
            if let Some(tick) = queue.pop_front() {
                return Some(tick);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let _ = self.available.wait_for(&mut queue, deadline - now);
        }
    }

    /// Current number of queued ticks. Never consumes.
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(seconds: f64) -> Tick {
        Tick::from_seconds(seconds)
    }

    #[test]
    fn test_push_pop_fifo() {
        let queue = TickQueue::new(None);

        for i in 0..10 {
            assert!(queue.push(tick(f64::from(i))));
        }

        for i in 0..10 {
            assert_eq!(queue.pop().seconds(), f64::from(i));
        }
    }

    #[test]
    fn test_len_never_consumes() {
        let queue = TickQueue::new(None);

        queue.push(tick(1.0));
        queue.push(tick(2.0));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop().seconds(), 1.0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_bounded_drops_newest() {
        let queue = TickQueue::new(NonZeroUsize::new(3));

        assert!(queue.push(tick(1.0)));
        assert!(queue.push(tick(2.0)));
        assert!(queue.push(tick(3.0)));
        assert!(!queue.push(tick(4.0)), "push past capacity must report a drop");
        assert_eq!(queue.len(), 3);

        // The retained ticks are the oldest three.
        assert_eq!(queue.pop().seconds(), 1.0);
        assert_eq!(queue.pop().seconds(), 2.0);
        assert_eq!(queue.pop().seconds(), 3.0);

        // Room again after draining.
        assert!(queue.push(tick(5.0)));
        assert_eq!(queue.pop().seconds(), 5.0);
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = std::sync::Arc::new(TickQueue::new(None));

        let consumer = {
            let queue = std::sync::Arc::clone(&queue);
            std::thread::spawn(move || queue.pop())
        };

        std::thread::sleep(Duration::from_millis(20));
        queue.push(tick(7.0));

        assert_eq!(consumer.join().unwrap().seconds(), 7.0);
    }

    #[test]
    fn test_pop_timeout_expires_on_empty_queue() {
        let queue = TickQueue::new(None);

        let start = Instant::now();
        assert!(queue.pop_timeout(Duration::from_millis(30)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_pop_timeout_returns_queued_tick_immediately() {
        let queue = TickQueue::new(None);

        queue.push(tick(9.0));
        let got = queue.pop_timeout(Duration::from_secs(5));
        assert_eq!(got.map(Tick::seconds), Some(9.0));
    }

    #[test]
    fn test_concurrent_push_pop_preserves_order() {
        let queue = std::sync::Arc::new(TickQueue::new(None));
        let count = 1000u32;

        let producer = {
            let queue = std::sync::Arc::clone(&queue);
            std::thread::spawn(move || {
                for i in 0..count {
                    assert!(queue.push(tick(f64::from(i))));
                }
            })
        };

        let consumer = {
            let queue = std::sync::Arc::clone(&queue);
            std::thread::spawn(move || {
                let mut received = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    received.push(queue.pop().seconds());
                }
                received
            })
        };

        producer.join().unwrap();
        let received = consumer.join().unwrap();

        for (i, &value) in received.iter().enumerate() {
            assert_eq!(value, i as f64);
        }
    }
}
