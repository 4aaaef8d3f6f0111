//! Unbounded MPSC queue for in-process (inter-thread) communication.
//!
//! The lossless alternative to [`super::mpsc`]: a linked queue that never
//! rejects a push. The price is one heap allocation per push, so the ring is
//! preferred on hot paths.
//!
//! # Example
//!
//! ```
//! use spool::sync::unbounded;
//!
//! let (producer, consumer) = unbounded::channel::<String>();
//!
//! producer.push("never rejected".to_string());
//! assert_eq!(consumer.pop(), Some("never rejected".to_string()));
//! ```

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use minstant::Instant;

use super::Timeout;
use crate::mpsc::linked::LinkedQueue;

/// Marker type to opt-out of `Sync` while remaining `Send`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Write end of the unbounded MPSC queue.
///
/// Cloneable: one handle per producer thread. See
/// [`super::mpsc::Producer`] for the thread-safety shape (same semantics).
pub struct Producer<T: Send> {
    queue: Arc<LinkedQueue<T>>,
    _unsync: PhantomUnsync,
}

impl<T: Send> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            _unsync: PhantomData,
        }
    }
}

/// Read end of the unbounded MPSC queue.
///
/// Only one consumer exists per queue; neither `Clone` nor `Sync`.
pub struct Consumer<T: Send> {
    queue: Arc<LinkedQueue<T>>,
    _unsync: PhantomUnsync,
}

/// Creates a new unbounded MPSC channel.
#[must_use]
pub fn channel<T: Send>() -> (Producer<T>, Consumer<T>) {
    let queue = Arc::new(LinkedQueue::new());

    let producer = Producer {
        queue: Arc::clone(&queue),
        _unsync: PhantomData,
    };

    let consumer = Consumer {
        queue,
        _unsync: PhantomData,
    };

    (producer, consumer)
}

impl<T: Send> Producer<T> {
    /// Pushes an item onto the queue.
    ///
    /// Never rejects; allocates one node on the calling thread.
    #[inline]
    pub fn push(&self, item: T) {
        self.queue.push(item);
    }
}

impl<T: Send> Consumer<T> {
    /// Attempts to pop an item from the queue (wait-free).
    ///
    /// Returns `None` if the queue is empty.
    #[inline]
    #[must_use]
    pub fn pop(&self) -> Option<T> {
        // SAFETY: Consumer is !Sync and not Clone, so this thread holds the
        // only read end.
        unsafe { self.queue.pop() }
    }

    /// Spins until an item is available, then pops.
    ///
    /// Returns `None` on timeout.
    #[inline]
    #[must_use]
    pub fn pop_blocking(&self, timeout: Timeout) -> Option<T> {
        let deadline = match timeout {
            Timeout::Infinite => None,
            Timeout::Duration(d) => Some(Instant::now() + d),
        };
        loop {
            if let Some(item) = self.pop() {
                return Some(item);
            }
            if let Some(dl) = deadline
                && Instant::now() > dl
            {
                return None;
            }
            std::hint::spin_loop();
        }
    }

    /// Pops and drops everything currently linked, leaving the queue empty.
    pub fn clear(&self) {
        // SAFETY: same single-consumer justification as pop.
        unsafe { self.queue.clear() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_basic_push_pop() {
        let (producer, consumer) = channel::<u64>();

        producer.push(42);
        assert_eq!(consumer.pop(), Some(42));
        assert_eq!(consumer.pop(), None);
    }

    #[test]
    fn test_fifo_order() {
        let (producer, consumer) = channel::<u64>();

        for i in 0..10 {
            producer.push(i);
        }
        for i in 0..10 {
            assert_eq!(consumer.pop(), Some(i));
        }
        assert_eq!(consumer.pop(), None);
    }

    #[test]
    fn test_never_rejects() {
        let (producer, consumer) = channel::<u64>();

        // Far beyond any fixed capacity.
        for i in 0..10_000 {
            producer.push(i);
        }
        let mut count = 0;
        while consumer.pop().is_some() {
            count += 1;
        }
        assert_eq!(count, 10_000);
    }

    #[test]
    fn test_clear() {
        let (producer, consumer) = channel::<String>();

        producer.push("a".to_string());
        producer.push("b".to_string());
        consumer.clear();
        assert_eq!(consumer.pop(), None);

        // Still usable afterwards.
        producer.push("c".to_string());
        assert_eq!(consumer.pop(), Some("c".to_string()));
    }

    #[test]
    fn test_cloned_producers_across_threads() {
        let (producer, consumer) = channel::<u64>();

        let mut handles = vec![];
        for p in 0..4u64 {
            let producer = producer.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..1000 {
                    producer.push(p * 10_000 + i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let mut received = vec![];
        while let Some(item) = consumer.pop() {
            received.push(item);
        }
        assert_eq!(received.len(), 4000);

        for p in 0..4u64 {
            let got: Vec<u64> = received
                .iter()
                .copied()
                .filter(|v| v / 10_000 == p)
                .collect();
            let want: Vec<u64> = (0..1000).map(|i| p * 10_000 + i).collect();
            assert_eq!(got, want, "producer {p} order broken");
        }
    }

    #[test]
    fn test_pop_blocking() {
        let (producer, consumer) = channel::<u64>();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            producer.push(7);
        });

        assert_eq!(consumer.pop_blocking(Timeout::Infinite), Some(7));
        handle.join().unwrap();
    }

    #[test]
    fn test_pop_blocking_timeout() {
        let (_producer, consumer) = channel::<u64>();
        let got = consumer.pop_blocking(Timeout::Duration(Duration::from_millis(5)));
        assert_eq!(got, None);
    }
}
