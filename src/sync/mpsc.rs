//! Lossy bounded MPSC queue for in-process (inter-thread) communication.
//!
//! A lock-free bounded queue using a heap-allocated ring buffer with per-slot
//! sequence tokens.
//!
//! # Overview
//!
//! - [`Producer`] - Write end. Cloneable: one handle per producer thread.
//! - [`Consumer`] - Read end (single consumer per queue).
//! - Lock-free: no mutexes or syscalls in the hot path, and no heap
//!   allocation after construction.
//! - Lossy: [`Producer::push`] hands the payload back instead of waiting
//!   when the ring is full.
//!
//! # Example
//!
//! ```
//! use spool::sync::mpsc;
//!
//! let (producer, consumer) = mpsc::channel::<u64>(1024).unwrap();
//!
//! // Producer threads (clone one handle per thread)
//! producer.push(42).expect("queue full");
//!
//! // Consumer thread
//! assert_eq!(consumer.pop(), Some(42));
//! ```

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use minstant::Instant;

use super::Timeout;
use crate::mpsc::ring::Ring;

pub use crate::mpsc::ring::CapacityError;

/// Marker type to opt-out of `Sync` while remaining `Send`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Write end of the bounded MPSC queue.
///
/// Multiple producers are expected: clone the handle once per producer
/// thread. Each clone can push concurrently without data races.
///
/// # Thread Safety
///
/// `Producer` is [`Send`] but **not** [`Sync`]:
/// - Can transfer ownership to another thread
/// - Cannot share one `&Producer` across threads; clone instead
pub struct Producer<T: Send> {
    ring: Arc<Ring<T>>,
    _unsync: PhantomUnsync,
}

impl<T: Send> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            ring: Arc::clone(&self.ring),
            _unsync: PhantomData,
        }
    }
}

/// Read end of the bounded MPSC queue.
///
/// Only one consumer exists per queue; the type is neither `Clone` nor
/// `Sync`, so a second consuming thread cannot be constructed in-process.
pub struct Consumer<T: Send> {
    ring: Arc<Ring<T>>,
    _unsync: PhantomUnsync,
}

/// Creates a new bounded MPSC channel with the given capacity.
///
/// Returns a `(Producer, Consumer)` pair. Clone the producer for additional
/// producer threads.
///
/// # Errors
///
/// Returns [`CapacityError`] unless `capacity` is a power of two >= 2.
pub fn channel<T: Send>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), CapacityError> {
    let ring = Arc::new(Ring::with_capacity(capacity)?);

    let producer = Producer {
        ring: Arc::clone(&ring),
        _unsync: PhantomData,
    };

    let consumer = Consumer {
        ring,
        _unsync: PhantomData,
    };

    Ok((producer, consumer))
}

impl<T: Send> Producer<T> {
    /// Attempts to push an item onto the queue without waiting.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the queue is full. Rejection is lossy by
    /// design: nothing is stored, the consumer observes no trace, and the
    /// caller decides whether to retry, drop, or escalate.
    #[inline]
    pub fn push(&self, item: T) -> Result<(), T> {
        // SAFETY: the Arc keeps the ring alive for the duration of the call;
        // concurrent producers are safe by the ring's claim protocol.
        unsafe { self.ring.push(item) }
    }

    /// Spins until space is available, then pushes.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` on timeout.
    #[inline]
    pub fn push_blocking(&self, mut item: T, timeout: Timeout) -> Result<(), T> {
        let deadline = match timeout {
            Timeout::Infinite => None,
            Timeout::Duration(d) => Some(Instant::now() + d),
        };
        loop {
            match self.push(item) {
                Ok(()) => return Ok(()),
                Err(returned) => {
                    item = returned;
                    if let Some(dl) = deadline
                        && Instant::now() > dl
                    {
                        return Err(item);
                    }
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Returns the fixed capacity of the queue.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
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
        // only read end; the ring is alive behind the Arc.
        unsafe { self.ring.pop() }
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

    /// Returns the fixed capacity of the queue.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}
