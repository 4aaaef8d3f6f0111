//! Core lock-free MPSC ring buffer algorithm.
//!
//! A bounded MPSC (Multi-Producer Single-Consumer) ring buffer using per-slot
//! sequence tokens for synchronization, derived from Dmitry Vyukov's bounded
//! MPMC queue simplified for the single-consumer case:
//!
//! - Each slot has an atomic sequence token
//! - Producers claim exclusive write positions on the head counter
//! - After writing, producers publish by setting `slot.seq = pos + 1`
//! - The consumer checks `slot.seq == tail + 1` before reading
//! - After reading, the consumer sets `slot.seq = tail + capacity` to recycle
//!   the slot for the next lap
//!
//! Admission is lossy: a producer that finds the ring full hands the payload
//! back instead of waiting. The consumer side is wait-free; producers are
//! lock-free (they retry only when another producer claims the same position
//! first).
//!
//! # Safety
//!
//! The consumer side requires exactly one consumer. [`crate::sync::mpsc`]
//! enforces that in-process through the handle types.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

/// Error returned when a ring is constructed with an unusable capacity.
///
/// The generation arithmetic behind the slot tokens folds positions into the
/// buffer with a bitmask, so the capacity must be a power of two, and a ring
/// of fewer than two slots cannot distinguish its token states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("ring capacity must be a power of two >= 2, got {0}")]
pub struct CapacityError(pub usize);

/// A slot in the ring with a sequence token for synchronization.
///
/// Token values relative to the slot's current generation `g`
/// (the claim positions that map onto this slot are `g`, `g + cap`, ...):
/// - `seq == g` - empty, the producer claiming `g` may write
/// - `seq == g + 1` - full, the payload is live and owned by the queue
/// - `seq == g + cap` - consumed, equivalently empty for the next lap
struct Slot<T> {
    seq: AtomicUsize,

    /// Raw storage for one payload. Holds a live value only between a
    /// producer's publish and the consumer's read; uninitialized otherwise.
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    fn new(seq: usize) -> Self {
        Self {
            seq: AtomicUsize::new(seq),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

/// Producer-side state: the head counter producers claim positions from.
///
/// Own cache line so producer traffic does not false-share with the tail.
#[repr(C, align(64))]
struct ProducerState {
    head: AtomicUsize,
}

impl ProducerState {
    const fn new() -> Self {
        Self {
            head: AtomicUsize::new(0),
        }
    }
}

/// Consumer-side state: the tail index. Written only by the consumer.
#[repr(C, align(64))]
struct ConsumerState {
    tail: AtomicUsize,
}

impl ConsumerState {
    const fn new() -> Self {
        Self {
            tail: AtomicUsize::new(0),
        }
    }
}

/// Bounded lossy MPSC ring buffer core.
///
/// Shared through an `Arc` by the handle layer; all methods take `&self`.
pub(crate) struct Ring<T> {
    producer: ProducerState,
    consumer: ConsumerState,
    mask: usize,
    slots: Box<[Slot<T>]>,
}

impl<T> Ring<T> {
    /// Creates an empty ring with the given capacity.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError`] unless `capacity` is a power of two >= 2.
    pub(crate) fn with_capacity(capacity: usize) -> Result<Self, CapacityError> {
        if capacity < 2 || !capacity.is_power_of_two() {
            return Err(CapacityError(capacity));
        }

        // Seed each token with its own index: slot i is empty for position i.
        let slots: Box<[Slot<T>]> = (0..capacity).map(Slot::new).collect();

        Ok(Self {
            producer: ProducerState::new(),
            consumer: ConsumerState::new(),
            mask: capacity - 1,
            slots,
        })
    }

    /// Returns the fixed number of slots.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Attempts to push an item onto the queue.
    ///
    /// Safe to call from any number of threads concurrently; never blocks and
    /// never allocates.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if the item was enqueued
    /// - `Err(item)` if the ring is full at the claim point (lossy rejection;
    ///   the payload is handed back untouched)
    ///
    /// # Safety
    ///
    /// Caller must ensure the ring outlives the call (the handle layer pins
    /// it behind an `Arc`).
    #[inline]
    pub(crate) unsafe fn push(&self, item: T) -> Result<(), T> {
        loop {
            let pos = self.producer.head.load(Ordering::Relaxed);
            let slot = &self.slots[pos & self.mask];

            let seq = slot.seq.load(Ordering::Acquire);

            // Signed distance between the token and the claim position;
            // wrapping keeps it correct across counter overflow.
            let diff = seq.wrapping_sub(pos) as isize;

            if diff == 0 {
                // Slot is empty for this position. Claim it.
                if self
                    .producer
                    .head
                    .compare_exchange_weak(
                        pos,
                        pos.wrapping_add(1),
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    // SAFETY: The claim succeeded, so no other producer owns
                    // this position, and seq == pos means the consumer has
                    // recycled the slot: the storage is writable and
                    // uninitialized.
                    unsafe {
                        (*slot.value.get()).write(item);
                    }
                    // Publish. Pairs with the consumer's acquire load.
                    slot.seq.store(pos.wrapping_add(1), Ordering::Release);
                    return Ok(());
                }
                // Claim lost to another producer; retry with a fresh head.
            } else if diff < 0 {
                // Token is a lap behind: the consumer has not recycled this
                // slot yet. The ring is full; hand the payload back.
                return Err(item);
            }
            // diff > 0: head already moved past this position; retry.
        }
    }

    /// Attempts to pop an item from the queue.
    ///
    /// # Safety
    ///
    /// At most one thread may call this (single consumer invariant).
    #[inline]
    pub(crate) unsafe fn pop(&self) -> Option<T> {
        let tail = self.consumer.tail.load(Ordering::Relaxed);
        let slot = &self.slots[tail & self.mask];

        // A slot is readable once the producer published seq == tail + 1.
        let seq = slot.seq.load(Ordering::Acquire);
        if seq != tail.wrapping_add(1) {
            return None;
        }

        // SAFETY: The token confirms the producer finished writing, and the
        // single-consumer contract gives us exclusive read access.
        let item = unsafe { (*slot.value.get()).assume_init_read() };

        // Recycle the slot for position tail + capacity. Pairs with the
        // acquire load of the producer that claims that position.
        slot.seq
            .store(tail.wrapping_add(self.slots.len()), Ordering::Release);

        self.consumer
            .tail
            .store(tail.wrapping_add(1), Ordering::Relaxed);

        Some(item)
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let head = *self.producer.head.get_mut();
        let tail = *self.consumer.tail.get_mut();

        // Drop every live payload in [tail, head). A slot is fully written
        // only when its token reads pos + 1; a producer that panicked between
        // claim and publish leaves the token at pos and no live payload.
        for pos in tail..head {
            let slot = &mut self.slots[pos & self.mask];
            if *slot.seq.get_mut() == pos.wrapping_add(1) {
                // SAFETY: `&mut self` gives exclusive access and the token
                // confirms a completed, unconsumed write.
                unsafe {
                    slot.value.get_mut().assume_init_drop();
                }
            }
        }
    }
}

// SAFETY: Sending the ring moves the payloads with it; T: Send suffices.
unsafe impl<T: Send> Send for Ring<T> {}

// SAFETY: Concurrent access is mediated by atomics: producers serialize on
// the head claim, and per-slot tokens order every producer-consumer hand-off.
unsafe impl<T: Send> Sync for Ring<T> {}
