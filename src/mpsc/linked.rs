//! Core unbounded linked MPSC queue algorithm.
//!
//! A Michael-Scott-style list specialized for a single consumer. A dummy
//! sentinel node removes the empty-queue special case: head and tail always
//! point at a valid node, and `tail.next == null` means empty.
//!
//! Producers contend only on the head exchange; the consumer reads
//! `tail.next` uncontended and is the only side that frees nodes. Lossless
//! and unbounded, but every push allocates - the ring in [`super::ring`] is
//! preferred on hot paths.
//!
//! Between a producer's head swap and its `next` store there is a brief
//! window where the new node is reachable from head while the previous
//! node's `next` is still null. The single consumer observes that window as
//! "empty", which is benign; it would not be with multiple consumers.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crossbeam_utils::CachePadded;

struct Node<T> {
    next: AtomicPtr<Node<T>>,
    /// `None` only on the sentinel; every pushed node carries a payload.
    value: Option<T>,
}

impl<T> Node<T> {
    fn boxed(value: Option<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            next: AtomicPtr::new(ptr::null_mut()),
            value,
        }))
    }
}

/// Unbounded MPSC linked queue core.
pub(crate) struct LinkedQueue<T> {
    /// Most recently pushed node. Producers swap this.
    head: CachePadded<AtomicPtr<Node<T>>>,
    /// Oldest node (the current sentinel). Only the consumer advances it.
    tail: CachePadded<AtomicPtr<Node<T>>>,
}

impl<T> LinkedQueue<T> {
    /// Creates an empty queue holding only the sentinel.
    pub(crate) fn new() -> Self {
        let sentinel = Node::<T>::boxed(None);
        Self {
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
        }
    }

    /// Pushes a value onto the queue.
    ///
    /// Never rejects. Allocates the node on the calling thread; safe for any
    /// number of concurrent producers.
    pub(crate) fn push(&self, value: T) {
        let node = Node::boxed(Some(value));

        // Swing head to the new node, then link the previous head to it.
        // AcqRel on the swap makes the payload write visible to the consumer
        // and gives us the previous head for linking.
        let prev = self.head.swap(node, Ordering::AcqRel);

        // SAFETY: `prev` is the sentinel or a previously pushed node; nodes
        // stay live until the consumer frees them, and only nodes that have
        // been linked past are freed.
        unsafe {
            (*prev).next.store(node, Ordering::Release);
        }
    }

    /// Pops the oldest value, if any.
    ///
    /// # Safety
    ///
    /// At most one thread may call this (single consumer invariant).
    pub(crate) unsafe fn pop(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);

        // SAFETY: tail always points at a live node owned by the queue.
        let next = unsafe { (*tail).next.load(Ordering::Acquire) };
        if next.is_null() {
            return None;
        }

        // SAFETY: the acquire load above pairs with the producer's release
        // link, so the payload write happened-before this access. Taking the
        // value turns `next` into the new sentinel.
        let value = unsafe { (*next).value.take() };
        debug_assert!(value.is_some());

        self.tail.store(next, Ordering::Release);

        // The former sentinel is no longer reachable from either end.
        // SAFETY: it was allocated with `Box::into_raw` and the single
        // consumer is the only side that frees nodes.
        unsafe {
            drop(Box::from_raw(tail));
        }

        value
    }

    /// Pops and drops every linked value, leaving only the sentinel.
    ///
    /// # Safety
    ///
    /// Same single-consumer contract as [`Self::pop`].
    pub(crate) unsafe fn clear(&self) {
        // SAFETY: forwarded single-consumer contract.
        while let Some(value) = unsafe { self.pop() } {
            drop(value);
        }
    }
}

impl<T> Drop for LinkedQueue<T> {
    fn drop(&mut self) {
        // `&mut self`: no producer or consumer is active.
        // SAFETY: exclusive access satisfies the single-consumer contract.
        unsafe {
            self.clear();
        }

        // One node remains and head == tail: the sentinel.
        let sentinel = *self.tail.get_mut();
        // SAFETY: allocated with `Box::into_raw`, never freed by pop.
        unsafe {
            drop(Box::from_raw(sentinel));
        }
    }
}

// SAFETY: Sending the queue moves the owned nodes (and payloads) with it.
unsafe impl<T: Send> Send for LinkedQueue<T> {}

// SAFETY: Producers only touch the atomic head and their own fresh node;
// the consumer side is restricted to one thread by the pop contract.
unsafe impl<T: Send> Sync for LinkedQueue<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn starts_empty() {
        let q: LinkedQueue<u64> = LinkedQueue::new();
        assert_eq!(unsafe { q.pop() }, None);
    }

    #[test]
    fn push_pop_single() {
        let q = LinkedQueue::new();
        q.push(42u64);
        unsafe {
            assert_eq!(q.pop(), Some(42));
            assert_eq!(q.pop(), None);
        }
    }

    #[test]
    fn fifo_order() {
        let q = LinkedQueue::new();
        for i in 0..5u64 {
            q.push(i);
        }
        for i in 0..5u64 {
            assert_eq!(unsafe { q.pop() }, Some(i));
        }
        assert_eq!(unsafe { q.pop() }, None);
    }

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn clear_drops_linked_values() {
        let drops = Arc::new(AtomicUsize::new(0));
        let q = LinkedQueue::new();

        for _ in 0..4 {
            q.push(DropCounter(Arc::clone(&drops)));
        }
        unsafe { q.clear() };
        assert_eq!(drops.load(Ordering::Relaxed), 4);
        assert!(unsafe { q.pop() }.is_none());

        // The queue stays usable after a clear.
        q.push(DropCounter(Arc::clone(&drops)));
        drop(unsafe { q.pop() });
        assert_eq!(drops.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn drop_frees_pending_values() {
        let drops = Arc::new(AtomicUsize::new(0));
        let q = LinkedQueue::new();
        for _ in 0..3 {
            q.push(DropCounter(Arc::clone(&drops)));
        }
        drop(q);
        assert_eq!(drops.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn concurrent_producers() {
        let q: Arc<LinkedQueue<u64>> = Arc::new(LinkedQueue::new());
        let num_producers = 4u64;
        let per_producer = 1_000u64;

        let mut handles = vec![];
        for p in 0..num_producers {
            let q = Arc::clone(&q);
            handles.push(thread::spawn(move || {
                for i in 0..per_producer {
                    q.push(p * 10_000 + i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let mut received = vec![];
        while let Some(item) = unsafe { q.pop() } {
            received.push(item);
        }
        assert_eq!(received.len(), (num_producers * per_producer) as usize);

        // Per-producer order survives; cross-producer interleaving is free.
        for p in 0..num_producers {
            let got: Vec<u64> = received
                .iter()
                .copied()
                .filter(|v| v / 10_000 == p)
                .collect();
            let want: Vec<u64> = (0..per_producer).map(|i| p * 10_000 + i).collect();
            assert_eq!(got, want);
        }
    }
}
