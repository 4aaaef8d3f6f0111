//! Core MPSC (Multi-Producer Single-Consumer) queue algorithms.
//!
//! Two variants share the same contract shape (any number of producers,
//! exactly one consumer):
//!
//! - [`ring`] - bounded and lossy, zero allocation after construction
//! - [`linked`] - unbounded and lossless, allocates one node per push
//!
//! Used by:
//! - [`crate::sync::mpsc`] / [`crate::sync::unbounded`] - heap-backed handle pairs
//! - [`crate::logger`] - the log spooling facade (via the ring)

pub(crate) mod linked;
pub(crate) mod ring;
