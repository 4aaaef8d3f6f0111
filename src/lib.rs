//! Lock-free MPSC queues and a log spooling facade built on them.
//!
//! The crate provides two multi-producer single-consumer queue cores:
//!
//! - a bounded, lossy ring buffer ([`sync::mpsc`]) that performs no heap
//!   allocation after construction and reports rejection instead of blocking
//!   when full,
//! - an unbounded linked queue ([`sync::unbounded`]) that never rejects but
//!   allocates one node per push,
//!
//! plus [`logger`], a thin front-end that spools text messages from many
//! threads through the ring and drains them on a single consumer thread.
//!
//! # Example
//!
//! ```
//! let (tx, rx) = spool::sync::mpsc::channel::<u64>(8).unwrap();
//!
//! tx.push(7).expect("queue full");
//! assert_eq!(rx.pop(), Some(7));
//! ```

pub mod logger;
pub(crate) mod mpsc;
pub mod sync;
pub mod trace;
