//! corelib — lock-free and blocking concurrency primitives.
//!
//! A bounded multi-producer/multi-consumer queue, a lock-free overwriting
//! ring buffer with cursors, a wait-free single-producer/single-consumer
//! queue, two futex-backed mutex variants, a thread pool composing the
//! MPMC queue, and a binary fuse filter for approximate membership.
//!
//! This is an in-process primitives library: no wire protocol, no
//! persistence, no cross-process or shared-memory queues, no cryptographic
//! hashing, and no exact-membership sets. Every structure is bounded at
//! construction time — there is no unbounded growth anywhere in this crate.
//!
//! # Example
//!
//! ```
//! use corelib::mpmc::Queue;
//!
//! let queue = Queue::<u32>::with_capacity(4);
//! queue.enqueue(1);
//! queue.enqueue(2);
//! assert_eq!(queue.dequeue(), 1);
//! assert_eq!(queue.dequeue(), 2);
//! ```

mod align;
mod backoff;
mod error;
mod futex;
mod invariants;

pub mod fuse;
pub mod lfrb;
pub mod mpmc;
pub mod mutex;
pub mod spsc;
pub mod threadpool;

pub use align::CachePadded;
pub use backoff::Backoff;
pub use error::CoreError;
pub use fuse::{BinaryFuse, BinaryFuse16, BinaryFuse32, BinaryFuse8, KeyIter, SliceKeys};
pub use lfrb::{Cursor, LockFreeRingBuffer};
pub use mutex::{Queued, QueuedGuard, ThreeState, ThreeStateGuard};
pub use threadpool::{Config as ThreadPoolConfig, ThreadPool};
