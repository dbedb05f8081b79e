//! Single-producer/single-consumer queue with wait-free batch operations
//! (classical Lamport ring buffer).
//!
//! `read_index` and `write_index` each live on their own cache line to avoid
//! false sharing between the producer and consumer cores. The backing array
//! has `N + 1` slots so "full" and "empty" are unambiguous without a
//! separate count: empty iff the indices are equal, full iff
//! `next(write) == read`. Indices are never stored modulo capacity — the
//! modulo is computed fresh each time a slot is addressed.

use crate::align::CachePadded;
use crate::invariants::debug_assert_spsc_not_overfull;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A wait-free bounded queue for exactly one producer thread and one
/// consumer thread.
pub struct Queue<T> {
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
    physical_capacity: usize,
    read: CachePadded<AtomicUsize>,
    write: CachePadded<AtomicUsize>,
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Queue<T> {
    /// Creates a queue that can hold up to `capacity` elements.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "SPSC queue capacity must be greater than zero");
        let physical_capacity = capacity + 1;
        let buf = (0..physical_capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            buf,
            physical_capacity,
            read: CachePadded::new(AtomicUsize::new(0)),
            write: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    #[inline]
    fn next(&self, idx: usize) -> usize {
        let n = idx + 1;
        if n == self.physical_capacity {
            0
        } else {
            n
        }
    }

    /// Logical capacity (`N`, i.e. `physical_capacity - 1`).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.physical_capacity - 1
    }

    /// Approximate emptiness check — valid for the calling thread's own
    /// role (producer or consumer); a torn read from the other role's index
    /// is benign since it can only make the check too conservative.
    pub fn empty(&self) -> bool {
        self.read.load(Ordering::Acquire) == self.write.load(Ordering::Acquire)
    }

    /// Number of free slots the producer may currently write into.
    pub fn write_available(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Relaxed);
        let occupied = if write >= read {
            write - read
        } else {
            self.physical_capacity - read + write
        };
        self.capacity() - occupied
    }

    /// Number of elements currently available to the consumer.
    pub fn read(&self) -> usize {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);
        if write >= read {
            write - read
        } else {
            self.physical_capacity - read + write
        }
    }

    /// Pushes one value. Returns `false` if the queue is currently full
    /// (the consumer hasn't advanced enough).
    pub fn push(&self, value: T) -> bool {
        let write = self.write.load(Ordering::Relaxed);
        let next_write = self.next(write);
        if next_write == self.read.load(Ordering::Acquire) {
            return false; // full
        }
        unsafe {
            (*self.buf[write].get()).write(value);
        }
        self.write.store(next_write, Ordering::Release);
        true
    }

    /// Pushes one value, surfacing a full queue as
    /// [`CoreError::BufferFull`](crate::error::CoreError::BufferFull)
    /// instead of a bare `bool` — a peripheral helper for callers that
    /// already propagate `CoreError` elsewhere.
    pub fn try_push(&self, value: T) -> Result<(), crate::error::CoreError> {
        if self.push(value) {
            Ok(())
        } else {
            Err(crate::error::CoreError::BufferFull)
        }
    }

    /// Writes as many elements of `values` as the queue has room for.
    /// Returns the number actually written.
    pub fn push_many(&self, values: &[T]) -> usize
    where
        T: Copy,
    {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Relaxed);
        let occupied = if write >= read {
            write - read
        } else {
            self.physical_capacity - read + write
        };
        let free = self.capacity() - occupied;
        let to_write = free.min(values.len());
        debug_assert_spsc_not_overfull!(occupied + to_write, self.capacity());

        let mut idx = write;
        for value in &values[..to_write] {
            unsafe {
                (*self.buf[idx].get()).write(*value);
            }
            idx = self.next(idx);
        }
        if to_write > 0 {
            self.write.store(idx, Ordering::Release);
        }
        to_write
    }

    /// Pops one value, or `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        let read = self.read.load(Ordering::Relaxed);
        if read == self.write.load(Ordering::Acquire) {
            return None; // empty
        }
        let value = unsafe { (*self.buf[read].get()).assume_init_read() };
        self.read.store(self.next(read), Ordering::Release);
        Some(value)
    }

    /// Pops up to `out.len()` values into `out`. Returns the number popped.
    pub fn pop_many(&self, out: &mut [T]) -> usize
    where
        T: Copy,
    {
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Relaxed);
        let available = if write >= read {
            write - read
        } else {
            self.physical_capacity - read + write
        };
        let to_read = available.min(out.len());

        let mut idx = read;
        for slot in out.iter_mut().take(to_read) {
            *slot = unsafe { (*self.buf[idx].get()).assume_init_read() };
            idx = self.next(idx);
        }
        if to_read > 0 {
            self.read.store(idx, Ordering::Release);
        }
        to_read
    }

    /// Returns a reference to the next value without removing it.
    ///
    /// # Safety
    ///
    /// The queue must not be empty — the consumer is responsible for
    /// checking [`Self::empty`] or [`Self::read`] first. Calling this on an
    /// empty queue reads uninitialized memory.
    pub unsafe fn peek(&self) -> &T {
        let read = self.read.load(Ordering::Relaxed);
        (*self.buf[read].get()).assume_init_ref()
    }

    /// Resets the queue to empty.
    ///
    /// Not thread-safe: the caller must ensure no producer or consumer is
    /// concurrently operating on the queue.
    pub fn reset(&self) {
        while self.pop().is_some() {}
        self.read.store(0, Ordering::Relaxed);
        self.write.store(0, Ordering::Relaxed);
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn e3_capacity_two_push_pop() {
        let q = Queue::<i32>::new(2);
        assert!(q.push(1));
        assert!(q.push(2));
        assert!(!q.push(3));

        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn push_many_caps_at_available_space() {
        let q = Queue::<i32>::new(4);
        let written = q.push_many(&[1, 2, 3, 4, 5]);
        assert_eq!(written, 4);
        assert_eq!(q.write_available(), 0);

        let mut out = [0; 8];
        let read = q.pop_many(&mut out);
        assert_eq!(read, 4);
        assert_eq!(&out[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn try_push_surfaces_buffer_full_error() {
        let q = Queue::<i32>::new(1);
        assert!(q.try_push(1).is_ok());
        assert_eq!(q.try_push(2), Err(crate::error::CoreError::BufferFull));
    }

    #[test]
    fn reset_clears_state() {
        let q = Queue::<i32>::new(4);
        q.push(1);
        q.push(2);
        q.reset();
        assert!(q.empty());
        assert_eq!(q.write_available(), 4);
    }

    #[test]
    fn concurrent_producer_consumer_preserves_order_and_count() {
        use std::sync::Arc;
        use std::thread;

        let q = Arc::new(Queue::<u64>::new(128));
        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let mut sent = 0u64;
                while sent < 100_000 {
                    if q.push(sent) {
                        sent += 1;
                    }
                }
            })
        };

        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let mut expected = 0u64;
                while expected < 100_000 {
                    if let Some(v) = q.pop() {
                        assert_eq!(v, expected);
                        expected += 1;
                    }
                }
            })
        };

        producer.join().unwrap();
        consumer.join().unwrap();
    }
}
