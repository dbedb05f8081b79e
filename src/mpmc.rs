//! Bounded multi-producer/multi-consumer queue using per-slot sequence
//! counters (Dmitry Vyukov's MPMC queue).
//!
//! # Memory Ordering & Synchronization Strategy
//!
//! Each slot carries a `turn` counter instead of a flag. A producer claims a
//! ticket by `fetch_add`-ing the shared `head` counter, then spins until the
//! slot at `ticket % capacity` reaches the turn that marks it free for this
//! generation (`Acquire`), writes the value, then publishes with a `Release`
//! store of `turn + 1`. The consumer does the mirror image against `tail`.
//! Ticket order is a total order on successful operations; actual completion
//! order of different slots may interleave, but within one slot producer and
//! consumer alternate strictly.

use crate::backoff::Backoff;
use crate::invariants::debug_assert_turn_matches;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Slot<T> {
    turn: AtomicUsize,
    data: UnsafeCell<MaybeUninit<T>>,
}

/// A bounded FIFO queue safe for any number of concurrent producers and
/// consumers.
///
/// `T` must have non-zero size — this is a programmer-error precondition
/// (spec §7) enforced with an `assert!` in [`Queue::with_capacity`], not a
/// recoverable error.
pub struct Queue<T> {
    slots: Box<[crate::align::CachePadded<Slot<T>>]>,
    capacity: usize,
    head: crate::align::CachePadded<AtomicUsize>,
    tail: crate::align::CachePadded<AtomicUsize>,
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Queue<T> {
    /// Creates a queue with room for `capacity` elements.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0` or `size_of::<T>() == 0` — both are
    /// programmer errors a correct caller never triggers (spec §7).
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "MPMC queue capacity must be greater than zero");
        assert!(
            std::mem::size_of::<T>() > 0,
            "MPMC queue does not support zero-sized element types"
        );

        let slots = (0..capacity)
            .map(|i| {
                crate::align::CachePadded::new(Slot {
                    turn: AtomicUsize::new(i),
                    data: UnsafeCell::new(MaybeUninit::uninit()),
                })
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            capacity,
            head: crate::align::CachePadded::new(AtomicUsize::new(0)),
            tail: crate::align::CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the fixed capacity of the queue.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Approximate number of elements currently enqueued. Racy under
    /// concurrent use — treat it as a hint.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        head.saturating_sub(tail).min(self.capacity)
    }

    /// Approximate emptiness check. Racy under concurrent use.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn slot(&self, ticket: usize) -> &crate::align::CachePadded<Slot<T>> {
        &self.slots[ticket % self.capacity]
    }

    #[inline]
    fn expected_turn(&self, ticket: usize) -> usize {
        (ticket / self.capacity) * 2
    }

    /// Enqueues `value`, blocking until a slot becomes available. Always
    /// succeeds.
    pub fn enqueue(&self, value: T) {
        let ticket = self.head.fetch_add(1, Ordering::Relaxed);
        let slot = self.slot(ticket);
        let expected = self.expected_turn(ticket);

        let mut backoff = Backoff::new();
        while slot.turn.load(Ordering::Acquire) != expected {
            backoff.snooze();
        }
        debug_assert_turn_matches!(slot.turn.load(Ordering::Relaxed), expected);

        unsafe {
            (*slot.data.get()).write(value);
        }
        slot.turn.store(expected + 1, Ordering::Release);
    }

    /// Non-blocking enqueue. Returns `Err(value)` if the queue appeared full
    /// at the observation point.
    pub fn try_enqueue(&self, value: T) -> Result<(), T> {
        let mut ticket = self.head.load(Ordering::Relaxed);
        loop {
            let slot = self.slot(ticket);
            let expected = self.expected_turn(ticket);
            let observed = slot.turn.load(Ordering::Acquire);

            if observed == expected {
                match self.head.compare_exchange_weak(
                    ticket,
                    ticket + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        unsafe {
                            (*slot.data.get()).write(value);
                        }
                        slot.turn.store(expected + 1, Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => {
                        ticket = current;
                        continue;
                    }
                }
            } else if observed.wrapping_sub(expected) as isize > 0 {
                // The slot is ahead of where we expected: some other producer
                // already claimed and published this generation's ticket.
                ticket = self.head.load(Ordering::Relaxed);
            } else {
                // The slot is still behind: a consumer hasn't drained the
                // previous generation yet, i.e. the queue is full.
                return Err(value);
            }
        }
    }

    /// Dequeues an element, blocking until one becomes available. Always
    /// returns an element.
    pub fn dequeue(&self) -> T {
        let ticket = self.tail.fetch_add(1, Ordering::Relaxed);
        let slot = self.slot(ticket);
        let expected = self.expected_turn(ticket) + 1;

        let mut backoff = Backoff::new();
        while slot.turn.load(Ordering::Acquire) != expected {
            backoff.snooze();
        }
        debug_assert_turn_matches!(slot.turn.load(Ordering::Relaxed), expected);

        let value = unsafe { (*slot.data.get()).assume_init_read() };
        slot.turn.store(expected + 1, Ordering::Release);
        value
    }

    /// Non-blocking dequeue. Returns `None` if the queue appeared empty at
    /// the observation point.
    pub fn try_dequeue(&self) -> Option<T> {
        let mut ticket = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = self.slot(ticket);
            let expected = self.expected_turn(ticket) + 1;
            let observed = slot.turn.load(Ordering::Acquire);

            if observed == expected {
                match self.tail.compare_exchange_weak(
                    ticket,
                    ticket + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        let value = unsafe { (*slot.data.get()).assume_init_read() };
                        slot.turn.store(expected + 1, Ordering::Release);
                        return Some(value);
                    }
                    Err(current) => {
                        ticket = current;
                        continue;
                    }
                }
            } else if observed.wrapping_sub(expected) as isize > 0 {
                ticket = self.tail.load(Ordering::Relaxed);
            } else {
                return None;
            }
        }
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        // Drain any elements still in the queue so their destructors run.
        while self.try_dequeue().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn e1_capacity_four_fifo() {
        let q = Queue::<i32>::with_capacity(4);
        q.enqueue(1);
        q.enqueue(2);
        q.enqueue(3);
        q.enqueue(4);
        assert!(q.try_enqueue(5).is_err());

        assert_eq!(q.dequeue(), 1);
        assert_eq!(q.dequeue(), 2);
        assert_eq!(q.dequeue(), 3);
        assert_eq!(q.dequeue(), 4);
        assert!(q.is_empty());
    }

    #[test]
    fn try_dequeue_empty_returns_none() {
        let q = Queue::<i32>::with_capacity(4);
        assert_eq!(q.try_dequeue(), None);
    }

    #[test]
    fn single_producer_consumer_preserves_order() {
        let q = Queue::<i32>::with_capacity(8);
        for i in 0..100 {
            q.enqueue(i);
        }
        for i in 0..100 {
            assert_eq!(q.dequeue(), i);
        }
    }

    #[test]
    fn conservation_under_concurrency() {
        let q = Arc::new(Queue::<u64>::with_capacity(64));
        let produced = Arc::new(StdAtomicUsize::new(0));
        let consumed_sum = Arc::new(std::sync::atomic::AtomicU64::new(0));

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let q = Arc::clone(&q);
                let produced = Arc::clone(&produced);
                thread::spawn(move || {
                    for i in 0..1000u64 {
                        q.enqueue(p * 1000 + i);
                        produced.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let q = Arc::clone(&q);
                let consumed_sum = Arc::clone(&consumed_sum);
                thread::spawn(move || {
                    let mut local = 0u64;
                    for _ in 0..1000 {
                        local += q.dequeue();
                    }
                    consumed_sum.fetch_add(local, Ordering::Relaxed);
                })
            })
            .collect();

        for h in producers {
            h.join().unwrap();
        }
        for h in consumers {
            h.join().unwrap();
        }

        let expected: u64 = (0..4u64).map(|p| (0..1000u64).map(|i| p * 1000 + i).sum::<u64>()).sum();
        assert_eq!(consumed_sum.load(Ordering::Relaxed), expected);
        assert!(q.is_empty());
    }
}
