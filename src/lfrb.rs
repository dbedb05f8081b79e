//! Bounded lock-free ring buffer with cursors (Folly-style
//! `LockFreeRingBuffer`).
//!
//! Writers never block: once capacity is reached, a write overwrites the
//! oldest entry. Readers race writers and detect torn reads via a per-cell
//! sequencer instead of locking.
//!
//! # Sequencer protocol
//!
//! Each cell's `sequencer` encodes `slot_turn*2` (free at this generation),
//! `slot_turn*2 + 1` (write in progress), or `(slot_turn+1)*2` (published).
//! A writer for ticket `t` (`slot_turn = t / capacity`) waits for
//! `seq == slot_turn*2`, bumps to `slot_turn*2 + 1`, copies the value, then
//! bumps to `(slot_turn+1)*2`. A reader for cursor `t` waits for
//! `seq == (t/capacity + 1)*2`, copies the value, then re-checks `seq` —
//! if it changed, the value may have been torn by a concurrent writer and
//! the read is reported as a miss rather than trusted.

use crate::align::{copy_slot, CachePadded};
use crate::invariants::debug_assert_sequencer_step;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// An opaque, monotonically increasing ticket identifying a slot and a
/// generation within a [`LockFreeRingBuffer`].
///
/// Arithmetic on cursors saturates rather than wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor(u64);

impl Cursor {
    /// The raw ticket value.
    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }

    /// Returns a new cursor advanced by `n`, saturating at `u64::MAX`, and
    /// whether the value actually changed.
    #[inline]
    pub fn move_forward(self, n: u64) -> (Self, bool) {
        let next = self.0.saturating_add(n);
        (Cursor(next), next != self.0)
    }

    /// Returns a new cursor moved back by `n`, saturating at `0`, and
    /// whether the value actually changed.
    #[inline]
    pub fn move_backward(self, n: u64) -> (Self, bool) {
        let next = self.0.saturating_sub(n);
        (Cursor(next), next != self.0)
    }
}

struct Cell<T> {
    sequencer: AtomicU32,
    data: UnsafeCell<MaybeUninit<T>>,
}

/// A bounded, overwriting ring buffer that many readers may race against
/// many writers.
pub struct LockFreeRingBuffer<T> {
    cells: Box<[CachePadded<Cell<T>>]>,
    capacity: u64,
    head: CachePadded<AtomicU64>,
}

unsafe impl<T: Send> Send for LockFreeRingBuffer<T> {}
unsafe impl<T: Send> Sync for LockFreeRingBuffer<T> {}

impl<T> LockFreeRingBuffer<T> {
    /// Creates a ring buffer with room for `capacity` live entries.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0` (programmer error, spec §4.2).
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be greater than zero");
        let cells = (0..capacity)
            .map(|_| {
                CachePadded::new(Cell {
                    sequencer: AtomicU32::new(0),
                    data: UnsafeCell::new(MaybeUninit::uninit()),
                })
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            cells,
            capacity: capacity as u64,
            head: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Returns the fixed capacity of the buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Publishes `value`, discarding the oldest entry if the buffer is full.
    pub fn write(&self, value: T) {
        self.write_and_cursor(value);
    }

    /// Like [`write`](Self::write), returning the cursor the value was
    /// published at.
    pub fn write_and_cursor(&self, value: T) -> Cursor {
        let ticket = self.head.fetch_add(1, Ordering::Relaxed);
        let idx = (ticket % self.capacity) as usize;
        let cell = &self.cells[idx];
        let slot_turn = ticket / self.capacity;
        let free_seq = slot_turn.wrapping_mul(2) as u32;
        let writing_seq = free_seq.wrapping_add(1);
        let published_seq = slot_turn.wrapping_add(1).wrapping_mul(2) as u32;

        let mut backoff = crate::backoff::Backoff::new();
        while cell.sequencer.load(Ordering::Acquire) != free_seq {
            backoff.snooze();
        }

        cell.sequencer.store(writing_seq, Ordering::Release);
        debug_assert_sequencer_step!(free_seq, writing_seq);
        unsafe {
            *cell.data.get() = MaybeUninit::new(value);
        }
        cell.sequencer.store(published_seq, Ordering::Release);
        debug_assert_sequencer_step!(writing_seq, published_seq);

        Cursor(ticket)
    }

    /// Attempts to copy the value published at `cursor`. Returns `None` if
    /// the slot is not currently showing that generation as published —
    /// either it hasn't been written yet, or a later writer has already
    /// lapped it.
    pub fn try_read(&self, cursor: Cursor) -> Option<T>
    where
        T: Copy,
    {
        let ticket = cursor.value();
        let idx = (ticket % self.capacity) as usize;
        let cell = &self.cells[idx];
        let slot_turn = ticket / self.capacity;
        let required = slot_turn.wrapping_add(1).wrapping_mul(2) as u32;

        if cell.sequencer.load(Ordering::Acquire) != required {
            return None;
        }
        let copied = unsafe { copy_slot(cell.data.get().cast_const()) };
        if cell.sequencer.load(Ordering::Acquire) != required {
            return None; // torn: a writer overtook us mid-copy
        }
        Some(unsafe { copied.assume_init() })
    }

    /// Spins until `cursor`'s generation is published, then attempts the
    /// read. If a concurrent writer laps the slot before or during the
    /// copy, returns `None` rather than spinning forever.
    pub fn wait_and_try_read(&self, cursor: Cursor) -> Option<T>
    where
        T: Copy,
    {
        let ticket = cursor.value();
        let idx = (ticket % self.capacity) as usize;
        let cell = &self.cells[idx];
        let slot_turn = ticket / self.capacity;
        let required = slot_turn.wrapping_add(1).wrapping_mul(2) as u32;

        let mut backoff = crate::backoff::Backoff::new();
        loop {
            let seq = cell.sequencer.load(Ordering::Acquire);
            if seq == required {
                break;
            }
            if seq.wrapping_sub(required) as i32 > 0 {
                return None; // lapped before we ever observed publication
            }
            backoff.snooze();
        }
        self.try_read(cursor)
    }

    /// Returns the latest published ticket (exclusive upper bound).
    pub fn current_head(&self) -> Cursor {
        Cursor(self.head.load(Ordering::Acquire))
    }

    /// Returns `max(head - capacity, 0)` as a cursor — the oldest ticket
    /// that could still be readable.
    pub fn current_tail(&self) -> Cursor {
        let head = self.head.load(Ordering::Acquire);
        Cursor(head.saturating_sub(self.capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn e2_write_then_immediate_read() {
        let rb = LockFreeRingBuffer::<i32>::new(4);
        let c = rb.write_and_cursor(42);
        assert_eq!(rb.try_read(c), Some(42));
    }

    #[test]
    fn lapped_cursor_may_miss() {
        let rb = LockFreeRingBuffer::<i32>::new(4);
        let c = rb.write_and_cursor(42);
        for i in 0..8 {
            rb.write(i);
        }
        // c is several generations behind now; a miss is an allowed outcome.
        let _ = rb.try_read(c);
    }

    #[test]
    fn current_tail_saturates_at_zero_when_empty() {
        let rb = LockFreeRingBuffer::<i32>::new(4);
        assert_eq!(rb.current_tail().value(), 0);
        assert_eq!(rb.current_head().value(), 0);
    }

    #[test]
    fn cursor_arithmetic_saturates() {
        let c = Cursor(3);
        let (back, changed) = c.move_backward(10);
        assert_eq!(back.value(), 0);
        assert!(changed);

        let (back_again, changed_again) = back.move_backward(1);
        assert_eq!(back_again.value(), 0);
        assert!(!changed_again);
    }

    #[test]
    fn concurrent_writers_readers_never_tear() {
        use std::sync::Arc;
        use std::thread;

        #[derive(Clone, Copy)]
        struct Wide([u64; 8]);

        let rb = Arc::new(LockFreeRingBuffer::<Wide>::new(16));
        let writer = {
            let rb = Arc::clone(&rb);
            thread::spawn(move || {
                for i in 0..2000u64 {
                    rb.write(Wide([i; 8]));
                }
            })
        };

        let reader = {
            let rb = Arc::clone(&rb);
            thread::spawn(move || {
                for _ in 0..5000 {
                    let head = rb.current_head();
                    if head.value() == 0 {
                        continue;
                    }
                    if let Some(Wide(arr)) = rb.try_read(Cursor(head.value() - 1)) {
                        assert!(arr.iter().all(|&x| x == arr[0]));
                    }
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
    }
}
