//! Debug assertion macros for this crate's concurrency invariants.
//!
//! These provide runtime checks for the invariants documented in spec §8.
//! They are only active in debug builds (`#[cfg(debug_assertions)]`), so
//! there is zero overhead in release builds.

// =============================================================================
// INV-MPMC-01: Turn parity
// =============================================================================

/// Assert a slot's `turn` matches the expected generation before a producer
/// or consumer commits to it.
///
/// **Invariant**: at the point of commit, `slot.turn == expected`.
///
/// Used in: `mpmc::Queue::enqueue`/`dequeue` right before the release store.
macro_rules! debug_assert_turn_matches {
    ($observed:expr, $expected:expr) => {
        debug_assert!(
            $observed == $expected,
            "INV-MPMC-01 violated: slot turn {} does not match expected {}",
            $observed,
            $expected
        )
    };
}

// =============================================================================
// INV-LFRB-01: Sequencer monotonic generations
// =============================================================================

/// Assert a cell's sequencer only ever advances to the next even generation
/// the writer is responsible for.
///
/// **Invariant**: `new_seq == old_seq + 1` during the writing transition,
/// `new_seq == old_seq + 1` again during publish.
///
/// Used in: `lfrb::LockFreeRingBuffer::write`.
macro_rules! debug_assert_sequencer_step {
    ($old:expr, $new:expr) => {
        debug_assert!(
            $new == $old.wrapping_add(1),
            "INV-LFRB-01 violated: sequencer stepped from {} to {} (expected +1)",
            $old,
            $new
        )
    };
}

// =============================================================================
// INV-SPSC-01: Bounded count
// =============================================================================

/// Assert the number of occupied slots never exceeds the Lamport buffer's
/// usable capacity (`N`, out of `N+1` physical slots).
///
/// Used in: `spsc::Queue::push`/`push_many` after computing the next write
/// index.
macro_rules! debug_assert_spsc_not_overfull {
    ($occupied:expr, $capacity:expr) => {
        debug_assert!(
            $occupied <= $capacity,
            "INV-SPSC-01 violated: occupied {} exceeds capacity {}",
            $occupied,
            $capacity
        )
    };
}

// =============================================================================
// INV-MUTEX-01: Legal state word
// =============================================================================

/// Assert a three-state mutex's state word is one of the three legal values.
///
/// Used in: `mutex::ThreeState::lock_contended`/`unlock` after each load.
macro_rules! debug_assert_legal_mutex_state {
    ($state:expr) => {
        debug_assert!(
            $state == 0 || $state == 1 || $state == 3,
            "INV-MUTEX-01 violated: state word {} is not UNLOCKED|LOCKED|CONTENDED",
            $state
        )
    };
}

pub(crate) use debug_assert_legal_mutex_state;
pub(crate) use debug_assert_sequencer_step;
pub(crate) use debug_assert_spsc_not_overfull;
pub(crate) use debug_assert_turn_matches;
