use thiserror::Error;

/// Error kinds surfaced by this crate.
///
/// Programmer-error preconditions (a zero-sized element type in the MPMC
/// queue, a zero queue/ring capacity, using a non-restartable iterator with
/// [`crate::fuse`], unlocking a mutex you don't hold) are never represented
/// here — a correct caller never triggers them, so they are `assert!`/
/// `debug_assert!` aborts instead, per the precondition discipline the
/// teacher's own `Config::new` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An allocation failed (only reachable from [`crate::fuse`]'s transient
    /// build-time arrays; every other primitive allocates once at
    /// construction and aborts like `Vec` does on failure).
    #[error("allocation failed")]
    OutOfMemory,
    /// Binary fuse filter construction exhausted `MAX_ITERATIONS` seed
    /// retries; the key set is most likely not unique.
    #[error("binary fuse filter construction failed: keys are likely not unique")]
    KeysLikelyNotUnique,
    /// Thread pool was asked to start with zero workers.
    #[error("thread pool worker count must be greater than zero")]
    InvalidThreadCount,
    /// Thread pool was asked to start with a zero-capacity queue.
    #[error("thread pool queue capacity must be greater than zero")]
    InvalidQueueCapacity,
    /// The queued mutex's `try_lock_until` deadline elapsed before the lock
    /// was acquired.
    #[error("timed out waiting for the lock")]
    TimedOut,
    /// A bounded buffer rejected an insert because it was full.
    #[error("buffer is full")]
    BufferFull,
}
