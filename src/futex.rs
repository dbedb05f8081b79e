//! Futex wait/wake primitives backing [`crate::mutex`].
//!
//! On Linux this is a thin wrapper over the `futex(2)` syscall. Every other
//! target falls back to a yielding spin, per spec §6 ("non-Linux ports may
//! substitute an equivalent park/unpark facility") — we keep the fallback
//! simple rather than pulling in a platform-specific parking crate nothing
//! else in this tree needs.

use std::sync::atomic::AtomicU32;
use std::time::Duration;

/// Blocks the calling thread until `atomic` no longer holds `expected`, or
/// until it is woken via [`wake_one`]/[`wake_all`].
#[cfg(target_os = "linux")]
pub(crate) fn wait(atomic: &AtomicU32, expected: u32) {
    use std::sync::atomic::Ordering;

    if atomic.load(Ordering::Relaxed) != expected {
        return;
    }
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            atomic as *const AtomicU32,
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
            expected,
            std::ptr::null::<libc::timespec>(),
        );
    }
}

/// Like [`wait`], but gives up and returns `false` if `timeout` elapses
/// first. Backs [`crate::mutex::Queued::try_lock_until`].
#[cfg(target_os = "linux")]
pub(crate) fn wait_timeout(atomic: &AtomicU32, expected: u32, timeout: Duration) -> bool {
    use std::sync::atomic::Ordering;

    if atomic.load(Ordering::Relaxed) != expected {
        return true;
    }
    let ts = libc::timespec {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_nsec: libc::c_long::from(timeout.subsec_nanos() as i32),
    };
    let rc = unsafe {
        libc::syscall(
            libc::SYS_futex,
            atomic as *const AtomicU32,
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
            expected,
            &ts as *const libc::timespec,
        )
    };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() != Some(libc::ETIMEDOUT)
}

/// Wakes at most one waiter blocked in [`wait`]/[`wait_timeout`] on `atomic`.
#[cfg(target_os = "linux")]
pub(crate) fn wake_one(atomic: &AtomicU32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            atomic as *const AtomicU32,
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            1i32,
        );
    }
}

/// Wakes every waiter blocked in [`wait`]/[`wait_timeout`] on `atomic`.
#[cfg(target_os = "linux")]
pub(crate) fn wake_all(atomic: &AtomicU32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            atomic as *const AtomicU32,
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            i32::MAX,
        );
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn wait(_atomic: &AtomicU32, _expected: u32) {
    std::thread::yield_now();
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn wait_timeout(_atomic: &AtomicU32, _expected: u32, _timeout: Duration) -> bool {
    std::thread::yield_now();
    true
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn wake_one(_atomic: &AtomicU32) {}

#[cfg(not(target_os = "linux"))]
pub(crate) fn wake_all(_atomic: &AtomicU32) {}
