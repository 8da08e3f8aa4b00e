//! Futex-backed wait channel.
//!
//! A 32-bit word with wait-while-equal / wake-all semantics. The
//! grace-period engine uses the word itself as its holdout counter, so the
//! channel exposes the relaxed word accessors alongside the parking
//! operations. Spurious wakeups are permitted; callers are expected to
//! re-read the word and decide for themselves whether to park again, which
//! also absorbs `EINTR` and `EAGAIN` from the syscall.

use std::sync::atomic::{AtomicU32, Ordering};

/// Wait-while-equal / wake-all channel over an atomic `u32`.
///
/// Cache-line aligned so parked writers hammering the futex word never
/// share a line with neighbouring state.
#[repr(align(64))]
pub(crate) struct WaitChannel {
    word: AtomicU32,
}

impl WaitChannel {
    pub(crate) const fn new(value: u32) -> Self {
        Self {
            word: AtomicU32::new(value),
        }
    }

    #[inline]
    pub(crate) fn load_relaxed(&self) -> u32 {
        self.word.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn store_relaxed(&self, value: u32) {
        self.word.store(value, Ordering::Relaxed);
    }

    /// Relaxed subtraction; returns the previous value.
    #[inline]
    pub(crate) fn fetch_sub_relaxed(&self, n: u32) -> u32 {
        self.word.fetch_sub(n, Ordering::Relaxed)
    }

    /// Block while the word equals `expected`.
    ///
    /// Returns immediately when the word has already changed, on a wake,
    /// on a signal, or spuriously. The caller re-reads the word in a loop.
    #[cfg(target_os = "linux")]
    pub(crate) fn wait(&self, expected: u32) {
        // SAFETY: the futex word is a valid, live userspace address for the
        // whole call and the timeout pointer is null.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_futex,
                &self.word as *const AtomicU32 as *const u32,
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                expected,
                std::ptr::null::<libc::timespec>(),
            )
        };
        // EAGAIN (the word moved on) and EINTR are benign here.
        let _ = rc;
    }

    #[cfg(not(target_os = "linux"))]
    pub(crate) fn wait(&self, expected: u32) {
        if self.word.load(Ordering::Relaxed) == expected {
            std::thread::yield_now();
        }
    }

    /// Wake every waiter parked on the word.
    #[cfg(target_os = "linux")]
    pub(crate) fn wake_all(&self) {
        // SAFETY: the futex word is a valid, live userspace address.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_futex,
                &self.word as *const AtomicU32 as *const u32,
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                i32::MAX,
            )
        };
        let _ = rc;
    }

    #[cfg(not(target_os = "linux"))]
    pub(crate) fn wake_all(&self) {}
}
