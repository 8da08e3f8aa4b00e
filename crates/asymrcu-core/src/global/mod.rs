//! Process-wide domain and the free-function API.
//!
//! Wraps a single [`RcuDomain`] in a process-global slot and caches each
//! participating thread's reader record in thread-local storage, so the
//! classic `rcu_read_lock()` / `rcu_read_unlock()` bracket works without
//! threading a handle through every call site. The hot path is one
//! thread-local pointer read on top of the handle-based path.
//!
//! Threads that exit while still online are deregistered by the
//! thread-local destructor.

use std::cell::{Cell, RefCell};
use std::ptr;
use std::sync::OnceLock;

use crate::domain::{RcuDomain, ReaderRegistration, ThreadState};
use crate::error::RcuInitError;

static GLOBAL: OnceLock<RcuDomain> = OnceLock::new();

thread_local! {
    /// Fast-path pointer to this thread's reader record; null while the
    /// thread is offline.
    static ACTIVE: Cell<*const ThreadState> = const { Cell::new(ptr::null()) };
    /// Owning slot for the registration. Dropping it (explicit offline or
    /// thread exit) deregisters the record.
    static REGISTRATION: RefCell<Option<OnlineSlot>> = const { RefCell::new(None) };
}

struct OnlineSlot {
    registration: ReaderRegistration<'static>,
}

impl Drop for OnlineSlot {
    fn drop(&mut self) {
        // try_with: the fast-path cell may already be gone during
        // thread-local teardown.
        let _ = ACTIVE.try_with(|active| active.set(ptr::null()));
    }
}

/// Initialize the process-wide domain.
///
/// Must complete successfully before any other free function in this
/// module is used. Calling it again is harmless.
pub fn rcu_init() -> Result<(), RcuInitError> {
    if GLOBAL.get().is_none() {
        let domain = RcuDomain::new()?;
        // Losing the race just means another thread installed the domain.
        let _ = GLOBAL.set(domain);
    }
    Ok(())
}

fn global() -> &'static RcuDomain {
    GLOBAL
        .get()
        .expect("rcu_init() must complete before using the process-wide API")
}

/// Register the calling thread as a reader of the process-wide domain.
///
/// # Panics
///
/// Panics if [`rcu_init`] has not completed or the thread is already
/// online.
pub fn rcu_thread_online() {
    REGISTRATION.with(|slot| {
        let mut slot = slot.borrow_mut();
        assert!(slot.is_none(), "thread is already online");
        let registration = global().register_reader();
        ACTIVE.set(registration.state_ptr().as_ptr());
        *slot = Some(OnlineSlot { registration });
    });
}

/// Deregister the calling thread.
///
/// # Panics
///
/// Panics if the thread is not online or is inside a read-side critical
/// section.
pub fn rcu_thread_offline() {
    REGISTRATION.with(|slot| {
        let mut slot = slot.borrow_mut();
        let online = slot.as_ref().expect("thread is not online");
        assert!(
            !online.registration.in_critical_section(),
            "rcu_thread_offline inside a read-side critical section"
        );
        *slot = None;
    });
}

#[inline]
fn active_state() -> &'static ThreadState {
    let state = ACTIVE.get();
    assert!(!state.is_null(), "calling thread is not online");
    // SAFETY: a non-null pointer means this thread's registration is live;
    // the record is retired only by rcu_thread_offline or thread exit, both
    // on this same thread, so it outlives the borrow.
    unsafe { &*state }
}

/// Enter a read-side critical section on the process-wide domain. Nestable.
#[inline]
pub fn rcu_read_lock() {
    active_state().read_lock();
}

/// Exit a read-side critical section.
#[inline]
pub fn rcu_read_unlock() {
    active_state().read_unlock(global());
}

/// Wait for a full grace period on the process-wide domain.
///
/// Calling this from inside the current thread's own read-side critical
/// section would deadlock and is a caller bug.
pub fn synchronize_rcu() {
    let state = ACTIVE.get();
    if !state.is_null() {
        // SAFETY: as in `active_state`.
        let nesting = unsafe { &*state }.current_nesting();
        debug_assert_eq!(
            nesting, 0,
            "synchronize_rcu inside the caller's own read-side critical section"
        );
    }
    global().synchronize();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn init() {
        rcu_init().expect("host must support the heavy fence");
    }

    #[test]
    fn init_is_repeatable() {
        init();
        init();
    }

    #[test]
    fn online_lock_unlock_offline_round_trip() {
        init();
        std::thread::spawn(|| {
            rcu_thread_online();
            rcu_read_lock();
            rcu_read_lock();
            rcu_read_unlock();
            rcu_read_unlock();
            rcu_thread_offline();
        })
        .join()
        .expect("worker panicked");
    }

    #[test]
    fn synchronize_from_an_online_thread() {
        init();
        std::thread::spawn(|| {
            rcu_thread_online();
            synchronize_rcu();
            rcu_thread_offline();
        })
        .join()
        .expect("worker panicked");
    }

    #[test]
    fn synchronize_from_an_unregistered_thread() {
        init();
        std::thread::spawn(synchronize_rcu)
            .join()
            .expect("worker panicked");
    }

    #[test]
    fn thread_exit_offlines_implicitly() {
        init();
        std::thread::spawn(|| {
            rcu_thread_online();
            // No explicit offline: the thread-local destructor handles it.
        })
        .join()
        .expect("worker panicked");
        // A grace period after the exit must not wait on the dead thread.
        synchronize_rcu();
    }

    #[test]
    fn readers_and_writer_share_the_global_domain() {
        init();
        static PUBLISHED: AtomicU64 = AtomicU64::new(1);

        let reader = std::thread::spawn(|| {
            rcu_thread_online();
            for _ in 0..1000 {
                rcu_read_lock();
                assert_ne!(PUBLISHED.load(Ordering::Acquire), 0);
                rcu_read_unlock();
            }
            rcu_thread_offline();
        });
        let writer = std::thread::spawn(|| {
            for value in 2..50u64 {
                PUBLISHED.store(value, Ordering::Release);
                synchronize_rcu();
            }
        });
        reader.join().expect("reader panicked");
        writer.join().expect("writer panicked");
    }

    #[test]
    #[should_panic(expected = "already online")]
    fn double_online_panics() {
        init();
        // Run on a dedicated thread so the poisoned TLS state dies with it.
        let result = std::thread::spawn(|| {
            rcu_thread_online();
            rcu_thread_online();
        })
        .join();
        std::panic::resume_unwind(result.unwrap_err());
    }

    #[test]
    #[should_panic(expected = "not online")]
    fn lock_while_offline_panics() {
        init();
        let result = std::thread::spawn(rcu_read_lock).join();
        std::panic::resume_unwind(result.unwrap_err());
    }
}
