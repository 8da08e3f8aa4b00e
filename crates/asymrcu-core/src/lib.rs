//! # asymrcu-core
//!
//! User-space read-copy-update for shared-nothing readers and rare
//! writers.
//!
//! Readers enter and exit critical sections with nothing but a pair of
//! relaxed operations on their own cache line and a compiler fence; no
//! atomic read-modify-write, no syscall, no contended write. A writer that
//! needs to reclaim memory calls [`synchronize_rcu`] (or
//! [`RcuDomain::synchronize`]), which promotes the readers' compiler
//! fences to real ones with a single process-wide heavy fence, scans the
//! registered threads, and sleeps on a futex until the last holdout
//! reports its top-level exit.
//!
//! Two API layers are provided over the same machinery:
//!
//! - [`RcuDomain`] plus [`ReaderRegistration`] handles: self-contained,
//!   any number of independent domains per process, friendly to tests.
//! - The process-wide free functions [`rcu_init`], [`rcu_thread_online`],
//!   [`rcu_thread_offline`], [`rcu_read_lock`], [`rcu_read_unlock`] and
//!   [`synchronize_rcu`], which cache the reader record in thread-local
//!   storage.
//!
//! [`RcuCell`] covers the usual publication pattern: release-publish a new
//! value, retire the old one, reclaim it after a grace period.
//!
//! ```no_run
//! use asymrcu_core::{RcuCell, RcuDomain};
//!
//! let domain = RcuDomain::new()?;
//! let cell = RcuCell::new(Box::new(1u64));
//!
//! std::thread::scope(|scope| {
//!     scope.spawn(|| {
//!         let registration = domain.register_reader();
//!         let guard = registration.read_lock();
//!         // SAFETY: the guard spans the load and the use of the value.
//!         let value = unsafe { cell.load() }.copied();
//!         drop(guard);
//!         assert!(value.is_some());
//!     });
//!
//!     cell.replace(Some(Box::new(2))).reclaim_after(&domain);
//! });
//! # Ok::<(), asymrcu_core::RcuInitError>(())
//! ```
//!
//! # Blocking behavior
//!
//! `synchronize` blocks until every critical section in progress at its
//! start has ended; a reader that never exits blocks it forever. Readers
//! never block on writers or on each other.

pub mod cell;
pub mod domain;
pub mod error;
pub mod fence;
mod futex;
pub mod global;

pub use cell::{RcuCell, Retired};
pub use domain::{RcuDomain, RcuReadGuard, ReaderRegistration};
pub use error::RcuInitError;
pub use global::{
    rcu_init, rcu_read_lock, rcu_read_unlock, rcu_thread_offline, rcu_thread_online,
    synchronize_rcu,
};
