//! Grace-period engine.
//!
//! A domain ties together the three ingredients of the protocol: the
//! grace-period mutex (which serializes initiators and registry mutation),
//! the holdout counter (which doubles as the futex word initiators sleep
//! on), and the registry of online reader records.
//!
//! # The fence choreography
//!
//! Every grace period guarantees two things. First, at least one
//! sequentially consistent fence executes on the initiator's thread (one of
//! F, G, H always runs). Second, for every reader contemporaneous with the
//! grace period, either the start of the grace period happens-before the
//! start of the reader with an SC fence on the initiator's thread in
//! between (via F), or the end of the reader happens-before the end of the
//! grace period with an SC fence on the initiator's thread after it (via G
//! when the initiator claimed the reader, via H when the reader reported
//! itself). The per-fence pairings are commented at each site: reader
//! fences A/B/C pair with the heavy fences F/G, and the reader's report
//! fence D pairs with the initiator's E and H through the holdout counter.
//!
//! The happens-before half of that contract is what makes pointer
//! reclamation safe; the SC half is what keeps the primitive composable
//! with unrelated sequentially consistent operations (it forbids
//! store-buffering cycles through `synchronize`).

mod registry;

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{self, Ordering};

use parking_lot::Mutex;

use crate::error::RcuInitError;
use crate::fence;
use crate::futex::WaitChannel;
use registry::Registry;

pub(crate) use registry::ThreadState;

/// An independent RCU domain: a registry of reader threads plus the
/// grace-period machinery that waits for them.
///
/// Most processes want a single process-wide domain (see the free functions
/// in the crate root), but domains are self-contained values, so tests and
/// embedders can run several side by side.
pub struct RcuDomain {
    /// Grace-period lock. Serializes initiators; readers take it only to
    /// come online or go offline.
    registry: Mutex<Registry>,
    /// Outstanding-holdout counter for the grace period in flight, and the
    /// futex word its initiator sleeps on. Zero or stale between grace
    /// periods.
    holdouts: WaitChannel,
}

impl RcuDomain {
    /// Build a new domain, registering the process for the heavy fence on
    /// first use.
    pub fn new() -> Result<Self, RcuInitError> {
        fence::register()?;
        Ok(Self {
            registry: Mutex::new(Registry::new()),
            holdouts: WaitChannel::new(0),
        })
    }

    /// Bring the calling thread online as a reader of this domain.
    ///
    /// The registration is the thread's identity within the domain: it owns
    /// the reader record, offlines on drop, and hands out nestable
    /// read-side guards. It is deliberately neither `Send` nor `Sync`; the
    /// record must only ever be driven by its owning thread.
    #[must_use]
    pub fn register_reader(&self) -> ReaderRegistration<'_> {
        let state = Box::new(ThreadState::new());
        self.registry.lock().online(NonNull::from(state.as_ref()));
        ReaderRegistration {
            domain: self,
            state,
            _not_send: PhantomData,
        }
    }

    /// Wait for a full grace period.
    ///
    /// Returns once every read-side critical section that was in progress
    /// when the call began has completed. May block indefinitely if a
    /// reader never exits its critical section.
    pub fn synchronize(&self) {
        let registry = self.registry.lock();
        let thread_count = registry.len() as u32;
        let mut claimed: u32 = 0;

        self.holdouts.store_relaxed(thread_count);

        // Fence E: a reader that wins the quiescence exchange acquires
        // through it (fence D), so its decrement lands on this grace
        // period's counter rather than a stale one.
        atomic::fence(Ordering::Release);

        for thread in registry.iter() {
            thread.request_quiescence();
        }

        // Fence F, paired with reader fences A and C. After it returns,
        // every running thread has observed the requests above, so a
        // top-level exit from here on reports itself; and any reader whose
        // nesting the scan below observes as zero started its next section
        // after the fence, ordering the grace period's prefix before that
        // section.
        fence::heavy();

        for thread in registry.iter() {
            if thread.current_nesting() == 0 && thread.acknowledge_quiescence() {
                claimed += 1;
            }
        }

        if claimed > 0 {
            // Fence G, paired with reader fence B: the claimed readers'
            // sections happen-before this point. It must run before the
            // subtraction so the count never reaches zero without the
            // ordering in place.
            fence::heavy();
            self.holdouts.fetch_sub_relaxed(claimed);
        }

        if claimed != thread_count {
            loop {
                let outstanding = self.holdouts.load_relaxed();
                if outstanding == 0 {
                    break;
                }
                self.holdouts.wait(outstanding);
            }
            // Fence H, paired with reader fence D through the counter: the
            // self-reported readers' sections happen-before the return, and
            // the fence is SC to cover the readers the initiator did not
            // claim itself.
            atomic::fence(Ordering::SeqCst);
        }

        drop(registry);
    }

    /// Reader-side quiescence report, reached from a top-level
    /// `read_unlock` that still observes its request flag set.
    #[cold]
    pub(crate) fn report_quiescent(&self, state: &ThreadState) {
        if !state.acknowledge_quiescence() {
            // The initiator claimed this thread first and synchronizes with
            // it through fence G; nothing left to account for.
            return;
        }
        // Fence D: the acquire half pairs with E so the decrement below
        // targets the current grace period's counter; the release half
        // pairs with H so the section that just ended happens-before the
        // initiator's return.
        atomic::fence(Ordering::AcqRel);
        if self.holdouts.fetch_sub_relaxed(1) == 1 {
            // Last holdout; the initiator may be parked on the counter.
            self.holdouts.wake_all();
        }
    }

    fn offline(&self, state: NonNull<ThreadState>) {
        self.registry.lock().offline(state);
    }
}

impl std::fmt::Debug for RcuDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RcuDomain")
            .field("threads", &self.registry.lock().len())
            .finish_non_exhaustive()
    }
}

/// A thread's registration with an [`RcuDomain`]; see
/// [`RcuDomain::register_reader`].
pub struct ReaderRegistration<'d> {
    domain: &'d RcuDomain,
    /// Boxed so the record's address is stable for the registration's
    /// lifetime even while the registration itself moves.
    state: Box<ThreadState>,
    /// Reader records are single-owner; keep the handle on its thread.
    _not_send: PhantomData<*const ()>,
}

impl ReaderRegistration<'_> {
    /// Enter a read-side critical section.
    ///
    /// Guards nest freely; only the outermost exit performs quiescence
    /// accounting. The fast path is a relaxed load/store pair plus a
    /// compiler fence, with no atomic read-modify-write and no syscall.
    #[inline]
    #[must_use]
    pub fn read_lock(&self) -> RcuReadGuard<'_> {
        self.state.read_lock();
        RcuReadGuard {
            domain: self.domain,
            state: &self.state,
            _not_send: PhantomData,
        }
    }

    /// True while the thread is inside a read-side critical section.
    #[must_use]
    pub fn in_critical_section(&self) -> bool {
        self.state.current_nesting() > 0
    }

    pub(crate) fn state_ptr(&self) -> NonNull<ThreadState> {
        NonNull::from(self.state.as_ref())
    }
}

impl Drop for ReaderRegistration<'_> {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.state.current_nesting(),
            0,
            "went offline inside a read-side critical section"
        );
        self.domain.offline(NonNull::from(self.state.as_ref()));
        // A finished grace period leaves every request flag cleared, and
        // offline serialized behind any in-flight one.
        debug_assert!(!self.state.has_pending_quiescence());
    }
}

impl std::fmt::Debug for ReaderRegistration<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderRegistration")
            .field("nesting", &self.state.current_nesting())
            .finish_non_exhaustive()
    }
}

/// Guard for one level of read-side critical section; exits on drop.
#[must_use = "dropping the guard immediately ends the critical section"]
pub struct RcuReadGuard<'r> {
    domain: &'r RcuDomain,
    state: &'r ThreadState,
    /// Exits must run on the thread that entered.
    _not_send: PhantomData<*const ()>,
}

impl Drop for RcuReadGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.state.read_unlock(self.domain);
    }
}

impl std::fmt::Debug for RcuReadGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RcuReadGuard").finish_non_exhaustive()
    }
}
