//! Per-thread reader records and the registry the grace-period engine scans.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use crate::fence;

/// Per-thread reader record.
///
/// Cache-line aligned so the owner's nesting updates never contend with
/// unrelated state. `nesting` is written only by the owning thread, always
/// with relaxed ordering; the record's cross-thread ordering comes entirely
/// from the fence protocol in the grace-period engine.
#[repr(align(64))]
pub(crate) struct ThreadState {
    /// Depth of the owner's read-side critical section; zero means the
    /// thread is outside any critical section.
    nesting: AtomicU32,
    /// Quiescence request. Set by a grace-period initiator, cleared by
    /// whichever side wins the relaxed exchange. Untouched outside a grace
    /// period.
    need_qs: AtomicBool,
    /// Index of this record in the registry vector. Read and written only
    /// under the grace-period lock.
    slot: AtomicUsize,
}

impl ThreadState {
    pub(crate) fn new() -> Self {
        Self {
            nesting: AtomicU32::new(0),
            need_qs: AtomicBool::new(false),
            slot: AtomicUsize::new(0),
        }
    }

    /// Enter a read-side critical section. Nestable.
    #[inline]
    pub(crate) fn read_lock(&self) {
        let nesting = self.nesting.load(Ordering::Relaxed);
        self.nesting.store(nesting + 1, Ordering::Relaxed);
        // Fence A, paired with the initiator's heavy fence F: if the
        // initiator's scan reads-before this increment, everything
        // sequenced before its grace period happens-before this critical
        // section.
        fence::light();
    }

    /// Exit a read-side critical section.
    ///
    /// Only the outermost exit probes the quiescence request; inner exits
    /// are a relaxed load/store pair plus a compiler fence.
    #[inline]
    pub(crate) fn read_unlock(&self, domain: &super::RcuDomain) {
        // Fence B, paired with heavy fence G: an initiator that claims this
        // thread after observing nesting == 0 also observes every access
        // inside the section that just ended.
        fence::light();
        let nesting = self.nesting.load(Ordering::Relaxed);
        debug_assert!(nesting > 0, "read_unlock without a matching read_lock");
        self.nesting.store(nesting - 1, Ordering::Relaxed);
        if nesting == 1 {
            // Fence C, paired with F: either the initiator observes the
            // store above, or this thread observes the quiescence request
            // below. Both missing at once is the store-buffering outcome
            // the pairing forbids.
            fence::light();
            if self.has_pending_quiescence() {
                domain.report_quiescent(self);
            }
        }
    }

    #[inline]
    pub(crate) fn current_nesting(&self) -> u32 {
        self.nesting.load(Ordering::Relaxed)
    }

    /// Writer-side: ask the owner to report its next top-level exit.
    pub(crate) fn request_quiescence(&self) {
        self.need_qs.store(true, Ordering::Relaxed);
    }

    /// Clear the quiescence request; returns true if the caller won the
    /// exchange and now owns the holdout accounting for this record.
    pub(crate) fn acknowledge_quiescence(&self) -> bool {
        self.need_qs.swap(false, Ordering::Relaxed)
    }

    pub(crate) fn has_pending_quiescence(&self) -> bool {
        self.need_qs.load(Ordering::Relaxed)
    }

    fn slot(&self) -> usize {
        self.slot.load(Ordering::Relaxed)
    }

    fn set_slot(&self, slot: usize) {
        self.slot.store(slot, Ordering::Relaxed);
    }
}

/// Registry of online reader records.
///
/// Lives inside the grace-period mutex; every operation here, including the
/// traversal in the engine, holds that lock, so plain vector bookkeeping is
/// race-free. Register and deregister are O(1) (push / swap-remove with a
/// slot fixup), traversal is O(N).
pub(crate) struct Registry {
    threads: Vec<NonNull<ThreadState>>,
}

// SAFETY: the registry stores pointers to records that stay allocated until
// their owning thread deregisters, and deregistration serializes on the
// same mutex that guards every dereference.
unsafe impl Send for Registry {}

impl Registry {
    pub(crate) const fn new() -> Self {
        Self {
            threads: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.threads.len()
    }

    /// Bring a reader record online.
    pub(crate) fn online(&mut self, state: NonNull<ThreadState>) {
        // SAFETY: the caller passes a live record it owns for the duration
        // of the registration.
        unsafe { state.as_ref() }.set_slot(self.threads.len());
        self.threads.push(state);
    }

    /// Take a reader record offline.
    pub(crate) fn offline(&mut self, state: NonNull<ThreadState>) {
        // SAFETY: as in `online`; the record is still live because its
        // owner is the caller.
        let slot = unsafe { state.as_ref() }.slot();
        debug_assert!(
            slot < self.threads.len() && self.threads[slot] == state,
            "record is not online in this registry"
        );
        self.threads.swap_remove(slot);
        if let Some(moved) = self.threads.get(slot) {
            // SAFETY: `moved` is a registered record, so it is live.
            unsafe { moved.as_ref() }.set_slot(slot);
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ThreadState> {
        // SAFETY: registered records are live until deregistration, which
        // cannot run while the caller borrows the registry through the
        // grace-period lock.
        self.threads.iter().map(|state| unsafe { state.as_ref() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_offline_round_trip() {
        let a = Box::new(ThreadState::new());
        let b = Box::new(ThreadState::new());
        let mut registry = Registry::new();

        registry.online(NonNull::from(a.as_ref()));
        registry.online(NonNull::from(b.as_ref()));
        assert_eq!(registry.len(), 2);

        registry.offline(NonNull::from(a.as_ref()));
        assert_eq!(registry.len(), 1);
        registry.offline(NonNull::from(b.as_ref()));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn swap_remove_fixes_the_moved_slot() {
        let a = Box::new(ThreadState::new());
        let b = Box::new(ThreadState::new());
        let c = Box::new(ThreadState::new());
        let mut registry = Registry::new();
        registry.online(NonNull::from(a.as_ref()));
        registry.online(NonNull::from(b.as_ref()));
        registry.online(NonNull::from(c.as_ref()));

        // Removing the head moves the tail record into slot 0; a second
        // removal through the moved record must still find it.
        registry.offline(NonNull::from(a.as_ref()));
        registry.offline(NonNull::from(c.as_ref()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.iter().count(), 1);
    }

    #[test]
    fn quiescence_exchange_has_a_single_winner() {
        let state = ThreadState::new();
        state.request_quiescence();
        assert!(state.acknowledge_quiescence());
        assert!(!state.acknowledge_quiescence());
        assert!(!state.has_pending_quiescence());
    }
}
