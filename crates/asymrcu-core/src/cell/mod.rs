//! RCU-protected pointer cell.
//!
//! The publication half of the usual RCU pattern: writers publish a new
//! value with release ordering and get back a [`Retired`] token for the old
//! one, which may only be freed after a grace period on the protecting
//! domain. Readers load with acquire ordering from inside a read-side
//! critical section.

use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::domain::RcuDomain;

/// A shared pointer slot whose old values are reclaimed through grace
/// periods.
pub struct RcuCell<T> {
    ptr: AtomicPtr<T>,
}

// SAFETY: the cell hands out `&T` to concurrent readers (T: Sync) and moves
// retired boxes across threads for reclamation (T: Send); the pointer slot
// itself is only touched through atomics.
unsafe impl<T: Send + Sync> Send for RcuCell<T> {}
unsafe impl<T: Send + Sync> Sync for RcuCell<T> {}

impl<T> RcuCell<T> {
    /// An empty cell.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            ptr: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// A cell holding `value`.
    #[must_use]
    pub fn new(value: Box<T>) -> Self {
        Self {
            ptr: AtomicPtr::new(Box::into_raw(value)),
        }
    }

    /// Load the current value.
    ///
    /// The load is acquire. A dependency-ordered (consume-style) load would
    /// be marginally cheaper on weakly ordered hardware, but there is no
    /// dependable way to express one, so the stronger ordering is used
    /// deliberately.
    ///
    /// # Safety
    ///
    /// The caller must be inside a read-side critical section of the domain
    /// whose grace periods retire this cell's values, and must not use the
    /// returned reference past the end of that critical section.
    #[inline]
    pub unsafe fn load(&self) -> Option<&T> {
        let ptr = self.ptr.load(Ordering::Acquire);
        if ptr.is_null() {
            None
        } else {
            // SAFETY: non-null values always come from Box::into_raw and
            // stay allocated until a grace period after their replacement;
            // the caller's critical section spans this dereference.
            Some(unsafe { &*ptr })
        }
    }

    /// Publish `new` and retire the previous value.
    ///
    /// The swap is release on the publish side, so a reader that observes
    /// the new pointer also observes the pointee's initialization.
    pub fn replace(&self, new: Option<Box<T>>) -> Retired<T> {
        let new_ptr = new.map_or(ptr::null_mut(), Box::into_raw);
        let old = self.ptr.swap(new_ptr, Ordering::AcqRel);
        Retired {
            ptr: old,
            _owns: PhantomData,
        }
    }
}

impl<T> Drop for RcuCell<T> {
    fn drop(&mut self) {
        let ptr = *self.ptr.get_mut();
        if !ptr.is_null() {
            // SAFETY: `&mut self` rules out live readers, and the pointer
            // came from Box::into_raw.
            drop(unsafe { Box::from_raw(ptr) });
        }
    }
}

impl<T> Default for RcuCell<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> std::fmt::Debug for RcuCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RcuCell")
            .field("occupied", &!self.ptr.load(Ordering::Acquire).is_null())
            .finish()
    }
}

/// Ownership token for a value removed from an [`RcuCell`].
///
/// Dropping the token leaks the value rather than freeing it: freeing
/// without a grace period would be unsound, and leaking is the safe
/// default. Call [`reclaim_after`](Retired::reclaim_after) to wait and
/// free, or [`into_box`](Retired::into_box) when a grace period has already
/// elapsed by other means.
#[must_use = "retired values must be reclaimed after a grace period (dropping leaks)"]
pub struct Retired<T> {
    ptr: *mut T,
    _owns: PhantomData<Box<T>>,
}

// SAFETY: the token is sole owner of the retired allocation.
unsafe impl<T: Send> Send for Retired<T> {}

impl<T> Retired<T> {
    /// True when the cell was empty at replacement time.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ptr.is_null()
    }

    /// Wait one grace period on `domain`, then free the retired value.
    pub fn reclaim_after(self, domain: &RcuDomain) {
        if self.ptr.is_null() {
            return;
        }
        domain.synchronize();
        // SAFETY: the value has been unreachable to new readers since the
        // swap that produced this token, and the grace period outlasted
        // every reader that could still observe it.
        drop(unsafe { Box::from_raw(self.ptr) });
    }

    /// Recover the boxed value without waiting.
    ///
    /// # Safety
    ///
    /// A full grace period on the protecting domain must have elapsed since
    /// the [`RcuCell::replace`] call that produced this token.
    pub unsafe fn into_box(self) -> Option<Box<T>> {
        if self.ptr.is_null() {
            None
        } else {
            // SAFETY: ownership is unique and, per the caller's contract,
            // no reader can still hold the pointer.
            Some(unsafe { Box::from_raw(self.ptr) })
        }
    }
}

impl<T> std::fmt::Debug for Retired<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retired")
            .field("empty", &self.ptr.is_null())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> RcuDomain {
        RcuDomain::new().expect("host must support the heavy fence")
    }

    #[test]
    fn empty_cell_loads_none() {
        let cell: RcuCell<u64> = RcuCell::empty();
        let registration_domain = domain();
        let registration = registration_domain.register_reader();
        let _guard = registration.read_lock();
        // SAFETY: inside a read-side critical section.
        assert!(unsafe { cell.load() }.is_none());
    }

    #[test]
    fn replace_returns_the_previous_value() {
        let reclaim_domain = domain();
        let cell = RcuCell::new(Box::new(10u64));

        let retired = cell.replace(Some(Box::new(20)));
        assert!(!retired.is_empty());
        // SAFETY: no reader has ever seen this cell.
        assert_eq!(unsafe { retired.into_box() }.as_deref(), Some(&10));

        let registration = reclaim_domain.register_reader();
        let guard = registration.read_lock();
        // SAFETY: inside a read-side critical section.
        assert_eq!(unsafe { cell.load() }.copied(), Some(20));
        drop(guard);
    }

    #[test]
    fn reclaim_after_waits_a_grace_period() {
        let reclaim_domain = domain();
        let cell = RcuCell::new(Box::new(1u64));
        let retired = cell.replace(None);
        retired.reclaim_after(&reclaim_domain);
    }

    #[test]
    fn empty_retirement_is_a_noop() {
        let reclaim_domain = domain();
        let cell: RcuCell<u64> = RcuCell::empty();
        let retired = cell.replace(Some(Box::new(5)));
        assert!(retired.is_empty());
        retired.reclaim_after(&reclaim_domain);
    }

    #[test]
    fn cell_drop_frees_the_current_value() {
        let cell = RcuCell::new(Box::new(String::from("owned")));
        drop(cell);
    }
}
