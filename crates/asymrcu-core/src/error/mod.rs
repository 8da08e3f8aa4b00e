//! Initialization error taxonomy.
//!
//! Initialization is the only fallible surface of the crate: once a domain
//! exists, every read-side and writer-side operation is infallible by
//! design. Caller-protocol violations (locking while offline, unbalanced
//! unlock) are bugs and panic instead of returning errors.

use thiserror::Error;

/// Errors surfaced by [`rcu_init`](crate::rcu_init) and
/// [`RcuDomain::new`](crate::RcuDomain::new).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RcuInitError {
    /// The kernel does not support the expedited private membarrier
    /// commands this crate relies on for its heavy fence.
    #[error("expedited private membarrier is not supported by this kernel")]
    MembarrierUnsupported,
    /// Registering the process as an expedited-membarrier user failed.
    #[error("membarrier registration failed (errno {errno})")]
    MembarrierRegister {
        /// Raw errno from the registration syscall.
        errno: i32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failing_primitive() {
        let unsupported = RcuInitError::MembarrierUnsupported;
        assert!(unsupported.to_string().contains("membarrier"));

        let register = RcuInitError::MembarrierRegister { errno: 38 };
        assert!(register.to_string().contains("38"));
    }
}
